//! Smoothing and scaling primitives for the exercise signal.

/// Uniform moving-average low-pass filter with "same"-length output.
///
/// The kernel is centered like a full convolution trimmed to the input length:
/// output `i` averages inputs `i - width/2 ..= i + (width-1)/2`, and samples outside
/// the signal count as zero.
#[derive(Debug, Clone, Copy)]
pub struct UniformFilter {
    width: usize,
}

impl UniformFilter {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Filter an entire signal
    pub fn filter_signal(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }

        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        let mut acc = 0.0;
        for &x in signal {
            acc += x;
            prefix.push(acc);
        }

        let behind = self.width / 2;
        let ahead = (self.width - 1) / 2;
        let scale = 1.0 / self.width as f64;

        (0..n)
            .map(|i| {
                let lo = i.saturating_sub(behind);
                let hi = (i + ahead).min(n - 1);
                (prefix[hi + 1] - prefix[lo]) * scale
            })
            .collect()
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`)
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Sample standard deviation (divides by `n - 1`), skipping NaN entries
pub fn sample_std(values: &[f64]) -> f64 {
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.len() < 2 {
        return 0.0;
    }
    let m = mean(&present);
    (present.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (present.len() - 1) as f64).sqrt()
}

/// Median; the mean of the two middle values for an even count
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Scale to [0, 1] by the column's own range.
///
/// NaN entries stay NaN and are ignored for the range; a constant column maps to 0.
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                v
            } else if range > 0.0 {
                (v - min) / range
            } else {
                0.0
            }
        })
        .collect()
}
