//! Exercise signal construction from the per-frame angle stream.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};

use repalign_core::Angle;

use crate::filtering::{min_max_scale, sample_std};

/// Angles pivoted to one row per frame and one column per angle name.
///
/// Rows follow ascending frame number; columns are sorted by name. A frame where an
/// angle could not be measured holds NaN in that column.
#[derive(Debug, Clone)]
pub struct AngleMatrix {
    frames: Vec<usize>,
    names: Vec<String>,
    values: Array2<f64>,
}

impl AngleMatrix {
    pub fn from_angles(angles: &[Angle]) -> Self {
        let mut frames: Vec<usize> = angles.iter().map(|a| a.frame).collect();
        frames.sort_unstable();
        frames.dedup();

        let columns: BTreeMap<&str, usize> = {
            let mut names: Vec<&str> = angles.iter().map(|a| a.name.as_str()).collect();
            names.sort_unstable();
            names.dedup();
            names.into_iter().enumerate().map(|(i, n)| (n, i)).collect()
        };
        let rows: BTreeMap<usize, usize> =
            frames.iter().enumerate().map(|(i, &f)| (f, i)).collect();

        let mut values = Array2::from_elem((frames.len(), columns.len()), f64::NAN);
        for angle in angles {
            let row = rows[&angle.frame];
            let col = columns[angle.name.as_str()];
            values[[row, col]] = angle.value;
        }

        Self {
            frames,
            names: columns.keys().map(|n| n.to_string()).collect(),
            values,
        }
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sample standard deviation of every column, ignoring missing cells
    pub fn column_std(&self) -> Array1<f64> {
        self.values
            .axis_iter(Axis(1))
            .map(|column| sample_std(&column.to_vec()))
            .collect()
    }

    /// Indices of the `k` columns with the highest standard deviation.
    ///
    /// Ties keep column order.
    pub fn most_variable(&self, k: usize) -> Vec<usize> {
        let std = self.column_std();
        let mut order: Vec<usize> = (0..std.len()).collect();
        order.sort_by(|&a, &b| std[b].total_cmp(&std[a]));
        order.truncate(k);
        order
    }

    /// Per-frame mean of the min-max normalized `k` most variable columns.
    ///
    /// A frame with none of the selected angles repeats the previous value.
    pub fn exercise_signal(&self, k: usize) -> Vec<f64> {
        let selected = self.most_variable(k);
        if selected.is_empty() {
            return vec![0.0; self.n_rows()];
        }

        let mut normalized = Array2::from_elem((self.n_rows(), selected.len()), f64::NAN);
        for (out_col, &col) in selected.iter().enumerate() {
            let scaled = min_max_scale(&self.values.column(col).to_vec());
            normalized.column_mut(out_col).assign(&Array1::from(scaled));
        }

        let mut signal = Vec::with_capacity(self.n_rows());
        let mut previous = 0.0;
        for row in normalized.axis_iter(Axis(0)) {
            let (sum, count) = row
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            let value = if count > 0 { sum / count as f64 } else { previous };
            signal.push(value);
            previous = value;
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angles() -> Vec<Angle> {
        let mut angles = Vec::new();
        for (frame, knee) in [(0, 170.0), (1, 130.0), (2, 90.0), (4, 130.0)] {
            angles.push(Angle::new(frame, "left_knee_3D", knee));
            angles.push(Angle::new(frame, "left_ankle_3D", 80.0));
            angles.push(Angle::new(frame, "left_hip_3D", 180.0 - (frame as f64)));
        }
        angles
    }

    #[test]
    fn test_pivot_layout() {
        let matrix = AngleMatrix::from_angles(&angles());
        assert_eq!(matrix.frames(), &[0, 1, 2, 4]);
        assert_eq!(
            matrix.names(),
            &["left_ankle_3D", "left_hip_3D", "left_knee_3D"]
        );
        assert_eq!(matrix.n_rows(), 4);
    }

    #[test]
    fn test_feature_selection_by_variance() {
        let matrix = AngleMatrix::from_angles(&angles());
        // knee varies most, then hip, ankle is constant
        assert_eq!(matrix.most_variable(2), vec![2, 1]);
        assert_eq!(matrix.most_variable(10).len(), 3);
    }

    #[test]
    fn test_exercise_signal_single_feature() {
        let matrix = AngleMatrix::from_angles(&angles());
        let signal = matrix.exercise_signal(1);
        let expected = [1.0, 0.5, 0.0, 0.5];
        for (got, want) in signal.iter().zip(expected) {
            assert!((got - want).abs() < 1e-10);
        }
    }

    #[test]
    fn test_missing_cells_are_skipped() {
        let mut angles = angles();
        angles.retain(|a| !(a.frame == 1 && a.name == "left_knee_3D"));
        let matrix = AngleMatrix::from_angles(&angles);

        // Frame 1 falls back to the previous value when its only selected angle is missing
        let signal = matrix.exercise_signal(1);
        assert_eq!(signal.len(), 4);
        assert!((signal[1] - signal[0]).abs() < 1e-10);
    }
}
