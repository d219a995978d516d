//! Repetition segmentation.
//!
//! The angle stream is reduced to a single exercise signal, low-pass filtered and
//! scanned with a two-state hysteresis detector. Every full up/down cycle becomes a
//! candidate repetition; candidates whose length or height strays too far from the
//! median are dropped before the survivors are numbered from 1.
//!
//! All positions below are signal rows. Frames without a pose never produce a row,
//! so rows are mapped back to frame numbers only when segments are sliced.

use serde::{Deserialize, Serialize};

use repalign_core::{AnalysisConfig, Angle, Error, Joint, Result, Segment, TrailingContext};

use crate::features::AngleMatrix;
use crate::filtering::{mean, median, population_std, UniformFilter};

/// State of the hysteresis detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Up,
    Down,
}

/// Two-state detector that only flips on a stable window on the far side of the threshold
#[derive(Debug, Clone)]
pub struct HysteresisDetector {
    threshold: f64,
    tolerance: f64,
    phase: Phase,
}

impl HysteresisDetector {
    pub fn new(threshold: f64, tolerance: f64) -> Self {
        Self {
            threshold,
            tolerance,
            phase: Phase::Down,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Feed one window's statistics; returns the new phase on a transition
    pub fn step(&mut self, window_mean: f64, window_std: f64) -> Option<Phase> {
        if window_std >= self.tolerance {
            return None;
        }

        let next = match self.phase {
            Phase::Down if window_mean > self.threshold => Phase::Up,
            Phase::Up if window_mean < self.threshold => Phase::Down,
            _ => return None,
        };
        self.phase = next;
        Some(next)
    }
}

/// A detector transition, placed at the center of the window that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub row: usize,
    pub entered: Phase,
}

/// Slide a `window`-sized window over `signal` and collect every phase transition
pub fn detect_breakpoints(
    signal: &[f64],
    threshold: f64,
    window: usize,
    stride: usize,
    tolerance: f64,
) -> Vec<Breakpoint> {
    if window == 0 || signal.len() < window {
        return Vec::new();
    }

    let mut detector = HysteresisDetector::new(threshold, tolerance);
    let mut breakpoints = Vec::new();

    for start in (0..=signal.len() - window).step_by(stride.max(1)) {
        let samples = &signal[start..start + window];
        if let Some(entered) = detector.step(mean(samples), population_std(samples)) {
            breakpoints.push(Breakpoint {
                row: start + window / 2,
                entered,
            });
        }
    }

    breakpoints
}

/// Candidate repetition in signal rows, `finish` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub start: usize,
    pub finish: usize,
}

impl Candidate {
    pub fn length(&self) -> usize {
        self.finish - self.start
    }

    /// Peak-to-peak of the signal over `start..finish`
    pub fn height(&self, signal: &[f64]) -> f64 {
        let end = self.finish.min(signal.len());
        if self.start >= end {
            return 0.0;
        }
        let (lo, hi) = signal[self.start..end]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        hi - lo
    }
}

/// Pair every other breakpoint into full cycles.
///
/// Breakpoints alternate between entering Up and entering Down, so positions
/// `0, 2, 4, ...` open a cycle and the next even position closes it. The closing
/// breakpoint also opens the following cycle, so a [`TrailingContext::Clipped`]
/// finish stops one row short of it while [`TrailingContext::Overlapping`] pushes it
/// `extension` rows further, clamped to `last_row`.
pub fn form_candidates(
    breakpoints: &[Breakpoint],
    extension: usize,
    last_row: usize,
    trailing: TrailingContext,
) -> Vec<Candidate> {
    breakpoints
        .iter()
        .step_by(2)
        .zip(breakpoints.iter().skip(2).step_by(2))
        .map(|(open, close)| Candidate {
            start: open.row,
            finish: match trailing {
                TrailingContext::Clipped => close.row.saturating_sub(1).min(last_row),
                TrailingContext::Overlapping => (close.row + extension).min(last_row),
            },
        })
        .collect()
}

/// Keep candidates close to the median length and height.
///
/// Length must lie within `median ± max_length_deviation` and height within
/// `[median / height_scaler, median * height_scaler]`, bounds included.
pub fn reject_outliers(
    candidates: &[Candidate],
    signal: &[f64],
    max_length_deviation: usize,
    height_scaler: f64,
) -> Vec<Candidate> {
    let lengths: Vec<f64> = candidates.iter().map(|c| c.length() as f64).collect();
    let heights: Vec<f64> = candidates.iter().map(|c| c.height(signal)).collect();

    let (Some(median_length), Some(median_height)) = (median(&lengths), median(&heights)) else {
        return Vec::new();
    };

    let deviation = max_length_deviation as f64;
    let length_range = (median_length - deviation)..=(median_length + deviation);
    let height_range = (median_height / height_scaler)..=(median_height * height_scaler);

    candidates
        .iter()
        .zip(lengths.iter().zip(&heights))
        .filter(|(_, (length, height))| {
            length_range.contains(*length) && height_range.contains(*height)
        })
        .map(|(candidate, _)| *candidate)
        .collect()
}

/// Intermediate products of one segmentation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationTrace {
    /// Frame number of every signal row
    pub frames: Vec<usize>,
    pub signal: Vec<f64>,
    pub filtered: Vec<f64>,
    pub threshold: f64,
    pub breakpoints: Vec<Breakpoint>,
    pub candidates: Vec<Candidate>,
    pub accepted: Vec<Candidate>,
}

/// Splits a finished capture into repetitions
#[derive(Debug, Clone)]
pub struct Segmenter {
    fps: usize,
    feature_count: usize,
    window: usize,
    stride: usize,
    tolerance: f64,
    height_scaler: f64,
    trailing: TrailingContext,
    filter: UniformFilter,
}

impl Segmenter {
    pub fn new(config: &AnalysisConfig) -> Self {
        let seg = &config.segmentation;
        Self {
            fps: config.fps,
            feature_count: seg.signal_feature_count,
            window: config.signal_window(),
            stride: seg.stride,
            tolerance: seg.tolerance,
            height_scaler: seg.height_scaler,
            trailing: seg.trailing,
            filter: UniformFilter::new(config.filter_width()),
        }
    }

    /// Run the full detection and return every intermediate product.
    ///
    /// Fails with [`Error::EmptySignal`] when the capture is shorter than one window
    /// and with [`Error::NoValidSegments`] when no candidate survives.
    pub fn analyze(&self, angles: &[Angle]) -> Result<SegmentationTrace> {
        let matrix = AngleMatrix::from_angles(angles);
        if matrix.n_rows() < self.window || matrix.n_rows() == 0 {
            return Err(Error::EmptySignal {
                required: self.window.max(1),
                available: matrix.n_rows(),
            });
        }

        let signal = matrix.exercise_signal(self.feature_count);
        let filtered = self.filter.filter_signal(&signal);
        let threshold = mean(&filtered);

        let breakpoints = detect_breakpoints(
            &filtered,
            threshold,
            self.window,
            self.stride,
            self.tolerance,
        );
        let candidates = form_candidates(&breakpoints, self.fps, filtered.len() - 1, self.trailing);
        let accepted = reject_outliers(&candidates, &filtered, self.fps, self.height_scaler);

        tracing::debug!(
            rows = filtered.len(),
            threshold,
            breakpoints = breakpoints.len(),
            candidates = candidates.len(),
            accepted = accepted.len(),
            "segmentation scan complete"
        );

        if accepted.is_empty() {
            return Err(Error::NoValidSegments {
                candidates: candidates.len(),
            });
        }

        Ok(SegmentationTrace {
            frames: matrix.frames().to_vec(),
            signal,
            filtered,
            threshold,
            breakpoints,
            candidates,
            accepted,
        })
    }

    /// Split a capture into numbered repetitions.
    ///
    /// A capture that is too short or has no acceptable repetition yields an empty
    /// list. Spans are the accepted candidates mapped to frames, bounds included.
    pub fn segment(&self, joints: &[Joint], angles: &[Angle]) -> Vec<Segment> {
        let trace = match self.analyze(angles) {
            Ok(trace) => trace,
            Err(e @ Error::EmptySignal { .. }) => {
                tracing::warn!(error = %e, "capture too short to segment");
                return Vec::new();
            }
            Err(e) => {
                tracing::info!(error = %e, "no repetitions found");
                return Vec::new();
            }
        };

        let frames = &trace.frames;
        let mut segments = Vec::with_capacity(trace.accepted.len());

        for (i, candidate) in trace.accepted.iter().enumerate() {
            let start_frame = frames[candidate.start];
            let finish_frame = frames[candidate.finish];

            let in_span = |frame: usize| frame >= start_frame && frame <= finish_frame;
            segments.push(Segment {
                repetition_index: i + 1,
                start_frame,
                finish_frame,
                joints: joints.iter().filter(|j| in_span(j.frame)).cloned().collect(),
                angles: angles.iter().filter(|a| in_span(a.frame)).cloned().collect(),
            });
        }

        tracing::info!(repetitions = segments.len(), "capture segmented");
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(breakpoints: &[Breakpoint]) -> Vec<usize> {
        breakpoints.iter().map(|b| b.row).collect()
    }

    /// Three squats at 30 fps: stand 40, descend 15, hold 40, rise 15, then stand 80
    fn squat_capture(skip_frames: &[usize]) -> (Vec<Joint>, Vec<Angle>) {
        let mut profile = Vec::new();
        for _ in 0..3 {
            profile.extend(std::iter::repeat(1.0).take(40));
            profile.extend((1..=15).map(|i| 1.0 - i as f64 / 15.0));
            profile.extend(std::iter::repeat(0.0).take(40));
            profile.extend((1..=15).map(|i| i as f64 / 15.0));
        }
        profile.extend(std::iter::repeat(1.0).take(80));

        let mut joints = Vec::new();
        let mut angles = Vec::new();
        for (frame, depth) in profile.iter().enumerate() {
            if skip_frames.contains(&frame) {
                continue;
            }
            angles.push(Angle::new(frame, "left_knee_3D", 90.0 + 80.0 * depth));
            angles.push(Angle::new(frame, "right_knee_3D", 92.0 + 78.0 * depth));
            angles.push(Angle::new(frame, "left_hip_3D", 100.0 + 70.0 * depth));
            angles.push(Angle::new(frame, "left_ankle_3D", 80.0));
            joints.push(Joint {
                frame,
                id: 25,
                name: "left_knee".to_string(),
                x: 0.0,
                y: 0.5 * depth,
                z: 0.1,
                visibility: 0.9,
            });
        }
        (joints, angles)
    }

    #[test]
    fn test_hysteresis_requires_stable_window() {
        let mut detector = HysteresisDetector::new(0.5, 0.01);
        assert_eq!(detector.phase(), Phase::Down);

        assert_eq!(detector.step(0.9, 0.2), None); // noisy
        assert_eq!(detector.step(0.1, 0.0), None); // already below
        assert_eq!(detector.step(0.9, 0.0), Some(Phase::Up));
        assert_eq!(detector.step(0.95, 0.0), None);
        assert_eq!(detector.step(0.1, 0.0), Some(Phase::Down));
    }

    #[test]
    fn test_plateau_signal_gives_one_candidate() {
        let signal = [
            0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0,
        ];
        let breakpoints = detect_breakpoints(&signal, 0.5, 3, 1, 0.01);
        assert_eq!(rows(&breakpoints), vec![4, 7, 10, 13]);
        assert_eq!(breakpoints[0].entered, Phase::Up);
        assert_eq!(breakpoints[1].entered, Phase::Down);

        let candidates = form_candidates(&breakpoints, 0, signal.len() - 1, TrailingContext::Overlapping);
        assert_eq!(candidates, vec![Candidate { start: 4, finish: 10 }]);

        // A lone candidate is its own median
        let accepted = reject_outliers(&candidates, &signal, 30, 1.5);
        assert_eq!(accepted, candidates);
    }

    #[test]
    fn test_short_signal_has_no_breakpoints() {
        assert!(detect_breakpoints(&[1.0, 1.0], 0.5, 3, 1, 0.01).is_empty());
    }

    fn alternating(rows: &[usize]) -> Vec<Breakpoint> {
        rows.iter()
            .zip([Phase::Up, Phase::Down].into_iter().cycle())
            .map(|(&row, entered)| Breakpoint { row, entered })
            .collect()
    }

    #[test]
    fn test_extension_is_clamped() {
        let breakpoints = alternating(&[4, 7, 10]);
        let candidates = form_candidates(&breakpoints, 30, 14, TrailingContext::Overlapping);
        assert_eq!(candidates, vec![Candidate { start: 4, finish: 14 }]);
    }

    #[test]
    fn test_clipped_spans_end_before_closing_breakpoint() {
        let breakpoints = alternating(&[4, 7, 10, 13, 16, 19, 22]);
        let candidates = form_candidates(&breakpoints, 30, 40, TrailingContext::Clipped);
        assert_eq!(
            candidates,
            vec![
                Candidate { start: 4, finish: 9 },
                Candidate { start: 10, finish: 15 },
                Candidate { start: 16, finish: 21 },
            ]
        );
    }

    #[test]
    fn test_length_outlier_rejected() {
        let signal: Vec<f64> = (0..800).map(|i| (i % 2) as f64).collect();
        let candidates = vec![
            Candidate { start: 0, finish: 100 },
            Candidate { start: 100, finish: 202 },
            Candidate { start: 202, finish: 300 },
            Candidate { start: 300, finish: 500 },
        ];

        let accepted = reject_outliers(&candidates, &signal, 30, 1.5);
        assert_eq!(accepted, candidates[..3].to_vec());
    }

    #[test]
    fn test_height_outlier_rejected() {
        let signal: Vec<f64> = (0..300)
            .map(|i| {
                let amplitude = if i >= 200 { 3.0 } else { 1.0 };
                amplitude * (i % 2) as f64
            })
            .collect();
        let candidates = vec![
            Candidate { start: 0, finish: 100 },
            Candidate { start: 100, finish: 200 },
            Candidate { start: 200, finish: 299 },
        ];

        let accepted = reject_outliers(&candidates, &signal, 30, 1.5);
        assert_eq!(accepted.len(), 2);
        assert!(accepted.iter().all(|c| c.start < 200));
    }

    #[test]
    fn test_segments_three_squats() {
        let (joints, angles) = squat_capture(&[]);
        let segmenter = Segmenter::new(&AnalysisConfig::default());
        let segments = segmenter.segment(&joints, &angles);

        assert_eq!(segments.len(), 3);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.repetition_index, i + 1);
            assert!(segment.start_frame < segment.finish_frame);

            // each repetition covers its own hold at the bottom
            let bottom = 75 + 110 * i;
            assert!(segment.contains_frame(bottom), "{:?}", (segment.start_frame, segment.finish_frame));

            assert!(segment.angles.iter().all(|a| segment.contains_frame(a.frame)));
            assert!(segment.joints.iter().all(|j| segment.contains_frame(j.frame)));
            assert!(!segment.joints.is_empty());
        }
        for pair in segments.windows(2) {
            assert!(pair[0].finish_frame < pair[1].start_frame);
        }
    }

    #[test]
    fn test_frames_without_pose_map_back_to_frame_numbers() {
        // Drop ten frames from the final stand
        let skipped: Vec<usize> = (340..350).collect();
        let (joints, angles) = squat_capture(&skipped);
        let segmenter = Segmenter::new(&AnalysisConfig::default());
        let trace = segmenter.analyze(&angles).unwrap();

        assert_eq!(trace.frames.len(), 410 - skipped.len());
        assert!(trace.frames.iter().all(|f| !skipped.contains(f)));

        // The last cycle closes at row 345; row 344 is frame 354
        let last = trace.accepted.last().unwrap();
        assert_eq!(last.finish, 344);

        let segments = segmenter.segment(&joints, &angles);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].finish_frame, 354);
        assert!(segments[2].angles.iter().all(|a| !skipped.contains(&a.frame)));
    }

    fn assert_within_bounds(trace: &SegmentationTrace, segments: &[Segment], fps: usize) {
        let lengths: Vec<f64> = trace.candidates.iter().map(|c| c.length() as f64).collect();
        let heights: Vec<f64> = trace
            .candidates
            .iter()
            .map(|c| c.height(&trace.filtered))
            .collect();
        let median_length = median(&lengths).unwrap();
        let median_height = median(&heights).unwrap();

        assert_eq!(segments.len(), trace.accepted.len());
        for (segment, candidate) in segments.iter().zip(&trace.accepted) {
            let length = (segment.finish_frame - segment.start_frame) as f64;
            assert!((length - median_length).abs() <= fps as f64, "{:?}", candidate);

            let height = candidate.height(&trace.filtered);
            assert!(height >= median_height / 1.5 && height <= median_height * 1.5);
        }
    }

    #[test]
    fn test_every_repetition_trimmed_alike() {
        let (joints, angles) = squat_capture(&[]);
        let config = AnalysisConfig::default();
        let segmenter = Segmenter::new(&config);
        let trace = segmenter.analyze(&angles).unwrap();
        let segments = segmenter.segment(&joints, &angles);

        assert_eq!(rows(&trace.breakpoints), vec![19, 70, 125, 180, 235, 290, 345]);
        assert_eq!(
            segments
                .iter()
                .map(|s| (s.start_frame, s.finish_frame))
                .collect::<Vec<_>>(),
            vec![(19, 124), (125, 234), (235, 344)]
        );
        assert_within_bounds(&trace, &segments, config.fps);
    }

    #[test]
    fn test_overlapping_context_extends_every_repetition() {
        let (joints, angles) = squat_capture(&[]);
        let mut config = AnalysisConfig::default();
        config.segmentation.trailing = TrailingContext::Overlapping;
        let segmenter = Segmenter::new(&config);
        let trace = segmenter.analyze(&angles).unwrap();
        let segments = segmenter.segment(&joints, &angles);

        assert_eq!(
            segments
                .iter()
                .map(|s| (s.start_frame, s.finish_frame))
                .collect::<Vec<_>>(),
            vec![(19, 155), (125, 265), (235, 375)]
        );
        assert_within_bounds(&trace, &segments, config.fps);
    }

    #[test]
    fn test_segmentation_is_idempotent() {
        let (joints, angles) = squat_capture(&[]);
        let segmenter = Segmenter::new(&AnalysisConfig::default());
        assert_eq!(
            segmenter.segment(&joints, &angles),
            segmenter.segment(&joints, &angles)
        );
    }

    #[test]
    fn test_short_capture() {
        let angles: Vec<Angle> = (0..5)
            .map(|f| Angle::new(f, "left_knee_3D", 170.0))
            .collect();
        let segmenter = Segmenter::new(&AnalysisConfig::default());

        assert!(matches!(
            segmenter.analyze(&angles),
            Err(Error::EmptySignal {
                required: 10,
                available: 5
            })
        ));
        assert!(segmenter.segment(&[], &angles).is_empty());
        assert!(segmenter.segment(&[], &[]).is_empty());
    }

    #[test]
    fn test_motionless_capture_has_no_repetitions() {
        let angles: Vec<Angle> = (0..200)
            .map(|f| Angle::new(f, "left_knee_3D", 170.0))
            .collect();
        let segmenter = Segmenter::new(&AnalysisConfig::default());

        assert!(matches!(
            segmenter.analyze(&angles),
            Err(Error::NoValidSegments { candidates: 0 })
        ));
        assert!(segmenter.segment(&[], &angles).is_empty());
    }
}
