//! Capture analyzer orchestrating segmentation, alignment and classification.

use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;

use repalign_core::{AnalysisConfig, Capture, CaptureReport, RepetitionReport, Result, Segment};
use repalign_signal::Segmenter;

use crate::alignment::AlignmentEngine;
use crate::mistakes::{MistakeCatalog, MistakeClassifier};

/// Complete post-capture analyzer for one exercise
pub struct CaptureAnalyzer {
    config: Arc<AnalysisConfig>,
    exercise: String,
    segmenter: Segmenter,
    engine: AlignmentEngine,
    classifier: MistakeClassifier,
}

impl CaptureAnalyzer {
    /// Build an analyzer from the exercise's comparison angles and mistake table
    pub fn new(config: Arc<AnalysisConfig>, exercise: &str) -> Result<Self> {
        let exercise_config = config.exercise(exercise)?;
        let angle_names = config.comparison_angle_names(exercise)?;
        let catalog = MistakeCatalog::for_exercise(exercise, exercise_config);

        tracing::debug!(
            exercise,
            angles = angle_names.len(),
            templates = catalog.len(),
            "analyzer ready"
        );

        Ok(Self {
            segmenter: Segmenter::new(&config),
            engine: AlignmentEngine::new(angle_names, config.alignment.plateau),
            classifier: MistakeClassifier::new(catalog),
            exercise: exercise.to_string(),
            config,
        })
    }

    /// Replace the configured mistake table, e.g. with one loaded from JSON
    pub fn with_catalog(mut self, catalog: MistakeCatalog) -> Self {
        self.classifier = MistakeClassifier::new(catalog);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn exercise(&self) -> &str {
        &self.exercise
    }

    /// Compare one repetition against the reference
    pub fn compare(&self, segment: &Segment, reference: &Segment) -> RepetitionReport {
        let results = self.engine.align(segment, reference);
        let feedback = self.classifier.classify(segment.repetition_index, &results);

        tracing::debug!(
            repetition = segment.repetition_index,
            results = results.len(),
            feedback = feedback.len(),
            "repetition compared"
        );

        RepetitionReport {
            repetition_index: segment.repetition_index,
            start_frame: segment.start_frame,
            finish_frame: segment.finish_frame,
            results,
            feedback,
        }
    }

    /// Segment a finished capture and compare every repetition.
    ///
    /// Repetitions are independent read-only tasks and run in parallel; the report
    /// keeps them in repetition order.
    pub fn analyze(&self, capture: &Capture, reference: &Segment) -> CaptureReport {
        if capture.is_empty() {
            tracing::warn!(
                capture = %capture.id.0,
                frames = capture.frames_offered,
                "capture has no usable frames"
            );
            return CaptureReport::empty(capture.id, &self.exercise, capture.frames_with_pose);
        }

        let segments = self.segmenter.segment(&capture.joints, &capture.angles);

        let repetitions: Vec<RepetitionReport> = segments
            .par_iter()
            .map(|segment| self.compare(segment, reference))
            .collect();

        let report = CaptureReport {
            capture_id: capture.id,
            exercise: self.exercise.clone(),
            analyzed_at: Utc::now(),
            frames: capture.frames_with_pose,
            segments,
            repetitions,
        };

        tracing::info!(
            capture = %capture.id.0,
            repetitions = report.repetition_count(),
            feedback = report.all_feedback().count(),
            "capture analyzed"
        );

        report
    }
}
