//! Fundamental records exchanged between the analysis stages.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for one analyzed capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub Uuid);

impl CaptureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw landmark handed over by the pose source for a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseLandmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Detection confidence in [0, 1]
    pub visibility: f64,
}

impl PoseLandmark {
    pub fn new(id: u32, x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            id,
            x,
            y,
            z,
            visibility,
        }
    }
}

/// Named joint position attached to a capture frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub frame: usize,
    pub id: u32,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
}

impl Joint {
    pub fn from_landmark(frame: usize, name: impl Into<String>, landmark: &PoseLandmark) -> Self {
        Self {
            frame,
            id: landmark.id,
            name: name.into(),
            x: landmark.x,
            y: landmark.y,
            z: landmark.z,
            visibility: landmark.visibility,
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Angle value in degrees derived from three joints of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Angle {
    pub frame: usize,
    pub name: String,
    pub value: f64,
}

impl Angle {
    pub fn new(frame: usize, name: impl Into<String>, value: f64) -> Self {
        Self {
            frame,
            name: name.into(),
            value,
        }
    }
}

/// One repetition of the exercise, bounded by inclusive frame numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub repetition_index: usize,
    pub start_frame: usize,
    pub finish_frame: usize,
    pub joints: Vec<Joint>,
    pub angles: Vec<Angle>,
}

impl Segment {
    /// Rebuild a stored reference repetition from its records.
    ///
    /// The span runs from the first to the last frame present in the angles; the
    /// repetition index of a reference is always 0.
    pub fn reference(joints: Vec<Joint>, angles: Vec<Angle>) -> Result<Self> {
        let start_frame = angles.iter().map(|a| a.frame).min();
        let finish_frame = angles.iter().map(|a| a.frame).max();

        match (start_frame, finish_frame) {
            (Some(start_frame), Some(finish_frame)) => Ok(Self {
                repetition_index: 0,
                start_frame,
                finish_frame,
                joints,
                angles,
            }),
            _ => Err(Error::MissingReferenceData(
                "reference segment has no angles".to_string(),
            )),
        }
    }

    /// Number of frames covered by the span
    pub fn frame_count(&self) -> usize {
        self.finish_frame - self.start_frame + 1
    }

    pub fn contains_frame(&self, frame: usize) -> bool {
        frame >= self.start_frame && frame <= self.finish_frame
    }

    /// Values of one named angle in frame order
    pub fn angle_series(&self, name: &str) -> Vec<f64> {
        let mut samples: Vec<(usize, f64)> = self
            .angles
            .iter()
            .filter(|a| a.name == name)
            .map(|a| (a.frame, a.value))
            .collect();
        samples.sort_by_key(|(frame, _)| *frame);
        samples.into_iter().map(|(_, value)| value).collect()
    }

    pub fn angle_names(&self) -> BTreeSet<&str> {
        self.angles.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Difference between the reference and the aligned query value of one angle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleDiff {
    pub repetition_index: usize,
    pub angle_name: String,
    pub reference_frame_index: usize,
    /// `reference - query`, in degrees
    pub diff: f64,
}

/// Configured rule pairing an angle deviation with corrective feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistakeTemplate {
    pub exercise: String,
    pub mistake_name: String,
    pub fix_info: String,
    pub angle_name: String,
    pub threshold: f64,
}

impl MistakeTemplate {
    pub fn is_triggered_by(&self, result: &AngleDiff) -> bool {
        result.angle_name == self.angle_name && result.diff.abs() > self.threshold
    }
}

// Thresholds compare by bit pattern so templates can live in hash sets.
impl PartialEq for MistakeTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.exercise == other.exercise
            && self.mistake_name == other.mistake_name
            && self.fix_info == other.fix_info
            && self.angle_name == other.angle_name
            && self.threshold.to_bits() == other.threshold.to_bits()
    }
}

impl Eq for MistakeTemplate {}

impl Hash for MistakeTemplate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.exercise.hash(state);
        self.mistake_name.hash(state);
        self.fix_info.hash(state);
        self.angle_name.hash(state);
        self.threshold.to_bits().hash(state);
    }
}

/// A mistake template triggered within one repetition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feedback {
    pub repetition_index: usize,
    pub template: MistakeTemplate,
}

/// Comparison output for one repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionReport {
    pub repetition_index: usize,
    pub start_frame: usize,
    pub finish_frame: usize,
    pub results: Vec<AngleDiff>,
    pub feedback: Vec<Feedback>,
}

/// Everything the engine hands to the persistence collaborator for one capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReport {
    pub capture_id: CaptureId,
    pub exercise: String,
    pub analyzed_at: DateTime<Utc>,
    /// Frames that carried a pose
    pub frames: usize,
    pub segments: Vec<Segment>,
    pub repetitions: Vec<RepetitionReport>,
}

impl CaptureReport {
    pub fn empty(capture_id: CaptureId, exercise: impl Into<String>, frames: usize) -> Self {
        Self {
            capture_id,
            exercise: exercise.into(),
            analyzed_at: Utc::now(),
            frames,
            segments: Vec::new(),
            repetitions: Vec::new(),
        }
    }

    pub fn repetition_count(&self) -> usize {
        self.repetitions.len()
    }

    /// Feedback across all repetitions, in repetition order
    pub fn all_feedback(&self) -> impl Iterator<Item = &Feedback> {
        self.repetitions.iter().flat_map(|r| r.feedback.iter())
    }
}
