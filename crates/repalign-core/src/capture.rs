//! Per-capture ingestion of pose-source frames.

use std::sync::Arc;

use crate::collector::{Collection, Collector};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::geometry::AngleExtractor;
use crate::types::{Angle, CaptureId, Joint, PoseLandmark};

/// Growing joint/angle buffers for one capture.
///
/// Frames are fed by a single producer in capture order; the frame index is always
/// passed in by the caller.
pub struct CaptureSession {
    id: CaptureId,
    config: Arc<AnalysisConfig>,
    extractor: AngleExtractor,
    joints: Collection<Joint>,
    angles: Collection<Angle>,
    frames_offered: usize,
    frames_with_pose: usize,
    last_frame: Option<usize>,
}

impl CaptureSession {
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        let extractor = AngleExtractor::new(&config);
        Self {
            id: CaptureId::new(),
            config,
            extractor,
            joints: Collection::new(),
            angles: Collection::new(),
            frames_offered: 0,
            frames_with_pose: 0,
            last_frame: None,
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    /// Feed one frame from the pose source.
    ///
    /// `None` or an empty landmark set means no pose was detected; the frame is
    /// skipped without interpolation. Returns the number of angles extracted.
    pub fn ingest(&mut self, frame: usize, landmarks: Option<&[PoseLandmark]>) -> Result<usize> {
        if let Some(last) = self.last_frame {
            if frame <= last {
                return Err(Error::OutOfOrderFrame { frame, last });
            }
        }
        self.last_frame = Some(frame);
        self.frames_offered += 1;

        let landmarks = match landmarks {
            Some(l) if !l.is_empty() => l,
            _ => {
                tracing::trace!(frame, "no pose detected");
                return Ok(0);
            }
        };

        let joints: Vec<Joint> = landmarks
            .iter()
            .filter_map(|landmark| {
                self.config
                    .joint_name(landmark.id)
                    .map(|name| Joint::from_landmark(frame, name, landmark))
            })
            .collect();

        if joints.is_empty() {
            tracing::trace!(frame, "no configured joints in frame");
            return Ok(0);
        }

        let angles = self.extractor.extract(frame, &joints);
        let extracted = angles.len();

        self.joints.extend(joints)?;
        self.angles.extend(angles)?;
        self.frames_with_pose += 1;

        Ok(extracted)
    }

    pub fn frames_with_pose(&self) -> usize {
        self.frames_with_pose
    }

    /// End the capture and freeze its buffers
    pub fn finish(mut self) -> Capture {
        self.joints.finalize();
        self.angles.finalize();

        tracing::info!(
            capture = %self.id.0,
            frames = self.frames_offered,
            with_pose = self.frames_with_pose,
            joints = self.joints.len(),
            angles = self.angles.len(),
            "capture finished"
        );

        Capture {
            id: self.id,
            frames_offered: self.frames_offered,
            frames_with_pose: self.frames_with_pose,
            joints: self.joints.into_items(),
            angles: self.angles.into_items(),
        }
    }
}

/// A finished capture, ready for segmentation
#[derive(Debug, Clone)]
pub struct Capture {
    pub id: CaptureId,
    pub frames_offered: usize,
    pub frames_with_pose: usize,
    pub joints: Vec<Joint>,
    pub angles: Vec<Angle>,
}

impl Capture {
    /// Build a capture from previously stored records
    pub fn from_records(joints: Vec<Joint>, angles: Vec<Angle>) -> Self {
        let mut frames: Vec<usize> = angles.iter().map(|a| a.frame).collect();
        frames.sort_unstable();
        frames.dedup();

        Self {
            id: CaptureId::new(),
            frames_offered: frames.len(),
            frames_with_pose: frames.len(),
            joints,
            angles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(knee_z: f64) -> Vec<PoseLandmark> {
        vec![
            PoseLandmark::new(0, 0.0, 2.0, 0.0, 0.99), // nose, not configured
            PoseLandmark::new(23, 0.0, 1.0, 0.0, 0.9),
            PoseLandmark::new(25, 0.0, 0.5, knee_z, 0.9),
            PoseLandmark::new(27, 0.0, 0.0, 0.0, 0.9),
        ]
    }

    #[test]
    fn test_frames_without_pose_are_skipped() {
        let mut session = CaptureSession::new(Arc::new(AnalysisConfig::default()));

        assert!(session.ingest(0, Some(leg(0.1).as_slice())).unwrap() > 0);
        assert_eq!(session.ingest(1, None).unwrap(), 0);
        assert_eq!(session.ingest(2, Some(Vec::new().as_slice())).unwrap(), 0);
        assert!(session.ingest(3, Some(leg(0.2).as_slice())).unwrap() > 0);

        let capture = session.finish();
        assert_eq!(capture.frames_offered, 4);
        assert_eq!(capture.frames_with_pose, 2);
        assert!(capture.angles.iter().all(|a| a.frame == 0 || a.frame == 3));
    }

    #[test]
    fn test_unconfigured_landmarks_are_dropped() {
        let mut session = CaptureSession::new(Arc::new(AnalysisConfig::default()));
        session.ingest(7, Some(leg(0.1).as_slice())).unwrap();
        let capture = session.finish();

        assert_eq!(capture.joints.len(), 3);
        assert!(capture.joints.iter().all(|j| j.frame == 7));
        let knee = capture.joints.iter().find(|j| j.id == 25).unwrap();
        assert_eq!(knee.name, "left_knee");
    }

    #[test]
    fn test_out_of_order_frame() {
        let mut session = CaptureSession::new(Arc::new(AnalysisConfig::default()));
        session.ingest(5, Some(leg(0.1).as_slice())).unwrap();
        assert!(matches!(
            session.ingest(5, Some(leg(0.1).as_slice())),
            Err(Error::OutOfOrderFrame { frame: 5, last: 5 })
        ));
        assert!(matches!(
            session.ingest(3, None),
            Err(Error::OutOfOrderFrame { frame: 3, last: 5 })
        ));

        let capture = session.finish();
        assert_eq!(capture.frames_offered, 1);
        assert!(capture.joints.iter().all(|j| j.frame == 5));
    }
}
