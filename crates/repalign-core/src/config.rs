//! Analysis configuration.
//!
//! Loaded once at startup and validated before any frame is processed, so that a
//! misspelled joint id or angle name fails immediately instead of deep inside the
//! per-frame loop.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Projection;

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Capture frame rate (frames per second)
    pub fps: usize,

    /// Pose-source landmarks to keep, with their names
    pub joints: Vec<JointSpec>,

    /// Named angles measured at the middle joint of each triplet
    pub angles: Vec<AngleSpec>,

    /// Planar variants computed in addition to the 3D angle
    #[serde(default = "default_projections")]
    pub projections: Vec<Projection>,

    #[serde(default)]
    pub segmentation: SegmentationConfig,

    #[serde(default)]
    pub alignment: AlignmentConfig,

    /// Per-exercise comparison angles and mistake tables
    #[serde(default)]
    pub exercises: BTreeMap<String, ExerciseConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointSpec {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AngleSpec {
    pub name: String,
    /// Joint ids `[a, vertex, c]`
    pub joints: [u32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Number of highest-variance angles averaged into the exercise signal (K)
    pub signal_feature_count: usize,

    /// Hysteresis window is `fps / window_scaler` frames
    pub window_scaler: usize,

    /// Low-pass kernel is `fps / filter_scaler` frames
    pub filter_scaler: usize,

    /// Maximum window standard deviation for a stable window
    pub tolerance: f64,

    /// Hysteresis window step (frames)
    pub stride: usize,

    /// Accepted repetition height lies within `[median / s, median * s]`
    pub height_scaler: f64,

    #[serde(default)]
    pub trailing: TrailingContext,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            signal_feature_count: 3,
            window_scaler: 3,
            filter_scaler: 1,
            tolerance: 0.01,
            stride: 1,
            height_scaler: 1.5,
            trailing: TrailingContext::default(),
        }
    }
}

/// How far a repetition reaches past the breakpoint that closes its cycle.
///
/// The same rule applies to every repetition, the last one included, and outlier
/// rejection measures the spans it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingContext {
    /// Stop one row before the closing breakpoint, where the next cycle opens.
    /// Spans never overlap.
    #[default]
    Clipped,
    /// Run `fps` rows past the closing breakpoint, clamped to the capture.
    /// Neighbouring spans overlap by the extension.
    Overlapping,
}

/// Which query index represents a reference index mapped to several query frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateauPolicy {
    #[default]
    KeepLast,
    KeepFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub plateau: PlateauPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExerciseConfig {
    /// Base angle names (expanded to every variant) or full variant names
    pub comparison_angles: Vec<String>,

    /// `mistake_name -> {fix_info, errors}`
    #[serde(default)]
    pub mistakes: BTreeMap<String, MistakeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MistakeEntry {
    pub fix_info: String,
    pub errors: Vec<MistakeError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MistakeError {
    pub angle_name: String,
    /// Absolute deviation in degrees above which the mistake is reported
    pub threshold: f64,
}

fn default_projections() -> Vec<Projection> {
    Projection::PLANAR.to_vec()
}

impl Default for AnalysisConfig {
    /// MediaPipe pose landmarks for lower-body exercises at 30 fps
    fn default() -> Self {
        let joint = |id: u32, name: &str| JointSpec {
            id,
            name: name.to_string(),
        };
        let angle = |name: &str, joints: [u32; 3]| AngleSpec {
            name: name.to_string(),
            joints,
        };
        let error = |angle_name: &str, threshold: f64| MistakeError {
            angle_name: angle_name.to_string(),
            threshold,
        };

        let mut mistakes = BTreeMap::new();
        mistakes.insert(
            "shallow_squat".to_string(),
            MistakeEntry {
                fix_info: "Lower your hips until the thighs are parallel to the floor".to_string(),
                errors: vec![error("left_knee_3D", 20.0), error("right_knee_3D", 20.0)],
            },
        );
        mistakes.insert(
            "torso_lean".to_string(),
            MistakeEntry {
                fix_info: "Keep your chest up and your back straight".to_string(),
                errors: vec![error("left_hip_3D", 25.0), error("right_hip_3D", 25.0)],
            },
        );
        mistakes.insert(
            "knee_valgus".to_string(),
            MistakeEntry {
                fix_info: "Push your knees outward in line with your toes".to_string(),
                errors: vec![error("left_knee_yaw", 15.0), error("right_knee_yaw", 15.0)],
            },
        );

        let mut exercises = BTreeMap::new();
        exercises.insert(
            "squat".to_string(),
            ExerciseConfig {
                comparison_angles: vec![
                    "left_knee".to_string(),
                    "right_knee".to_string(),
                    "left_hip".to_string(),
                    "right_hip".to_string(),
                ],
                mistakes,
            },
        );

        Self {
            fps: 30,
            joints: vec![
                joint(11, "left_shoulder"),
                joint(12, "right_shoulder"),
                joint(23, "left_hip"),
                joint(24, "right_hip"),
                joint(25, "left_knee"),
                joint(26, "right_knee"),
                joint(27, "left_ankle"),
                joint(28, "right_ankle"),
                joint(31, "left_foot_index"),
                joint(32, "right_foot_index"),
            ],
            angles: vec![
                angle("left_knee", [23, 25, 27]),
                angle("right_knee", [24, 26, 28]),
                angle("left_hip", [11, 23, 25]),
                angle("right_hip", [12, 24, 26]),
                angle("left_ankle", [25, 27, 31]),
                angle("right_ankle", [26, 28, 32]),
            ],
            projections: default_projections(),
            segmentation: SegmentationConfig::default(),
            alignment: AlignmentConfig::default(),
            exercises,
        }
    }
}

impl AnalysisConfig {
    /// Load and validate configuration from a file, with `REPALIGN_*` overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("REPALIGN").try_parsing(true))
            .build()?;

        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load and validate configuration from an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;

        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Hysteresis window length in frames
    pub fn signal_window(&self) -> usize {
        self.fps / self.segmentation.window_scaler.max(1)
    }

    /// Low-pass kernel width in frames
    pub fn filter_width(&self) -> usize {
        self.fps / self.segmentation.filter_scaler.max(1)
    }

    pub fn joint_name(&self, id: u32) -> Option<&str> {
        self.joints
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.name.as_str())
    }

    /// The 3D variant followed by each configured planar variant, without repeats
    pub fn angle_projections(&self) -> Vec<Projection> {
        let mut projections = vec![Projection::Full3D];
        for projection in &self.projections {
            if !projections.contains(projection) {
                projections.push(*projection);
            }
        }
        projections
    }

    /// Every angle name the extractor produces
    pub fn produced_angle_names(&self) -> BTreeSet<String> {
        let projections = self.angle_projections();
        self.angles
            .iter()
            .flat_map(|a| projections.iter().map(move |p| p.angle_name(&a.name)))
            .collect()
    }

    pub fn exercise(&self, name: &str) -> Result<&ExerciseConfig> {
        self.exercises
            .get(name)
            .ok_or_else(|| Error::UnknownExercise(name.to_string()))
    }

    /// Full angle names compared for an exercise, in configured order
    pub fn comparison_angle_names(&self, exercise: &str) -> Result<Vec<String>> {
        let exercise = self.exercise(exercise)?;
        let projections = self.angle_projections();
        let produced = self.produced_angle_names();

        let mut names = Vec::new();
        for entry in &exercise.comparison_angles {
            if self.angles.iter().any(|a| &a.name == entry) {
                names.extend(projections.iter().map(|p| p.angle_name(entry)));
            } else if produced.contains(entry) {
                names.push(entry.clone());
            } else {
                return Err(Error::Config(format!(
                    "comparison angle '{}' is not a configured angle",
                    entry
                )));
            }
        }

        let mut seen = HashSet::new();
        names.retain(|n| seen.insert(n.clone()));
        Ok(names)
    }

    /// Check every cross-reference and numeric bound once
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;

        if self.fps == 0 {
            return Err(Error::Config("fps must be positive".into()));
        }
        if seg.signal_feature_count == 0 {
            return Err(Error::Config("signal_feature_count must be positive".into()));
        }
        if seg.stride == 0 {
            return Err(Error::Config("stride must be positive".into()));
        }
        if seg.window_scaler == 0 || self.signal_window() == 0 {
            return Err(Error::Config(format!(
                "window_scaler {} leaves no hysteresis window at {} fps",
                seg.window_scaler, self.fps
            )));
        }
        if seg.filter_scaler == 0 || self.filter_width() == 0 {
            return Err(Error::Config(format!(
                "filter_scaler {} leaves no filter kernel at {} fps",
                seg.filter_scaler, self.fps
            )));
        }
        if !(seg.tolerance.is_finite() && seg.tolerance > 0.0) {
            return Err(Error::Config("tolerance must be a positive number".into()));
        }
        if !(seg.height_scaler.is_finite() && seg.height_scaler > 1.0) {
            return Err(Error::Config("height_scaler must be greater than 1".into()));
        }

        if self.joints.is_empty() {
            return Err(Error::Config("no joints configured".into()));
        }
        let mut joint_ids = HashSet::new();
        let mut joint_names = HashSet::new();
        for joint in &self.joints {
            if !joint_ids.insert(joint.id) {
                return Err(Error::Config(format!("duplicate joint id {}", joint.id)));
            }
            if !joint_names.insert(joint.name.as_str()) {
                return Err(Error::Config(format!("duplicate joint name '{}'", joint.name)));
            }
        }

        if self.angles.is_empty() {
            return Err(Error::Config("no angles configured".into()));
        }
        let mut angle_names = HashSet::new();
        for angle in &self.angles {
            if !angle_names.insert(angle.name.as_str()) {
                return Err(Error::Config(format!("duplicate angle name '{}'", angle.name)));
            }
            if let Some(id) = angle.joints.iter().find(|id| !joint_ids.contains(id)) {
                return Err(Error::Config(format!(
                    "angle '{}' uses unknown joint id {}",
                    angle.name, id
                )));
            }
        }

        let produced = self.produced_angle_names();
        for (exercise_name, exercise) in &self.exercises {
            self.comparison_angle_names(exercise_name)?;

            for (mistake_name, mistake) in &exercise.mistakes {
                for error in &mistake.errors {
                    if !produced.contains(&error.angle_name) {
                        return Err(Error::Config(format!(
                            "mistake '{}' of '{}' references unknown angle '{}'",
                            mistake_name, exercise_name, error.angle_name
                        )));
                    }
                    if !(error.threshold.is_finite() && error.threshold >= 0.0) {
                        return Err(Error::Config(format!(
                            "mistake '{}' of '{}' has invalid threshold {}",
                            mistake_name, exercise_name, error.threshold
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
fps: 30
joints:
  - { id: 23, name: left_hip }
  - { id: 25, name: left_knee }
  - { id: 27, name: left_ankle }
angles:
  - { name: left_knee, joints: [23, 25, 27] }
projections: [roll]
segmentation:
  signal_feature_count: 1
  window_scaler: 3
  filter_scaler: 2
  tolerance: 0.02
  stride: 1
  height_scaler: 1.5
  trailing: overlapping
alignment:
  plateau: keep_first
exercises:
  squat:
    comparison_angles: [left_knee]
    mistakes:
      shallow_squat:
        fix_info: Sit deeper
        errors:
          - { angle_name: left_knee_3D, threshold: 20 }
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.signal_window(), 10);
        assert_eq!(config.filter_width(), 30);
    }

    #[test]
    fn test_yaml_config() {
        let config = AnalysisConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.filter_width(), 15);
        assert_eq!(config.alignment.plateau, PlateauPolicy::KeepFirst);
        assert_eq!(config.segmentation.trailing, TrailingContext::Overlapping);
        assert_eq!(
            config.comparison_angle_names("squat").unwrap(),
            vec!["left_knee_3D".to_string(), "left_knee_roll".to_string()]
        );
    }

    #[test]
    fn test_file_config_with_env_override() {
        let dir = std::env::temp_dir().join(format!("repalign_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("analysis.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let path = path.to_str().unwrap();

        let config = AnalysisConfig::from_file(path).unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.segmentation.filter_scaler, 2);

        std::env::set_var("REPALIGN_FPS", "60");
        let overridden = AnalysisConfig::from_file(path);
        std::env::remove_var("REPALIGN_FPS");
        let overridden = overridden.unwrap();
        assert_eq!(overridden.fps, 60);
        assert_eq!(overridden.signal_window(), 20);
        assert_eq!(overridden.filter_width(), 30);

        assert!(matches!(
            AnalysisConfig::from_file(dir.join("missing.yaml").to_str().unwrap()),
            Err(Error::Config(_))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_key_fails_fast() {
        let yaml = MINIMAL.replace("fps: 30", "fps: 30\nframe_rate: 60");
        assert!(matches!(
            AnalysisConfig::from_yaml_str(&yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_mistake_angle_fails_fast() {
        let yaml = MINIMAL.replace("angle_name: left_knee_3D", "angle_name: left_elbow_3D");
        assert!(matches!(
            AnalysisConfig::from_yaml_str(&yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_angle_with_unknown_joint() {
        let mut config = AnalysisConfig::default();
        config.angles[0].joints = [23, 99, 27];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_height_scaler_must_exceed_one() {
        let mut config = AnalysisConfig::default();
        config.segmentation.height_scaler = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_exercise() {
        let config = AnalysisConfig::default();
        assert!(matches!(
            config.comparison_angle_names("deadlift"),
            Err(Error::UnknownExercise(_))
        ));
    }

    #[test]
    fn test_comparison_expands_base_names() {
        let config = AnalysisConfig::default();
        let names = config.comparison_angle_names("squat").unwrap();
        assert_eq!(names.len(), 4 * 4);
        assert_eq!(names[0], "left_knee_3D");
        assert_eq!(names[1], "left_knee_roll");
    }
}
