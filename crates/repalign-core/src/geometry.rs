//! Joint angle geometry.
//!
//! Every configured angle is measured at its middle joint (the anatomical vertex)
//! between the two limbs pointing at the outer joints. Besides the full 3D value,
//! planar variants are measured after dropping one coordinate axis.

use std::collections::HashMap;

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::types::{Angle, Joint};

/// Axis selection for an angle variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    #[serde(rename = "3D")]
    Full3D,
    /// Sagittal-plane view: keeps y and z
    #[serde(rename = "roll")]
    Roll,
    /// Keeps x and z
    #[serde(rename = "pitch")]
    Pitch,
    /// Frontal-plane view: keeps x and y
    #[serde(rename = "yaw")]
    Yaw,
}

impl Projection {
    pub const PLANAR: [Projection; 3] = [Projection::Roll, Projection::Pitch, Projection::Yaw];

    pub fn suffix(&self) -> &'static str {
        match self {
            Projection::Full3D => "3D",
            Projection::Roll => "roll",
            Projection::Pitch => "pitch",
            Projection::Yaw => "yaw",
        }
    }

    /// Name of this variant of a configured angle, e.g. `left_knee_roll`
    pub fn angle_name(&self, base: &str) -> String {
        format!("{}_{}", base, self.suffix())
    }

    fn project(&self, v: &Vector3<f64>) -> Vector2<f64> {
        match self {
            Projection::Roll => Vector2::new(v.y, v.z),
            Projection::Pitch => Vector2::new(v.x, v.z),
            Projection::Yaw | Projection::Full3D => Vector2::new(v.x, v.y),
        }
    }

    /// Angle at `b` in degrees for this projection
    pub fn angle(&self, a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Option<f64> {
        match self {
            Projection::Full3D => vertex_angle(&(a - b), &(c - b)),
            planar => vertex_angle(
                &(planar.project(a) - planar.project(b)),
                &(planar.project(c) - planar.project(b)),
            ),
        }
    }
}

/// Angle in degrees between two limb vectors sharing a vertex.
///
/// Returns `None` when either vector has zero length. The cosine is clamped to
/// [-1, 1] so nearly parallel limbs never produce NaN.
fn vertex_angle<const D: usize>(
    ba: &nalgebra::SVector<f64, D>,
    bc: &nalgebra::SVector<f64, D>,
) -> Option<f64> {
    let norms = ba.norm() * bc.norm();
    if norms == 0.0 || !norms.is_finite() {
        return None;
    }
    let cosine = (ba.dot(bc) / norms).clamp(-1.0, 1.0);
    Some(cosine.acos().to_degrees())
}

/// Angle at vertex `b` formed by `a` and `c`, in degrees within [0, 180]
pub fn joint_angle(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Result<f64> {
    Projection::Full3D
        .angle(a, b, c)
        .ok_or_else(|| Error::DegenerateInput {
            angle: Projection::Full3D.suffix().to_string(),
        })
}

/// Planar variant of [`joint_angle`]
pub fn projected_angle(
    projection: Projection,
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
) -> Result<f64> {
    projection
        .angle(a, b, c)
        .ok_or_else(|| Error::DegenerateInput {
            angle: projection.suffix().to_string(),
        })
}

#[derive(Debug, Clone)]
struct AngleDefinition {
    name: String,
    joints: [u32; 3],
}

/// Computes every configured named angle for one frame of joints
#[derive(Debug, Clone)]
pub struct AngleExtractor {
    definitions: Vec<AngleDefinition>,
    projections: Vec<Projection>,
}

impl AngleExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        let definitions = config
            .angles
            .iter()
            .map(|spec| AngleDefinition {
                name: spec.name.clone(),
                joints: spec.joints,
            })
            .collect();

        Self {
            definitions,
            projections: config.angle_projections(),
        }
    }

    /// Names of every angle this extractor can produce
    pub fn angle_names(&self) -> Vec<String> {
        self.definitions
            .iter()
            .flat_map(|d| self.projections.iter().map(move |p| p.angle_name(&d.name)))
            .collect()
    }

    /// Extract all angles for the joints of a single frame.
    ///
    /// Angles whose joints are missing or degenerate are skipped for this frame only.
    pub fn extract(&self, frame: usize, joints: &[Joint]) -> Vec<Angle> {
        let positions: HashMap<u32, Vector3<f64>> =
            joints.iter().map(|j| (j.id, j.position())).collect();

        let mut angles = Vec::with_capacity(self.definitions.len() * self.projections.len());

        for definition in &self.definitions {
            let [a, b, c] = definition.joints;
            let (Some(a), Some(b), Some(c)) =
                (positions.get(&a), positions.get(&b), positions.get(&c))
            else {
                tracing::trace!(frame, angle = %definition.name, "joint missing, angle skipped");
                continue;
            };

            for projection in &self.projections {
                let name = projection.angle_name(&definition.name);
                match projected_angle(*projection, a, b, c) {
                    Ok(value) => angles.push(Angle::new(frame, name, value)),
                    Err(e) => tracing::trace!(frame, angle = %name, "{}", e),
                }
            }
        }

        angles
    }
}
