//! Reference-aligned per-angle differences for one repetition.

use repalign_core::{AngleDiff, Error, PlateauPolicy, Result, Segment};

use crate::dtw::{dtw_path, reduce_path};

/// Compares repetitions against a fixed reference on a set of angles
#[derive(Debug, Clone)]
pub struct AlignmentEngine {
    angle_names: Vec<String>,
    plateau: PlateauPolicy,
}

impl AlignmentEngine {
    pub fn new(angle_names: Vec<String>, plateau: PlateauPolicy) -> Self {
        Self {
            angle_names,
            plateau,
        }
    }

    pub fn angle_names(&self) -> &[String] {
        &self.angle_names
    }

    /// Align one angle's series and report `reference - query` per reference frame.
    ///
    /// The output has exactly one entry per reference sample, in reference order.
    pub fn align_series(
        &self,
        repetition_index: usize,
        angle_name: &str,
        query: &[f64],
        reference: &[f64],
    ) -> Result<Vec<AngleDiff>> {
        if reference.is_empty() {
            return Err(Error::MissingReferenceData(format!(
                "reference has no samples for {}",
                angle_name
            )));
        }
        let Some(alignment) = dtw_path(query, reference) else {
            return Ok(Vec::new());
        };

        let matched = reduce_path(&alignment.path, self.plateau);
        Ok(matched
            .iter()
            .enumerate()
            .map(|(reference_frame_index, &q)| AngleDiff {
                repetition_index,
                angle_name: angle_name.to_string(),
                reference_frame_index,
                diff: reference[reference_frame_index] - query[q],
            })
            .collect())
    }

    /// Differences for every configured angle of a repetition.
    ///
    /// Angles missing from the reference or the query contribute nothing.
    pub fn align(&self, query: &Segment, reference: &Segment) -> Vec<AngleDiff> {
        let mut results = Vec::new();

        for name in &self.angle_names {
            let query_series = query.angle_series(name);
            if query_series.is_empty() {
                tracing::debug!(
                    repetition = query.repetition_index,
                    angle = %name,
                    "angle absent from repetition"
                );
                continue;
            }

            let reference_series = reference.angle_series(name);
            match self.align_series(query.repetition_index, name, &query_series, &reference_series) {
                Ok(diffs) => results.extend(diffs),
                Err(e) => {
                    tracing::debug!(repetition = query.repetition_index, error = %e, "angle skipped");
                }
            }
        }

        results
    }
}
