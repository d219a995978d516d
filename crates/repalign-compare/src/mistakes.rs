//! Mistake catalog and per-repetition classification.

use std::collections::HashSet;

use repalign_core::{AngleDiff, Error, ExerciseConfig, Feedback, MistakeEntry, MistakeTemplate, Result};

/// Flattened mistake table of one exercise.
///
/// Each `{angle_name, threshold}` error of a mistake becomes its own template.
#[derive(Debug, Clone, Default)]
pub struct MistakeCatalog {
    exercise: String,
    templates: Vec<MistakeTemplate>,
}

impl MistakeCatalog {
    pub fn for_exercise(exercise: &str, config: &ExerciseConfig) -> Self {
        Self::from_entries(exercise, config.mistakes.iter())
    }

    /// Parse a `mistake_name -> {fix_info, errors}` JSON table, keeping document order
    pub fn from_json_str(exercise: &str, json: &str) -> Result<Self> {
        let table: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;

        let mut entries = Vec::with_capacity(table.len());
        for (name, value) in table {
            let entry: MistakeEntry = serde_json::from_value(value).map_err(|e| {
                Error::Config(format!("mistake '{}' of '{}': {}", name, exercise, e))
            })?;
            entries.push((name, entry));
        }

        Ok(Self::from_entries(
            exercise,
            entries.iter().map(|(name, entry)| (name, entry)),
        ))
    }

    fn from_entries<'a>(
        exercise: &str,
        entries: impl Iterator<Item = (&'a String, &'a MistakeEntry)>,
    ) -> Self {
        let templates = entries
            .flat_map(|(mistake_name, entry)| {
                entry.errors.iter().map(move |error| MistakeTemplate {
                    exercise: exercise.to_string(),
                    mistake_name: mistake_name.clone(),
                    fix_info: entry.fix_info.clone(),
                    angle_name: error.angle_name.clone(),
                    threshold: error.threshold,
                })
            })
            .collect();

        Self {
            exercise: exercise.to_string(),
            templates,
        }
    }

    pub fn exercise(&self) -> &str {
        &self.exercise
    }

    pub fn templates(&self) -> &[MistakeTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Turns a repetition's angle differences into feedback
#[derive(Debug, Clone)]
pub struct MistakeClassifier {
    catalog: MistakeCatalog,
}

impl MistakeClassifier {
    pub fn new(catalog: MistakeCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &MistakeCatalog {
        &self.catalog
    }

    /// Templates triggered by at least one result, each reported once, in catalog order
    pub fn classify(&self, repetition_index: usize, results: &[AngleDiff]) -> Vec<Feedback> {
        let mut seen = HashSet::new();

        self.catalog
            .templates()
            .iter()
            .filter(|template| results.iter().any(|r| template.is_triggered_by(r)))
            .filter(|template| seen.insert(*template))
            .map(|template| Feedback {
                repetition_index,
                template: template.clone(),
            })
            .collect()
    }
}
