//! Error types for the repetition analysis engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Degenerate input for angle {angle}: zero-length joint vector")]
    DegenerateInput { angle: String },

    #[error("Empty signal: need {required} frames for one window, have {available}")]
    EmptySignal { required: usize, available: usize },

    #[error("No valid segments among {candidates} candidates")]
    NoValidSegments { candidates: usize },

    #[error("Missing reference data: {0}")]
    MissingReferenceData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("Frame {frame} arrived after frame {last}")]
    OutOfOrderFrame { frame: usize, last: usize },

    #[error("Collector already finalized")]
    CollectorFinalized,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
