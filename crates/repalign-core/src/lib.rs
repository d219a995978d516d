//! # Repalign-Core
//!
//! Core types and utilities for the repetition analysis engine: the records passed
//! between stages, joint angle geometry, validated configuration and per-capture
//! ingestion buffers.

pub mod capture;
pub mod collector;
pub mod config;
pub mod error;
pub mod geometry;
pub mod types;

pub use capture::*;
pub use collector::*;
pub use self::config::*;
pub use error::{Error, Result};
pub use geometry::*;
pub use types::*;
