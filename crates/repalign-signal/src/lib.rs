//! # Repalign-Signal
//!
//! Repetition segmentation for a finished capture.
//!
//! The joint angle stream is noisy and multi-channel, while a repetition is a single
//! slow cycle. The crate collapses the stream into one exercise signal and detects
//! cycles on it.
//!
//! ## Stages
//!
//! 1. **Features**: pivot angles per frame, keep the most variable ones
//! 2. **Normalization**: min-max scale each kept angle and average per frame
//! 3. **Filtering**: uniform moving average over `fps / filter_scaler` frames
//! 4. **Hysteresis**: stable windows above or below the signal mean flip the state
//! 5. **Candidates**: one per full up/down cycle, extended by one second
//! 6. **Outliers**: drop cycles far from the median length or height, renumber from 1

pub mod features;
pub mod filtering;
pub mod segmenter;

pub use features::*;
pub use filtering::*;
pub use segmenter::*;
