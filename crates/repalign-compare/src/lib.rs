//! # Repalign-Compare
//!
//! Reference-aligned comparison of segmented repetitions.
//!
//! Each repetition is compared with a single stored reference repetition, one angle at
//! a time. The two series rarely share a tempo, so they are first aligned with
//! dynamic time warping; the warping path is then collapsed to one query sample per
//! reference frame and the differences are checked against the exercise's mistake
//! table.
//!
//! ## Stages
//!
//! 1. **DTW**: absolute-difference cost, monotone path from `(0, 0)` to the last pair
//! 2. **Reduction**: one query index per reference index, plateaus resolved by policy
//! 3. **Differences**: `reference - query` for every reference frame
//! 4. **Classification**: thresholds on `|diff|`, one feedback per template and repetition
//!
//! [`CaptureAnalyzer`] runs the whole chain for a finished capture, processing
//! repetitions in parallel.

pub mod alignment;
pub mod analyzer;
pub mod dtw;
pub mod mistakes;

pub use alignment::*;
pub use analyzer::*;
pub use dtw::*;
pub use mistakes::*;
