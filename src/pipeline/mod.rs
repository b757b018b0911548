//! Prediction Pipeline
//!
//! ## Cycle
//!
//! ```text
//! ingest ──► forward prep ──► forward models ──► intermediate_features.csv
//!                                                        │
//! CycleReport ◄── delta ◄── inverse models ◄── reverse prep
//! ```
//!
//! Both directions share the same contract: read a staged artifact, take
//! the last `window_size` rows, normalize, run every registry entry (in
//! parallel) and inverse-scale each output back to real units.

mod cycle;
pub mod forward;
pub mod inverse;
mod preprocess;
mod window;

pub use cycle::CyclePipeline;
pub use forward::ForwardPipeline;
pub use inverse::InversePipeline;
pub use preprocess::{ForwardProjection, Preprocessor, ReverseProjection};
