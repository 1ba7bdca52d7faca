//! Image constraint checking and optimization

pub mod constraints;
pub mod optimizer;

pub use constraints::{is_acceptable, target_preset, MAX_FILE_SIZE};
pub use optimizer::{ImageOptimizer, OptimizeOutcome, DERIVED_MAX_AGE, DERIVED_SUFFIX};
