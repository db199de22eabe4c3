//! Report module - metrics, calibration export and run summaries

pub mod calibration;
pub mod metrics;
pub mod summary;

pub use calibration::*;
pub use metrics::*;
pub use summary::*;
