//! Pipeline module - configuration resolution, column formatting and
//! per-replicate feature transformation

pub mod config;
pub mod format;
pub mod loader;
pub mod transform;

pub use config::*;
pub use format::*;
pub use loader::*;
pub use transform::{
    replicate_frame, replicate_ids, FittedColumnTransform, TransformError, TransformPipeline,
    FEATURE_SEP,
};
