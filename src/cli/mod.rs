//! Command-line interface definitions

pub mod args;

pub use args::{derive_output_path, Cli, Commands};
