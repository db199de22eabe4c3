//! Pscore: Propensity and Disease-Risk Score Library
//!
//! A library for estimating propensity scores (PS) and disease-risk
//! scores (DRS) on multiply-imputed tabular cohorts, using a
//! configuration-driven column-transformation pipeline and a bank of
//! candidate classifiers trained independently per imputation replicate.

pub mod cli;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod utils;
