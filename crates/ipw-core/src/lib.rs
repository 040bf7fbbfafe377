//! # ipw-core
//!
//! Shared building blocks for ipwstat:
//! - the [`Error`] type and [`Result`] alias used by every crate,
//! - the subject/dataset model ([`Dataset`], [`SubjectRecord`], [`Covariate`]),
//! - derived per-subject annotations ([`PropensityScores`], [`Weights`]),
//! - the pipeline configuration ([`PipelineConfig`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ColumnMap, PipelineConfig, VarianceEstimator};
pub use error::{Error, Result, Stage};
pub use types::{
    Covariate, Dataset, PropensityScores, Stabilization, SubjectRecord, Term, Weights,
};

/// Crate version, reported by `ipwstat version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
