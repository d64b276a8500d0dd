//! Personal-finance projection engine.
//!
//! This crate is the simulation kernel behind Horizon: given accounts with
//! observed balance history, recurring transfer templates, per-account
//! growth models and stochastic inputs expressed as probability
//! distributions, it simulates day-by-day balance evolution over a horizon
//! and emits periodic snapshots with mean and quantile bounds.
//!
//! The moving parts:
//! - [`uncertain`]: scalar random variables, their arithmetic and sampling
//! - [`cron`]: `Y-M-D` recurrence patterns
//! - [`model`]: entities, growth models, transfer templates
//! - [`prediction`]: the daily loop and run orchestration
//! - [`grouping`]: aggregation of emitted snapshots by entity/type/total
//! - [`assemble`]: persisted rows to value objects
//! - [`plan`]: single-day concrete-transfer planning
//!
//! Runs are deterministic: all sampling flows through a seeded
//! [`SampleConfig`](uncertain::SampleConfig) owned by the run, and identical
//! inputs with an identical seed produce an identical event stream.

#![warn(clippy::all)]

pub mod apply;
pub mod assemble;
pub mod cron;
pub mod date_math;
pub mod error;
pub mod grouping;
pub mod model;
pub mod plan;
pub mod prediction;
pub mod recorder;
pub mod uncertain;

#[cfg(test)]
mod tests;

pub use cron::CronPattern;
pub use error::{AssembleError, CronError, PredictionError, UncertainError};
pub use grouping::GroupingRecorder;
pub use prediction::{CancelFlag, PredictionInput, predict, run_prediction};
pub use uncertain::{SampleConfig, UncertainValue};
