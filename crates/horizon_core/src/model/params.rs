//! Prediction run parameters and auxiliary inputs.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::cron::CronPattern;
use crate::error::AssembleError;

/// How per-entity snapshots are aggregated before emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupingMode {
    /// One group per entity.
    None,
    /// One group per account type; untyped entities collapse into "unknown".
    #[default]
    ByType,
    /// A single group named "total".
    Total,
}

impl GroupingMode {
    pub fn parse(value: &str) -> Result<Self, AssembleError> {
        match value {
            "none" => Ok(GroupingMode::None),
            "type" => Ok(GroupingMode::ByType),
            "total" => Ok(GroupingMode::Total),
            other => Err(AssembleError::UnknownGroupingMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingMode::None => "none",
            GroupingMode::ByType => "type",
            GroupingMode::Total => "total",
        }
    }
}

/// Parameters of one prediction run.
#[derive(Debug, Clone)]
pub struct PredictionParams {
    /// Length of the simulated horizon in days.
    pub duration_days: i32,
    /// Monte Carlo sample budget per stochastic operation.
    pub samples: usize,
    /// Width of the emitted quantile band, in (0, 1); the bounds are
    /// `(1 - q) / 2` and `(1 + q) / 2`.
    pub quantile: f64,
    /// Days on which balance snapshots are emitted.
    pub snapshot_cron: CronPattern,
    pub grouping: GroupingMode,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            duration_days: 365,
            samples: 2000,
            quantile: 0.8,
            snapshot_cron: "*-*-28".parse().expect("static cron pattern"),
            grouping: GroupingMode::default(),
        }
    }
}

/// A labeled date passed through to the sink as a markline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialDate {
    pub date: Date,
    pub name: String,
}

/// Account-type metadata used by by-type grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountType {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}
