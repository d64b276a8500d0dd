use std::fmt;

use jiff::civil::Date;

use crate::model::EntityId;

/// Sink errors are whatever the wrapped event sink produces.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors related to uncertain-value parsing and arithmetic
#[derive(Debug)]
pub enum UncertainError {
    /// The encoded string is not of the form `name(a[,b])`
    Malformed(String),
    /// The distribution name is not one of the encodable variants
    UnknownDistribution(String),
    /// Parameters violate the variant's validity constraints
    InvalidParameters {
        name: &'static str,
        a: f64,
        b: f64,
    },
    /// A numeric field of the encoded string failed to parse
    ParseNumber {
        input: String,
        source: std::num::ParseFloatError,
    },
    /// The variant has no textual encoding (empirical, mapped)
    Unencodable(&'static str),
    /// The variant has no closed-form mean (mapped)
    MeanUndefined(&'static str),
    /// The variant does not support quantile queries (normal, mapped)
    QuantilesUndefined(&'static str),
}

impl fmt::Display for UncertainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UncertainError::Malformed(s) => write!(f, "invalid encoded value: {s:?}"),
            UncertainError::UnknownDistribution(name) => {
                write!(f, "unknown distribution type: {name:?}")
            }
            UncertainError::InvalidParameters { name, a, b } => {
                write!(f, "invalid {name} distribution ({a}, {b})")
            }
            UncertainError::ParseNumber { input, source } => {
                write!(f, "parsing number {input:?}: {source}")
            }
            UncertainError::Unencodable(name) => {
                write!(f, "{name} distribution cannot be encoded")
            }
            UncertainError::MeanUndefined(name) => {
                write!(f, "{name} distribution does not have a defined mean")
            }
            UncertainError::QuantilesUndefined(name) => {
                write!(f, "{name} distribution does not support quantiles")
            }
        }
    }
}

impl std::error::Error for UncertainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UncertainError::ParseNumber { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors related to cron pattern parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    /// The pattern does not have exactly three `-`-separated fields
    FieldCount(String),
    /// A field is neither `*` nor a comma-separated list of integers
    InvalidField { pattern: String, field: String },
    /// A literal is outside the valid range for its position
    OutOfRange {
        pattern: String,
        field: &'static str,
        value: i16,
    },
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronError::FieldCount(pattern) => {
                write!(f, "cron pattern {pattern:?} must have three Y-M-D fields")
            }
            CronError::InvalidField { pattern, field } => {
                write!(f, "cron pattern {pattern:?} has invalid field {field:?}")
            }
            CronError::OutOfRange {
                pattern,
                field,
                value,
            } => {
                write!(f, "cron pattern {pattern:?}: {field} value {value} out of range")
            }
        }
    }
}

impl std::error::Error for CronError {}

/// Errors raised while assembling persisted rows into value objects
#[derive(Debug)]
pub enum AssembleError {
    Uncertain(UncertainError),
    Cron(CronError),
    InvalidDate { input: String, source: jiff::Error },
    UnknownGrowthModelKind(String),
    UnknownAmountKind(String),
    UnknownGroupingMode(String),
    DuplicateSnapshot { account: EntityId, date: Date },
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::Uncertain(e) => write!(f, "{e}"),
            AssembleError::Cron(e) => write!(f, "{e}"),
            AssembleError::InvalidDate { input, source } => {
                write!(f, "parsing date {input:?}: {source}")
            }
            AssembleError::UnknownGrowthModelKind(kind) => {
                write!(f, "unknown growth model kind: {kind:?}")
            }
            AssembleError::UnknownAmountKind(kind) => {
                write!(f, "unknown transfer amount kind: {kind:?}")
            }
            AssembleError::UnknownGroupingMode(mode) => {
                write!(f, "invalid group by: {mode:?}")
            }
            AssembleError::DuplicateSnapshot { account, date } => {
                write!(f, "account {account} has duplicate snapshots on {date}")
            }
        }
    }
}

impl std::error::Error for AssembleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssembleError::Uncertain(e) => Some(e),
            AssembleError::Cron(e) => Some(e),
            AssembleError::InvalidDate { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<UncertainError> for AssembleError {
    fn from(e: UncertainError) -> Self {
        AssembleError::Uncertain(e)
    }
}

impl From<CronError> for AssembleError {
    fn from(e: CronError) -> Self {
        AssembleError::Cron(e)
    }
}

/// Errors that abort a prediction run
#[derive(Debug)]
pub enum PredictionError {
    /// A cash-flow destination already carries a snapshot past the commit day
    InconsistentCashFlowDestination {
        entity: EntityId,
        destination: EntityId,
        day: Date,
    },
    /// A cash-flow rule names an entity that is not part of the run
    UnknownCashFlowDestination {
        entity: EntityId,
        destination: EntityId,
    },
    /// The caller's cancellation flag fired
    Cancelled,
    /// The event sink refused an event; no further writes were attempted
    Recorder(BoxError),
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionError::InconsistentCashFlowDestination {
                entity,
                destination,
                day,
            } => {
                write!(
                    f,
                    "cash-flow destination {destination} of {entity} has a snapshot after {day}"
                )
            }
            PredictionError::UnknownCashFlowDestination {
                entity,
                destination,
            } => {
                write!(f, "cash-flow destination {destination} of {entity} not found")
            }
            PredictionError::Cancelled => write!(f, "prediction cancelled"),
            PredictionError::Recorder(e) => write!(f, "recording event: {e}"),
        }
    }
}

impl std::error::Error for PredictionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PredictionError::Recorder(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<BoxError> for PredictionError {
    fn from(e: BoxError) -> Self {
        PredictionError::Recorder(e)
    }
}
