//! Recurring transfer templates and realized transfers.

use std::fmt;

use jiff::civil::Date;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cron::CronPattern;
use crate::model::EntityId;
use crate::uncertain::UncertainValue;

/// One side of a transfer. External endpoints (income sources, expense
/// sinks) are skipped for balance updates but still reported to the
/// recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEndpoint {
    /// The world outside the modeled portfolio.
    External,
    Entity(EntityId),
}

impl TransferEndpoint {
    /// Build from a persisted id column, where the empty string means
    /// external.
    pub fn from_id(id: &str) -> Self {
        if id.is_empty() {
            TransferEndpoint::External
        } else {
            TransferEndpoint::Entity(EntityId::from(id))
        }
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            TransferEndpoint::External => None,
            TransferEndpoint::Entity(id) => Some(id),
        }
    }

    /// The persisted/wire representation; external is the empty string.
    pub fn id_str(&self) -> &str {
        match self {
            TransferEndpoint::External => "",
            TransferEndpoint::Entity(id) => id.as_str(),
        }
    }
}

impl fmt::Display for TransferEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_str())
    }
}

/// How a template's amount is determined.
#[derive(Debug, Clone)]
pub enum TransferAmount {
    /// A point or distributed amount, used as-is.
    Fixed(UncertainValue),
    /// A fraction (0..1) of the source balance as observed at the entry of
    /// the template's priority group.
    Percent(f64),
}

/// A recurring transfer rule.
#[derive(Debug, Clone)]
pub struct TransferTemplate {
    pub id: String,
    pub name: String,
    pub from: TransferEndpoint,
    pub to: TransferEndpoint,
    pub amount: TransferAmount,
    /// Lower runs first; equal priorities run in insertion order.
    pub priority: i64,
    pub recurrence: CronPattern,
    pub effective_from: Date,
    pub effective_to: Option<Date>,
    pub enabled: bool,
}

impl TransferTemplate {
    /// Whether the template fires on `day`: enabled, effective window covers
    /// the day, recurrence matches.
    pub fn applies_on(&self, day: Date) -> bool {
        self.enabled
            && self.effective_from <= day
            && self.effective_to.is_none_or(|end| day <= end)
            && self.recurrence.matches(day)
    }
}

/// A realized point-amount transfer, the unit of post-processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcreteTransfer {
    pub from: String,
    pub to: String,
    pub amount: f64,
}

/// Net and merge realized transfers for presentation.
///
/// External and self transfers are dropped; opposing transfers between the
/// same pair of accounts cancel directionally; zero nets disappear. The
/// result is sorted by source then target.
pub fn simplify_transfers(transfers: &[ConcreteTransfer]) -> Vec<ConcreteTransfer> {
    let mut net: FxHashMap<(String, String), f64> = FxHashMap::default();
    for t in transfers {
        if t.from.is_empty() || t.to.is_empty() || t.from == t.to {
            continue;
        }
        let key = (t.from.clone(), t.to.clone());
        let reverse_key = (t.to.clone(), t.from.clone());
        if let Some(reverse_amount) = net.get(&reverse_key).copied() {
            let remainder = reverse_amount - t.amount;
            if remainder > 0.0 {
                net.insert(reverse_key, remainder);
            } else if remainder < 0.0 {
                net.remove(&reverse_key);
                net.insert(key, -remainder);
            } else {
                net.remove(&reverse_key);
            }
        } else {
            *net.entry(key).or_insert(0.0) += t.amount;
        }
    }

    let mut result: Vec<ConcreteTransfer> = net
        .into_iter()
        .filter(|(_, amount)| *amount != 0.0)
        .map(|((from, to), amount)| ConcreteTransfer { from, to, amount })
        .collect();
    result.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
    result
}
