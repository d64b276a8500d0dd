//! Accounts and their runtime simulation state.

use std::fmt;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::cron::CronPattern;
use crate::model::growth::GrowthModel;
use crate::uncertain::{SampleConfig, UncertainValue};

/// Stable external identifier of an entity (account).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// An observed balance reading on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub date: Date,
    pub balance: UncertainValue,
}

/// Caps the entity's balance: inbound transfers are clamped so the
/// post-transfer balance stays at or below `upper`, per sample.
#[derive(Debug, Clone)]
pub struct BalanceLimit {
    pub upper: UncertainValue,
}

/// Diverts accrued appreciation on matching days. With no destination the
/// appreciation revalues the entity itself; with one, it lands on the
/// destination's balance as a cash effect (interest payouts, loan interest).
#[derive(Debug, Clone)]
pub struct CashFlowRule {
    pub recurrence: CronPattern,
    pub destination: Option<EntityId>,
}

/// Static description of an account entering a prediction run.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Account-type id used by by-type grouping; `None` collapses into the
    /// "unknown" group.
    pub type_id: Option<String>,
    pub balance_limit: Option<BalanceLimit>,
    /// Sorted ascending by date, no duplicates.
    pub snapshots: Vec<BalanceSnapshot>,
    pub growth: Option<GrowthModel>,
    pub cash_flow: Option<CashFlowRule>,
}

impl Entity {
    /// The latest snapshot with `date <= day`, if any.
    pub fn latest_snapshot_at(&self, day: Date) -> Option<&BalanceSnapshot> {
        let idx = self.snapshots.partition_point(|s| s.date <= day);
        if idx == 0 {
            return None;
        }
        Some(&self.snapshots[idx - 1])
    }
}

/// Per-run mutable state of one entity.
///
/// Created at loop start from the latest snapshot at or before the
/// simulation start (entities with no usable history start at zero), mutated
/// once per simulated day, and dropped when the loop ends.
#[derive(Debug)]
pub struct ModeledEntity {
    pub entity: Entity,
    pub(crate) balance: UncertainValue,
    pub(crate) accrued_appreciation: UncertainValue,
    pub(crate) last_snapshot_date: Date,
}

impl ModeledEntity {
    pub fn new(entity: Entity, start: Date) -> Self {
        let (balance, last_snapshot_date) = match entity.latest_snapshot_at(start) {
            Some(snapshot) => (snapshot.balance.clone(), snapshot.date),
            None => (UncertainValue::fixed(0.0), start),
        };
        Self {
            entity,
            balance,
            accrued_appreciation: UncertainValue::fixed(0.0),
            last_snapshot_date,
        }
    }

    pub fn balance(&self) -> &UncertainValue {
        &self.balance
    }

    pub fn accrued_appreciation(&self) -> &UncertainValue {
        &self.accrued_appreciation
    }

    pub fn last_snapshot_date(&self) -> Date {
        self.last_snapshot_date
    }

    /// Accrue one day of growth. The delta is computed on the total of
    /// balance and already-accrued appreciation so growth compounds daily,
    /// but it lands on `accrued_appreciation` only; balances move at
    /// appreciation-commit time.
    pub fn apply_growth(&mut self, cfg: &mut SampleConfig, day: Date) {
        let delta = match &self.entity.growth {
            Some(model) if model.is_active_on(day) => {
                let total = self.balance.add(cfg, &self.accrued_appreciation);
                model.apply(cfg, day, &total)
            }
            _ => return,
        };
        self.accrued_appreciation = self.accrued_appreciation.add(cfg, &delta);
    }
}
