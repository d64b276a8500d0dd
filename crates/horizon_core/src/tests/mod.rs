//! Integration tests for the prediction engine.
//!
//! Tests are organized by topic:
//! - `scenarios` - End-to-end account projections over a year
//! - `stream` - Event stream ordering, conservation, determinism

mod stream;

use jiff::civil::{Date, date};

use crate::error::BoxError;
use crate::model::{
    BalanceSnapshot, CashFlowRule, Entity, EntityId, FixedGrowth, GrowthModel, LogNormalGrowth,
    TimeFrame, TransferAmount, TransferEndpoint, TransferTemplate,
};
use crate::recorder::Recorder;
use crate::uncertain::{SampleConfig, UncertainValue};

pub(crate) fn first_date() -> Date {
    date(1999, 12, 31)
}

pub(crate) fn start_date() -> Date {
    date(2000, 1, 1)
}

/// One year plus two days, matching a run that snapshots through the final
/// month boundary.
pub(crate) fn end_date() -> Date {
    date(2001, 1, 3)
}

pub(crate) fn account(name: &str) -> Entity {
    Entity {
        id: name.into(),
        name: name.to_string(),
        type_id: None,
        balance_limit: None,
        snapshots: vec![],
        growth: None,
        cash_flow: None,
    }
}

pub(crate) fn with_balance(mut entity: Entity, day: Date, balance: UncertainValue) -> Entity {
    entity.snapshots.push(BalanceSnapshot {
        date: day,
        balance,
    });
    entity
}

pub(crate) fn with_interest(
    mut entity: Entity,
    annual_rate: UncertainValue,
    payment_cron: &str,
    payout_account: &str,
) -> Entity {
    entity.growth = Some(GrowthModel::Fixed(FixedGrowth {
        time_frame: TimeFrame::default(),
        annual_rate,
    }));
    entity.cash_flow = Some(CashFlowRule {
        recurrence: payment_cron.parse().unwrap(),
        destination: if payout_account.is_empty() {
            None
        } else {
            Some(payout_account.into())
        },
    });
    entity
}

pub(crate) fn with_lognormal_growth(
    mut entity: Entity,
    annual_rate: UncertainValue,
    annual_volatility: Option<UncertainValue>,
) -> Entity {
    entity.growth = Some(GrowthModel::LogNormal(LogNormalGrowth {
        time_frame: TimeFrame::default(),
        annual_rate,
        annual_volatility,
    }));
    entity
}

pub(crate) fn transfer(
    id: &str,
    from: &str,
    to: &str,
    priority: i64,
    cron: &str,
    amount: TransferAmount,
) -> TransferTemplate {
    TransferTemplate {
        id: id.to_string(),
        name: id.to_string(),
        from: TransferEndpoint::from_id(from),
        to: TransferEndpoint::from_id(to),
        amount,
        priority,
        recurrence: cron.parse().unwrap(),
        effective_from: Date::MIN,
        effective_to: None,
        enabled: true,
    }
}

/// Records the last emitted balance per entity, like a chart consumer that
/// only cares about the end of the horizon.
#[derive(Default)]
pub(crate) struct LastBalanceRecorder {
    pub last: std::collections::BTreeMap<EntityId, (Date, UncertainValue)>,
}

impl Recorder for LastBalanceRecorder {
    fn record_snapshot(
        &mut self,
        _cfg: &mut SampleConfig,
        id: &EntityId,
        day: Date,
        balance: &UncertainValue,
    ) -> Result<(), BoxError> {
        match self.last.get(id) {
            Some((seen, _)) if *seen >= day => {}
            _ => {
                self.last.insert(id.clone(), (day, balance.clone()));
            }
        }
        Ok(())
    }

    fn record_transfer(
        &mut self,
        _cfg: &mut SampleConfig,
        _from: &TransferEndpoint,
        _to: &TransferEndpoint,
        _day: Date,
        _amount: &UncertainValue,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Whether a projected balance is plausibly around `target`: within the
/// central 95% band for empirical values, within 2% of the mean otherwise.
pub(crate) fn is_around(value: &UncertainValue, target: f64) -> bool {
    match value {
        UncertainValue::Empirical { .. } => {
            let q = value.quantiles().unwrap();
            q.at(0.025) <= target && target <= q.at(0.975)
        }
        _ => {
            let mean = value.mean().unwrap();
            mean * 0.98 <= target && target <= mean * 1.02
        }
    }
}
