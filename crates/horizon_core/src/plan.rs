//! Single-day transfer planning.
//!
//! Answers "which transfers should I actually perform today?" by running the
//! prediction engine over exactly one day with a sample budget of one and
//! collecting the realized transfers. Templates whose fixed amount is not a
//! point value need a caller-supplied override; without one the plan is
//! flagged incomplete. The resulting list feeds
//! [`simplify_transfers`](crate::model::simplify_transfers).

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::cron::CronPattern;
use crate::date_math::add_days;
use crate::error::{BoxError, PredictionError};
use crate::model::{
    ConcreteTransfer, Entity, EntityId, TransferAmount, TransferEndpoint, TransferTemplate,
};
use crate::prediction::{CancelFlag, run_prediction};
use crate::recorder::Recorder;
use crate::uncertain::{SampleConfig, UncertainValue};

/// The realized transfers of one day.
#[derive(Debug, Clone, Default)]
pub struct DayPlan {
    pub transfers: Vec<ConcreteTransfer>,
    /// True when at least one transfer's amount was not a point value and
    /// had to be dropped (missing override, or clamped by a balance limit).
    pub incomplete: bool,
}

struct PlanRecorder {
    transfers: Vec<ConcreteTransfer>,
    incomplete: bool,
}

impl Recorder for PlanRecorder {
    fn record_snapshot(
        &mut self,
        _cfg: &mut SampleConfig,
        _id: &EntityId,
        _day: Date,
        _balance: &UncertainValue,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    fn record_transfer(
        &mut self,
        _cfg: &mut SampleConfig,
        from: &TransferEndpoint,
        to: &TransferEndpoint,
        _day: Date,
        amount: &UncertainValue,
    ) -> Result<(), BoxError> {
        match amount {
            UncertainValue::Fixed { value } => self.transfers.push(ConcreteTransfer {
                from: from.id_str().to_string(),
                to: to.id_str().to_string(),
                amount: *value,
            }),
            _ => self.incomplete = true,
        }
        Ok(())
    }
}

/// Compute the concrete transfers for `day`.
///
/// `overrides` maps template ids to replacement amounts for templates whose
/// fixed amount is a distribution rather than a point value. Zero-amount
/// templates are dropped up front.
pub fn plan_day(
    entities: &[Entity],
    templates: &[TransferTemplate],
    overrides: &FxHashMap<String, f64>,
    day: Date,
    seed: u64,
) -> Result<DayPlan, PredictionError> {
    let mut adjusted: Vec<TransferTemplate> = Vec::new();
    for template in templates.iter().filter(|t| t.applies_on(day)) {
        let mut template = template.clone();
        if let TransferAmount::Fixed(amount) = &template.amount
            && !matches!(amount, UncertainValue::Fixed { .. })
            && let Some(value) = overrides.get(&template.id)
        {
            template.amount = TransferAmount::Fixed(UncertainValue::fixed(*value));
        }
        let zero = match &template.amount {
            TransferAmount::Fixed(amount) => amount.is_zero(),
            TransferAmount::Percent(percent) => *percent == 0.0,
        };
        if zero {
            continue;
        }
        adjusted.push(template);
    }

    let mut cfg = SampleConfig::new(seed, 1);
    let mut recorder = PlanRecorder {
        transfers: Vec::new(),
        incomplete: false,
    };
    // An exact-date cron so the day's snapshot phase still runs (and is
    // ignored by the recorder).
    let snapshot_cron: CronPattern = day
        .to_string()
        .parse()
        .expect("a civil date is a valid cron pattern");
    run_prediction(
        &mut cfg,
        day,
        add_days(day, 1),
        &snapshot_cron,
        entities,
        &adjusted,
        &mut recorder,
        &CancelFlag::new(),
    )?;

    Ok(DayPlan {
        transfers: recorder.transfers,
        incomplete: recorder.incomplete,
    })
}
