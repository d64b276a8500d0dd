//! The daily prediction loop and its orchestration.
//!
//! [`run_prediction`] drives every calendar day from the earliest modeled
//! snapshot to the horizon. Within a day the phases are strictly ordered:
//! transfers (only once the simulation start is reached), growth accrual,
//! appreciation commit, snapshot emission, cancellation poll. Growth is
//! accrued separately from balances and only materialises at commit time, so
//! snapshots always observe post-commit balances.
//!
//! [`predict`] is the orchestration the server seam calls: it derives the
//! simulation window from the observed history, brackets the run with the
//! grouping recorder's `setup`/`close`, and owns the run's `SampleConfig`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::apply::apply_daily_transfers;
use crate::cron::CronPattern;
use crate::date_math::{add_days, days};
use crate::error::PredictionError;
use crate::grouping::GroupingRecorder;
use crate::model::{
    AccountType, Entity, EntityId, ModeledEntity, PredictionParams, SpecialDate, TransferTemplate,
};
use crate::recorder::{EventSink, Recorder};
use crate::uncertain::{SampleConfig, UncertainValue};

/// Caller-owned cancellation signal, polled once per simulated day.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything the input assembler hands to a prediction run.
#[derive(Debug, Clone, Default)]
pub struct PredictionInput {
    pub entities: Vec<Entity>,
    /// Sorted by priority ascending; insertion order breaks ties.
    pub templates: Vec<TransferTemplate>,
    pub account_types: Vec<AccountType>,
    pub special_dates: Vec<SpecialDate>,
}

/// Run the daily loop over `[earliest modeled snapshot, to)`, emitting
/// through `recorder`. Transfers apply only from `from` onwards; the days
/// before back-fill growth between each entity's last observed snapshot and
/// the simulation start. Every calendar day is visited so daily-compounded
/// growth compounds daily.
#[allow(clippy::too_many_arguments)]
pub fn run_prediction<R: Recorder>(
    cfg: &mut SampleConfig,
    from: Date,
    to: Date,
    snapshot_cron: &CronPattern,
    entities: &[Entity],
    templates: &[TransferTemplate],
    recorder: &mut R,
    cancel: &CancelFlag,
) -> Result<(), PredictionError> {
    // Stable iteration order; the map alone would make RNG consumption (and
    // with it the emitted stream) depend on hash order.
    let order: Vec<EntityId> = entities.iter().map(|e| e.id.clone()).collect();
    let mut modeled: FxHashMap<EntityId, ModeledEntity> = FxHashMap::default();
    let mut earliest = from;
    for entity in entities {
        let m = ModeledEntity::new(entity.clone(), from);
        if m.last_snapshot_date() < earliest {
            earliest = m.last_snapshot_date();
        }
        modeled.insert(entity.id.clone(), m);
    }

    let mut matching: Vec<&TransferTemplate> = Vec::new();
    for day in days(earliest, to) {
        if from <= day {
            matching.clear();
            matching.extend(templates.iter().filter(|t| t.applies_on(day)));
            if !matching.is_empty() {
                apply_daily_transfers(cfg, &mut modeled, &order, &matching, day, recorder)?;
            }
        }

        for id in &order {
            if let Some(entity) = modeled.get_mut(id)
                && entity.last_snapshot_date() < day
            {
                entity.apply_growth(cfg, day);
            }
        }

        for id in &order {
            commit_appreciation(cfg, &mut modeled, id, day)?;
        }

        if snapshot_cron.matches(day) {
            for id in &order {
                let Some(entity) = modeled.get_mut(id) else {
                    continue;
                };
                if entity.last_snapshot_date() < day {
                    recorder
                        .record_snapshot(cfg, id, day, entity.balance())
                        .map_err(PredictionError::Recorder)?;
                    entity.last_snapshot_date = day;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PredictionError::Cancelled);
        }
    }
    Ok(())
}

/// Commit one entity's accrued appreciation for `day`.
///
/// Without a cash-flow rule (or with a matching rule that has no
/// destination) the appreciation revalues the entity itself. A matching rule
/// with a destination moves it to the destination's balance instead. A
/// non-matching rule carries the accrual forward.
fn commit_appreciation(
    cfg: &mut SampleConfig,
    entities: &mut FxHashMap<EntityId, ModeledEntity>,
    id: &EntityId,
    day: Date,
) -> Result<(), PredictionError> {
    enum Commit {
        Revalue(UncertainValue),
        Divert(EntityId, UncertainValue),
    }

    let commit = {
        let Some(entity) = entities.get_mut(id) else {
            return Ok(());
        };
        if entity.last_snapshot_date() >= day || entity.accrued_appreciation.is_zero() {
            return Ok(());
        }
        let matches = entity
            .entity
            .cash_flow
            .as_ref()
            .map(|rule| rule.recurrence.matches(day));
        let destination = entity
            .entity
            .cash_flow
            .as_ref()
            .and_then(|rule| rule.destination.clone());
        match (matches, destination) {
            // No rule at all: appreciation continuously folds into the
            // balance.
            (None, _) => {
                let accrued = take_accrued(entity);
                Commit::Revalue(accrued)
            }
            (Some(true), None) => {
                let accrued = take_accrued(entity);
                Commit::Revalue(accrued)
            }
            (Some(true), Some(destination)) => {
                let accrued = take_accrued(entity);
                Commit::Divert(destination, accrued)
            }
            (Some(false), _) => return Ok(()),
        }
    };

    match commit {
        Commit::Revalue(accrued) => {
            if let Some(entity) = entities.get_mut(id) {
                entity.balance = entity.balance.add(cfg, &accrued);
            }
        }
        Commit::Divert(destination, accrued) => {
            let Some(dest) = entities.get_mut(&destination) else {
                return Err(PredictionError::UnknownCashFlowDestination {
                    entity: id.clone(),
                    destination,
                });
            };
            if dest.last_snapshot_date() > day {
                return Err(PredictionError::InconsistentCashFlowDestination {
                    entity: id.clone(),
                    destination,
                    day,
                });
            }
            dest.balance = dest.balance.add(cfg, &accrued);
        }
    }
    Ok(())
}

fn take_accrued(entity: &mut ModeledEntity) -> UncertainValue {
    std::mem::replace(&mut entity.accrued_appreciation, UncertainValue::fixed(0.0))
}

/// Run a complete prediction: derive the simulation window, emit `setup`,
/// drive the daily loop through the grouping recorder, and `close` the sink.
///
/// The simulation starts the day after the latest observed snapshot (never
/// before the day after `today`) and ends `duration_days` later.
pub fn predict<S: EventSink>(
    input: &PredictionInput,
    params: &PredictionParams,
    today: Date,
    seed: u64,
    sink: S,
    cancel: &CancelFlag,
) -> Result<S, PredictionError> {
    let mut cfg = SampleConfig::new(seed, params.samples);

    let mut start = today;
    for entity in &input.entities {
        for snapshot in &entity.snapshots {
            if snapshot.date > start {
                start = snapshot.date;
            }
        }
    }
    let start = add_days(start, 1);
    let end = add_days(start, params.duration_days);

    let mut recorder = GroupingRecorder::new(
        sink,
        params.grouping,
        params.quantile,
        &input.entities,
        &input.account_types,
    );
    recorder
        .setup(&mut cfg, &input.entities, end, &input.special_dates)
        .map_err(PredictionError::Recorder)?;
    run_prediction(
        &mut cfg,
        start,
        end,
        &params.snapshot_cron,
        &input.entities,
        &input.templates,
        &mut recorder,
        cancel,
    )?;
    recorder.close().map_err(PredictionError::Recorder)?;
    Ok(recorder.into_sink())
}
