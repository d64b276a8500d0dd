//! Ordered application of one day's matured transfers.
//!
//! Templates arrive pre-filtered (enabled, window, recurrence) and sorted by
//! priority; equal priorities keep their insertion order and execute
//! sequentially. Whenever the priority value changes, every entity's balance
//! is sampled into a priority-balance map: percent amounts inside a priority
//! group reference the balances as observed at group entry, not the running
//! ledger.

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::error::PredictionError;
use crate::model::{EntityId, ModeledEntity, TransferAmount, TransferTemplate};
use crate::recorder::Recorder;
use crate::uncertain::{SampleConfig, UncertainValue};

pub(crate) fn apply_daily_transfers<R: Recorder>(
    cfg: &mut SampleConfig,
    entities: &mut FxHashMap<EntityId, ModeledEntity>,
    order: &[EntityId],
    transfers: &[&TransferTemplate],
    day: Date,
    recorder: &mut R,
) -> Result<(), PredictionError> {
    let mut current_priority: Option<i64> = None;
    let mut priority_balances: FxHashMap<EntityId, f64> = FxHashMap::default();

    for transfer in transfers {
        if current_priority != Some(transfer.priority) {
            current_priority = Some(transfer.priority);
            for id in order {
                if let Some(entity) = entities.get(id) {
                    priority_balances.insert(id.clone(), entity.balance.sample(cfg));
                }
            }
        }

        let source_balance = transfer
            .from
            .entity_id()
            .and_then(|id| priority_balances.get(id))
            .copied()
            .unwrap_or(0.0);

        let raw_amount = match &transfer.amount {
            TransferAmount::Fixed(amount) => amount.clone(),
            TransferAmount::Percent(percent) => {
                UncertainValue::fixed(source_balance * percent)
            }
        };

        // Clamp against the destination's upper balance limit, per sample.
        let destination = transfer.to.entity_id().and_then(|id| entities.get(id));
        let limit = destination.and_then(|dest| {
            dest.entity
                .balance_limit
                .as_ref()
                .filter(|l| l.upper.is_valid())
                .map(|l| (dest, &l.upper))
        });
        let amount = match limit {
            Some((dest, upper)) => {
                let headroom = upper.sub(cfg, &dest.balance);
                let raw = raw_amount;
                UncertainValue::mapped(move |cfg| headroom.sample(cfg).min(raw.sample(cfg)))
            }
            None => raw_amount,
        };

        recorder
            .record_transfer(cfg, &transfer.from, &transfer.to, day, &amount)
            .map_err(PredictionError::Recorder)?;

        if let Some(source) = transfer.from.entity_id().and_then(|id| entities.get_mut(id)) {
            source.balance = source.balance.sub(cfg, &amount);
        }
        if let Some(dest) = transfer.to.entity_id().and_then(|id| entities.get_mut(id)) {
            dest.balance = dest.balance.add(cfg, &amount);
        }
    }
    Ok(())
}
