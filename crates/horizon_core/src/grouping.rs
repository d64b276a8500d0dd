//! Aggregation of per-entity observations into emitted groups.
//!
//! The [`GroupingRecorder`] sits between the daily loop and the event sink.
//! It buffers the raw per-entity snapshots of the current day, sums them per
//! group with the uncertain-value algebra, and flushes quantile-bearing
//! events when the day advances (and once more on close). Transfers pass
//! through unaggregated, materialised to a flat representation so sinks can
//! take their mean.

use std::collections::BTreeMap;

use jiff::civil::Date;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::date_math::epoch_ms;
use crate::error::BoxError;
use crate::model::{AccountType, Entity, EntityId, GroupingMode, SpecialDate, TransferEndpoint};
use crate::recorder::{
    EntitySeries, EventSink, Markline, Recorder, SetupEvent, SnapshotEvent, TransferEvent,
};
use crate::uncertain::{SampleConfig, UncertainValue};

const TOTAL_GROUP: &str = "total";
const UNKNOWN_TYPE: &str = "";

#[derive(Debug, Clone)]
struct GroupMeta {
    name: String,
    color: String,
}

/// Wraps an [`EventSink`], aggregating snapshots by entity, account type, or
/// into a single total.
pub struct GroupingRecorder<S> {
    sink: S,
    mode: GroupingMode,
    q_lower: f64,
    q_upper: f64,
    entity_types: FxHashMap<EntityId, String>,
    /// Group id -> display metadata, ordered for deterministic emission.
    groups: BTreeMap<String, GroupMeta>,
    current_day: Option<Date>,
    pending: BTreeMap<String, UncertainValue>,
}

impl<S: EventSink> GroupingRecorder<S> {
    pub fn new(
        sink: S,
        mode: GroupingMode,
        quantile: f64,
        entities: &[Entity],
        account_types: &[AccountType],
    ) -> Self {
        let known_types: FxHashSet<&str> = account_types.iter().map(|t| t.id.as_str()).collect();
        let mut entity_types = FxHashMap::default();
        for entity in entities {
            let type_id = entity
                .type_id
                .as_deref()
                .filter(|t| known_types.contains(t))
                .unwrap_or(UNKNOWN_TYPE);
            entity_types.insert(entity.id.clone(), type_id.to_string());
        }

        let mut groups = BTreeMap::new();
        match mode {
            GroupingMode::Total => {
                groups.insert(
                    TOTAL_GROUP.to_string(),
                    GroupMeta {
                        name: TOTAL_GROUP.to_string(),
                        color: String::new(),
                    },
                );
            }
            GroupingMode::ByType => {
                for account_type in account_types {
                    groups.insert(
                        account_type.id.clone(),
                        GroupMeta {
                            name: account_type.name.clone(),
                            color: account_type.color.clone().unwrap_or_default(),
                        },
                    );
                }
                if entity_types.values().any(|t| t == UNKNOWN_TYPE) {
                    groups.insert(
                        UNKNOWN_TYPE.to_string(),
                        GroupMeta {
                            name: "unknown".to_string(),
                            color: String::new(),
                        },
                    );
                }
            }
            GroupingMode::None => {
                for entity in entities {
                    groups.insert(
                        entity.id.0.clone(),
                        GroupMeta {
                            name: entity.name.clone(),
                            color: String::new(),
                        },
                    );
                }
            }
        }

        Self {
            sink,
            mode,
            q_lower: (1.0 - quantile) / 2.0,
            q_upper: (1.0 + quantile) / 2.0,
            entity_types,
            groups,
            current_day: None,
            pending: BTreeMap::new(),
        }
    }

    fn group_key(&self, id: &EntityId) -> String {
        match self.mode {
            GroupingMode::None => id.0.clone(),
            GroupingMode::Total => TOTAL_GROUP.to_string(),
            GroupingMode::ByType => self.entity_types.get(id).cloned().unwrap_or_default(),
        }
    }

    fn snapshot_event(&self, id: &str, day: Date, balance: &UncertainValue) -> Result<SnapshotEvent, BoxError> {
        let quantiles = balance.quantiles()?;
        Ok(SnapshotEvent {
            id: id.to_string(),
            day: epoch_ms(day),
            balance: balance.mean()?,
            lower_bound: quantiles.at(self.q_lower),
            upper_bound: quantiles.at(self.q_upper),
        })
    }

    /// Assemble and emit the setup event: per-group aggregation of the raw
    /// observed history plus marklines. Must be called exactly once, before
    /// the loop starts.
    pub fn setup(
        &mut self,
        cfg: &mut SampleConfig,
        entities: &[Entity],
        end: Date,
        special_dates: &[SpecialDate],
    ) -> Result<(), BoxError> {
        let mut aggregated: BTreeMap<String, BTreeMap<Date, UncertainValue>> = BTreeMap::new();
        for entity in entities {
            let key = self.group_key(&entity.id);
            let dates = aggregated.entry(key).or_default();
            for snapshot in &entity.snapshots {
                match dates.get_mut(&snapshot.date) {
                    Some(sum) => *sum = sum.add(cfg, &snapshot.balance),
                    None => {
                        dates.insert(snapshot.date, snapshot.balance.clone());
                    }
                }
            }
        }

        let mut series = Vec::with_capacity(self.groups.len());
        for (id, meta) in &self.groups {
            let mut snapshots = Vec::new();
            if let Some(dates) = aggregated.get(id) {
                for (date, balance) in dates {
                    snapshots.push(self.snapshot_event(id, *date, balance)?);
                }
            }
            series.push(EntitySeries {
                id: id.clone(),
                name: meta.name.clone(),
                color: meta.color.clone(),
                snapshots,
            });
        }

        let marklines = special_dates
            .iter()
            .map(|sd| Markline {
                date: epoch_ms(sd.date),
                name: sd.name.clone(),
            })
            .collect();

        self.sink.setup(SetupEvent {
            max: epoch_ms(end),
            entities: series,
            marklines,
        })
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        let Some(day) = self.current_day else {
            return Ok(());
        };
        let pending = std::mem::take(&mut self.pending);
        for (id, balance) in pending {
            let event = self.snapshot_event(&id, day, &balance)?;
            self.sink.snapshot(event)?;
        }
        Ok(())
    }

    /// Flush the last buffered day and close the sink.
    pub fn close(&mut self) -> Result<(), BoxError> {
        self.flush()?;
        self.sink.close()
    }

    /// The wrapped sink, for callers that hand ownership in and want it
    /// back.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: EventSink> Recorder for GroupingRecorder<S> {
    fn record_snapshot(
        &mut self,
        cfg: &mut SampleConfig,
        id: &EntityId,
        day: Date,
        balance: &UncertainValue,
    ) -> Result<(), BoxError> {
        if self.current_day != Some(day) {
            self.flush()?;
            self.current_day = Some(day);
        }
        let key = self.group_key(id);
        match self.pending.get_mut(&key) {
            Some(sum) => *sum = sum.add(cfg, balance),
            None => {
                self.pending.insert(key, balance.clone());
            }
        }
        Ok(())
    }

    fn record_transfer(
        &mut self,
        cfg: &mut SampleConfig,
        from: &TransferEndpoint,
        to: &TransferEndpoint,
        day: Date,
        amount: &UncertainValue,
    ) -> Result<(), BoxError> {
        self.sink.transfer(TransferEvent {
            from: from.id_str().to_string(),
            to: to.id_str().to_string(),
            day,
            amount: amount.materialize(cfg),
        })
    }
}
