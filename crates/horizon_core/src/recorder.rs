//! The event seam between the simulation and the outside world.
//!
//! The loop talks to a [`Recorder`]; the [`GroupingRecorder`] implementation
//! aggregates per-entity snapshots into groups and forwards quantile-bearing
//! events to an [`EventSink`]. Sinks are synchronous and fallible; a sink
//! error aborts the run without further writes.
//!
//! [`GroupingRecorder`]: crate::grouping::GroupingRecorder

use jiff::civil::Date;
use serde::Serialize;

use crate::error::BoxError;
use crate::model::{EntityId, TransferEndpoint};
use crate::uncertain::{SampleConfig, UncertainValue};

/// One aggregated balance reading for a group on a day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEvent {
    pub id: String,
    /// Midnight UTC of the day, milliseconds since the Unix epoch.
    pub day: i64,
    /// Mean balance.
    pub balance: f64,
    #[serde(rename = "lowerBound")]
    pub lower_bound: f64,
    #[serde(rename = "upperBound")]
    pub upper_bound: f64,
}

/// A group's identity and its aggregated observed history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySeries {
    pub id: String,
    pub name: String,
    pub color: String,
    pub snapshots: Vec<SnapshotEvent>,
}

/// A labeled vertical line for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Markline {
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    pub name: String,
}

/// Fired once before any other event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupEvent {
    /// End of the horizon, milliseconds since the Unix epoch.
    pub max: i64,
    pub entities: Vec<EntitySeries>,
    pub marklines: Vec<Markline>,
}

/// One realized transfer. The amount is the post-clamping value; external
/// endpoints carry the empty id.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub from: String,
    pub to: String,
    pub day: Date,
    pub amount: UncertainValue,
}

/// Receives the ordered event stream of one prediction run: `setup`, then
/// interleaved snapshots and transfers, then `close`. Cancelled runs never
/// see `close`.
pub trait EventSink {
    fn setup(&mut self, event: SetupEvent) -> Result<(), BoxError>;
    fn snapshot(&mut self, event: SnapshotEvent) -> Result<(), BoxError>;
    fn transfer(&mut self, event: TransferEvent) -> Result<(), BoxError>;
    fn close(&mut self) -> Result<(), BoxError>;
}

/// What the daily loop calls for every raw per-entity observation.
pub trait Recorder {
    fn record_snapshot(
        &mut self,
        cfg: &mut SampleConfig,
        id: &EntityId,
        day: Date,
        balance: &UncertainValue,
    ) -> Result<(), BoxError>;

    fn record_transfer(
        &mut self,
        cfg: &mut SampleConfig,
        from: &TransferEndpoint,
        to: &TransferEndpoint,
        day: Date,
        amount: &UncertainValue,
    ) -> Result<(), BoxError>;
}

/// Discards everything; useful when only one side of the stream matters.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
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
        _from: &TransferEndpoint,
        _to: &TransferEndpoint,
        _day: Date,
        _amount: &UncertainValue,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// One entry of a [`CollectingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Setup(SetupEvent),
    Snapshot(SnapshotEvent),
    Transfer(TransferEvent),
    Close,
}

/// An in-memory sink that records the full event stream, for tests and
/// programmatic consumers.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<SinkEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &SnapshotEvent> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Snapshot(s) => Some(s),
            _ => None,
        })
    }

    pub fn transfers(&self) -> impl Iterator<Item = &TransferEvent> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Transfer(t) => Some(t),
            _ => None,
        })
    }
}

impl EventSink for CollectingSink {
    fn setup(&mut self, event: SetupEvent) -> Result<(), BoxError> {
        self.events.push(SinkEvent::Setup(event));
        Ok(())
    }

    fn snapshot(&mut self, event: SnapshotEvent) -> Result<(), BoxError> {
        self.events.push(SinkEvent::Snapshot(event));
        Ok(())
    }

    fn transfer(&mut self, event: TransferEvent) -> Result<(), BoxError> {
        self.events.push(SinkEvent::Transfer(event));
        Ok(())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.events.push(SinkEvent::Close);
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn setup(&mut self, event: SetupEvent) -> Result<(), BoxError> {
        (**self).setup(event)
    }

    fn snapshot(&mut self, event: SnapshotEvent) -> Result<(), BoxError> {
        (**self).snapshot(event)
    }

    fn transfer(&mut self, event: TransferEvent) -> Result<(), BoxError> {
        (**self).transfer(event)
    }

    fn close(&mut self) -> Result<(), BoxError> {
        (**self).close()
    }
}
