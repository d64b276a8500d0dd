//! Bridge between the synchronous event sink and an SSE response.
//!
//! The prediction runs on a blocking thread and pushes ready-made SSE events
//! into a bounded channel; the HTTP task streams them out. The bound is the
//! back-pressure point: a slow client slows the simulation instead of
//! buffering it. Dropping the stream (client disconnect) fires the run's
//! cancellation flag.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use futures::Stream;
use tokio::sync::mpsc;

use horizon_core::date_math::epoch_ms;
use horizon_core::error::BoxError;
use horizon_core::prediction::CancelFlag;
use horizon_core::recorder::{EventSink, SetupEvent, SnapshotEvent, TransferEvent};

/// Create a connected sink/stream pair.
pub fn channel(capacity: usize, cancel: CancelFlag) -> (ChannelSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink { tx }, EventStream { rx, cancel })
}

/// The blocking side: an [`EventSink`] that serializes events and pushes
/// them into the channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelSink {
    fn send(&self, event: Event) -> Result<(), BoxError> {
        self.tx
            .blocking_send(event)
            .map_err(|_| "event stream receiver dropped".into())
    }

    /// Best-effort error notification toward the client.
    pub fn send_error(&self, message: &str) {
        let _ = self.send(Event::default().event("error").data(message));
    }
}

impl EventSink for ChannelSink {
    fn setup(&mut self, event: SetupEvent) -> Result<(), BoxError> {
        self.send(Event::default().event("setup").json_data(&event)?)
    }

    fn snapshot(&mut self, event: SnapshotEvent) -> Result<(), BoxError> {
        self.send(Event::default().event("balanceSnapshot").json_data(&event)?)
    }

    fn transfer(&mut self, event: TransferEvent) -> Result<(), BoxError> {
        let payload = serde_json::json!({
            "from": event.from,
            "to": event.to,
            "day": epoch_ms(event.day),
            "amount": event.amount.mean()?,
        });
        self.send(Event::default().event("transfer").data(payload.to_string()))
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.send(Event::default().event("close"))
    }
}

/// The async side: yields events until the sink is dropped; cancels the run
/// when the client goes away.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
    cancel: CancelFlag,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|event| event.map(Ok))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
