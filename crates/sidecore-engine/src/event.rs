//! The event sink collaborator (§6): `logEvent(category, kind, actor, payload, txId?)`,
//! fire-and-forget, used purely for downstream streaming (the out-of-scope
//! Kafka event sink). A sink must never fail transaction processing — callers
//! in this crate never propagate a sink error; emission always happens
//! fire-and-forget after a state transition completes.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn log_event(&self, category: &str, kind: &str, actor: &str, payload: Value, tx_id: Option<&str>);
}

/// Discards every event. Used where no downstream consumer is wired up (e.g.
/// library-only unit tests of a single component).
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn log_event(&self, _category: &str, _kind: &str, _actor: &str, _payload: Value, _tx_id: Option<&str>) {}
}

/// Buffers every event in memory — used by integration tests that assert on
/// emitted events (e.g. `farm_stake`, `liquidity_added`).
#[derive(Default)]
pub struct RecordingEventSink {
    pub events: tokio::sync::Mutex<Vec<RecordedEvent>>,
}

#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub category: String,
    pub kind: String,
    pub actor: String,
    pub payload: Value,
    pub tx_id: Option<String>,
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn log_event(&self, category: &str, kind: &str, actor: &str, payload: Value, tx_id: Option<&str>) {
        self.events.lock().await.push(RecordedEvent {
            category: category.to_owned(),
            kind: kind.to_owned(),
            actor: actor.to_owned(),
            payload,
            tx_id: tx_id.map(str::to_owned),
        });
    }
}
