//! Turn telemetry side channel.
//!
//! The orchestrator reports every turn's lifecycle to one
//! [`TurnObserver`], in delivery order.  Observers never influence the
//! conversation; they only watch it.
//!
//! [`TracingObserver`] logs turns; [`BroadcastObserver`] fans them out to
//! any number of subscribers as [`TurnEvent`]s.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

/// Ordered per-turn callbacks.
pub trait TurnObserver: Send + Sync {
    fn on_turn_started(&self, turn_id: &str);
    fn on_turn_chunk(&self, turn_id: &str, text: &str);
    fn on_turn_completed(&self, turn_id: &str);
}

// ---------------------------------------------------------------------------
// TracingObserver
// ---------------------------------------------------------------------------

/// Writes turn events to the `nutri_voice::turns` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TurnObserver for TracingObserver {
    fn on_turn_started(&self, turn_id: &str) {
        info!(target: "nutri_voice::turns", turn = %turn_id, "response created");
    }

    fn on_turn_chunk(&self, turn_id: &str, text: &str) {
        info!(target: "nutri_voice::turns", turn = %turn_id, delta = %text, "response delta");
    }

    fn on_turn_completed(&self, turn_id: &str) {
        info!(target: "nutri_voice::turns", turn = %turn_id, "response completed");
    }
}

// ---------------------------------------------------------------------------
// BroadcastObserver
// ---------------------------------------------------------------------------

/// Capacity of the turn broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

/// A turn lifecycle notification.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Started { turn_id: String },
    Chunk { turn_id: String, text: String },
    Completed { turn_id: String },
}

/// Publishes turn events on a broadcast channel.
///
/// Sends are best-effort: with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<TurnEvent>,
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastObserver {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Each receiver sees every event sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: TurnEvent) {
        let _ = self.tx.send(event);
    }
}

impl TurnObserver for BroadcastObserver {
    fn on_turn_started(&self, turn_id: &str) {
        self.publish(TurnEvent::Started {
            turn_id: turn_id.to_string(),
        });
    }

    fn on_turn_chunk(&self, turn_id: &str, text: &str) {
        self.publish(TurnEvent::Chunk {
            turn_id: turn_id.to_string(),
            text: text.to_string(),
        });
    }

    fn on_turn_completed(&self, turn_id: &str) {
        self.publish(TurnEvent::Completed {
            turn_id: turn_id.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Fanout
// ---------------------------------------------------------------------------

/// Forwards each callback to several observers, in list order.
#[derive(Clone, Default)]
pub struct Fanout(pub Vec<Arc<dyn TurnObserver>>);

impl TurnObserver for Fanout {
    fn on_turn_started(&self, turn_id: &str) {
        for o in &self.0 {
            o.on_turn_started(turn_id);
        }
    }

    fn on_turn_chunk(&self, turn_id: &str, text: &str) {
        for o in &self.0 {
            o.on_turn_chunk(turn_id, text);
        }
    }

    fn on_turn_completed(&self, turn_id: &str) {
        for o in &self.0 {
            o.on_turn_completed(turn_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_reaches_every_observer() {
        let a = BroadcastObserver::new();
        let b = BroadcastObserver::new();
        let (mut ra, mut rb) = (a.subscribe(), b.subscribe());
        let observers: Vec<Arc<dyn TurnObserver>> =
            vec![Arc::new(a), Arc::new(b), Arc::new(TracingObserver)];
        let fan = Fanout(observers);
        fan.on_turn_started("t9");
        assert_eq!(ra.try_recv().unwrap(), TurnEvent::Started { turn_id: "t9".into() });
        assert_eq!(rb.try_recv().unwrap(), TurnEvent::Started { turn_id: "t9".into() });
    }

    #[test]
    fn broadcast_preserves_order() {
        let obs = BroadcastObserver::new();
        let mut rx = obs.subscribe();
        obs.on_turn_started("t1");
        obs.on_turn_chunk("t1", "hi");
        obs.on_turn_completed("t1");

        assert_eq!(rx.try_recv().unwrap(), TurnEvent::Started { turn_id: "t1".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            TurnEvent::Chunk {
                turn_id: "t1".into(),
                text: "hi".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), TurnEvent::Completed { turn_id: "t1".into() });
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let obs = BroadcastObserver::new();
        obs.on_turn_started("t1");
        let json = serde_json::to_value(TurnEvent::Completed { turn_id: "t1".into() }).unwrap();
        assert_eq!(json["type"], "completed");
    }
}
