//! # Event Emitter
//!
//! Per-scope fan-out over bounded channels. Publishing never blocks: a full
//! or closed channel counts a drop and the subscriber catches up with
//! [`EventEmitter::replay_since`]. Delivery is at-least-once for
//! subscribers that replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::errors::EventResult;
use super::event::{Event, EventPayload, EventScope};
use super::log::EventLog;

/// Event delivery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Buffered events per subscriber before drops begin
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Events kept for replay
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_log_capacity() -> usize {
    10_000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            log_capacity: default_log_capacity(),
        }
    }
}

pub type EventReceiver = mpsc::Receiver<Event>;

#[derive(Debug)]
pub struct EventEmitter {
    channel_capacity: usize,
    log: EventLog,
    subscribers: Mutex<HashMap<EventScope, Vec<mpsc::Sender<Event>>>>,
    dropped: AtomicU64,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(&EventsConfig::default())
    }
}

impl EventEmitter {
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            channel_capacity: config.channel_capacity.max(1),
            log: EventLog::new(config.log_capacity),
            subscribers: Mutex::new(HashMap::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Opens a bounded, ordered channel for one scope.
    pub fn subscribe(&self, scope: EventScope) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.entry(scope).or_default().push(tx);
        rx
    }

    /// Records the event and offers it to every subscriber of its scope.
    pub fn publish(&self, scope: EventScope, payload: EventPayload) -> Event {
        // Held across record and send so channel order matches sequence order.
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let event = self.log.record(scope, payload);

        if let Some(senders) = subscribers.get_mut(&event.scope) {
            senders.retain(|sender| match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event = "EVENT_DROPPED",
                        kind = event.payload.name(),
                        sequence = event.sequence,
                        reason = "channel full",
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
            });
            if senders.is_empty() {
                subscribers.remove(&event.scope);
            }
        }

        debug!(
            event = event.payload.name(),
            sequence = event.sequence,
            tenancy = %event.scope.tenancy_key,
        );
        event
    }

    /// Events of `scope` after `since`, from the in-memory log.
    pub fn replay_since(&self, scope: &EventScope, since: u64) -> EventResult<Vec<Event>> {
        self.log.events_since(scope, since)
    }

    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.log.recent(limit)
    }

    /// Deliveries that did not reach a subscriber.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, scope: &EventScope) -> usize {
        self.subscribers
            .lock()
            .map(|subscribers| subscribers.get(scope).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChangeSetId, LogicalId, WorkspaceId};
    use crate::tenancy::TenancyContext;

    fn scope() -> EventScope {
        EventScope::tenant(&TenancyContext::for_workspace(WorkspaceId::new()))
    }

    fn secret() -> EventPayload {
        EventPayload::SecretCreated {
            secret_id: LogicalId::new(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let emitter = EventEmitter::default();
        let scope = scope();
        let mut rx = emitter.subscribe(scope.clone());
        let a = emitter.publish(scope.clone(), secret());
        let b = emitter.publish(scope, secret());
        assert_eq!(rx.recv().await.unwrap().sequence, a.sequence);
        assert_eq!(rx.recv().await.unwrap().sequence, b.sequence);
    }

    #[tokio::test]
    async fn test_other_scopes_not_delivered() {
        let emitter = EventEmitter::default();
        let mine = scope();
        let mut rx = emitter.subscribe(mine.clone());
        emitter.publish(scope(), secret());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let emitter = EventEmitter::new(&EventsConfig {
            channel_capacity: 1,
            log_capacity: 100,
        });
        let scope = scope();
        let _rx = emitter.subscribe(scope.clone());
        emitter.publish(scope.clone(), secret());
        emitter.publish(scope.clone(), secret());
        emitter.publish(scope.clone(), secret());
        assert_eq!(emitter.dropped_count(), 2);

        // Replay recovers everything.
        assert_eq!(emitter.replay_since(&scope, 0).unwrap().len(), 3);
    }

    #[test]
    fn test_closed_subscriber_is_removed() {
        let emitter = EventEmitter::default();
        let scope = EventScope::change_set(
            &TenancyContext::for_workspace(WorkspaceId::new()),
            ChangeSetId::new(),
        );
        let rx = emitter.subscribe(scope.clone());
        drop(rx);
        emitter.publish(scope.clone(), secret());
        assert_eq!(emitter.subscriber_count(&scope), 0);
    }
}
