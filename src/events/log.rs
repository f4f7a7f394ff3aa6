//! # Event Log
//!
//! Bounded in-memory history of published events. Sequence numbers are
//! assigned under the write lock, so log order and sequence order agree.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use super::errors::{EventError, EventResult};
use super::event::{Event, EventPayload, EventScope};

#[derive(Debug)]
pub struct EventLog {
    capacity: usize,

    /// Next sequence number (monotonically increasing)
    next_sequence: AtomicU64,

    /// Ring buffer of recent events
    events: RwLock<VecDeque<Event>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_sequence: AtomicU64::new(1),
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::Acquire)
    }

    /// Assigns the next sequence number and appends the event.
    pub fn record(&self, scope: EventScope, payload: EventPayload) -> Event {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = Event::new(sequence, scope, payload);
        events.push_back(event.clone());
        while events.len() > self.capacity {
            events.pop_front();
        }
        event
    }

    /// Events of `scope` with a sequence greater than `since`.
    ///
    /// Fails with `Lagged` when events after `since` have already been
    /// evicted from the ring buffer.
    pub fn events_since(&self, scope: &EventScope, since: u64) -> EventResult<Vec<Event>> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(oldest) = events.front() {
            if oldest.sequence > since.saturating_add(1) {
                return Err(EventError::Lagged {
                    requested: since,
                    oldest: oldest.sequence,
                });
            }
        }
        Ok(events
            .iter()
            .filter(|event| event.sequence > since && &event.scope == scope)
            .cloned()
            .collect())
    }

    /// Most recent events across all scopes, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .map(|events| events.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
