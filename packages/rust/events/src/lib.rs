//! Live progress events for pipeline runs.
//!
//! Every step attempt is reported as an [`Event`] on an [`EventBus`]. The bus
//! is an ordered FIFO log shared by handle: the pipeline engine and any step
//! that reports sub-progress hold clones of the same bus, and a presentation
//! layer drains or snapshots it to render progress or replay a run.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Status transition reported for one step attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Started,
    Success,
    Retried,
    /// Terminal failure; carries the action's error description.
    Failed(String),
}

impl EventStatus {
    /// Whether this status ends the step (success or failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed(_))
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => f.write_str("STARTED"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Retried => f.write_str("RETRIED"),
            Self::Failed(reason) => write!(f, "FAILED: {reason}"),
        }
    }
}

/// One immutable progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// Display label of the step (not its execution position).
    pub order: u32,
    pub step_name: String,
    pub tool_name: String,
    #[serde(flatten)]
    pub status: EventStatus,
}

impl Event {
    /// Serialize as a single JSON line (for replayable trails).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse one line previously produced by [`Event::to_json_line`].
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Ordered, thread-safe event log.
///
/// Cloning yields another handle to the same queue. All operations take a
/// short internal lock; none of them block on an empty queue or fail.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    queue: Arc<Mutex<VecDeque<Event>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    // A producer that panicked mid-push cannot leave a half-written event
    // behind, so a poisoned lock still guards a consistent queue.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one event stamped with the current time.
    pub fn emit(
        &self,
        order: u32,
        step_name: impl Into<String>,
        tool_name: impl Into<String>,
        status: EventStatus,
    ) {
        let event = Event {
            timestamp: Utc::now(),
            order,
            step_name: step_name.into(),
            tool_name: tool_name.into(),
            status,
        };
        tracing::trace!(order, step = %event.step_name, status = %event.status, "event emitted");
        self.lock().push_back(event);
    }

    /// Remove and return every queued event in FIFO order.
    pub fn drain(&self) -> Vec<Event> {
        let mut queue = self.lock();
        std::mem::take(&mut *queue).into()
    }

    /// Copy every queued event without removing anything.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    /// Drop all queued events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    fn statuses(events: &[Event]) -> Vec<EventStatus> {
        events.iter().map(|e| e.status.clone()).collect()
    }

    #[test]
    fn drain_returns_fifo_then_empty() {
        let bus = EventBus::new();
        bus.emit(1, "Fetch", "Mailbox", EventStatus::Started);
        bus.emit(1, "Fetch", "Mailbox", EventStatus::Success);

        let events = bus.drain();
        assert_eq!(
            statuses(&events),
            vec![EventStatus::Started, EventStatus::Success]
        );
        assert!(bus.drain().is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn snapshot_does_not_consume() {
        let bus = EventBus::new();
        bus.emit(1, "Fetch", "Mailbox", EventStatus::Started);
        bus.emit(1, "Fetch", "Mailbox", EventStatus::Failed("timeout".into()));

        let snap = bus.snapshot();
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.drain(), snap);
    }

    #[test]
    fn clear_is_safe_when_empty() {
        let bus = EventBus::new();
        bus.clear();
        bus.emit(2, "Resolve", "Identity Resolver", EventStatus::Started);
        bus.clear();
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn clones_share_one_queue() {
        let bus = EventBus::new();
        let producer = bus.clone();
        producer.emit(3, "Export", "CSV", EventStatus::Success);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn concurrent_emit_loses_nothing() {
        let bus = EventBus::new();
        let handles: Vec<_> = (0..8u32)
            .map(|producer| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        bus.emit(producer, format!("step-{i}"), "worker", EventStatus::Started);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread");
        }

        let events = bus.drain();
        assert_eq!(events.len(), 2000);

        // Per-producer emission order survives interleaving.
        for producer in 0..8u32 {
            let names: Vec<_> = events
                .iter()
                .filter(|e| e.order == producer)
                .map(|e| e.step_name.clone())
                .collect();
            let expected: Vec<_> = (0..250).map(|i| format!("step-{i}")).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn concurrent_drains_partition_the_queue() {
        let bus = EventBus::new();
        for i in 0..1000u32 {
            bus.emit(i, "step", "tool", EventStatus::Started);
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    for _ in 0..50 {
                        seen.extend(bus.drain().into_iter().map(|e| e.order));
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().expect("drain thread"));
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 1000);
        assert_eq!(unique.len(), 1000);
    }

    #[test]
    fn status_display_and_json_line() {
        assert_eq!(EventStatus::Retried.to_string(), "RETRIED");
        assert_eq!(
            EventStatus::Failed("disk full".into()).to_string(),
            "FAILED: disk full"
        );
        assert!(EventStatus::Success.is_terminal());
        assert!(!EventStatus::Retried.is_terminal());

        let bus = EventBus::new();
        bus.emit(3, "Saving Recipients", "CSV", EventStatus::Failed("disk full".into()));
        let event = bus.drain().remove(0);

        let line = event.to_json_line().expect("serialize");
        assert!(line.contains(r#""status":"FAILED""#));
        assert!(line.contains(r#""reason":"disk full""#));
        assert_eq!(Event::from_json_line(&line).expect("parse"), event);
    }
}
