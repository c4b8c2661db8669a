//! Statistics Windows
//!
//! Counters folded from the call event stream for one statistics
//! subscription. A window accumulates until the subscription's timer ticks,
//! at which point it is turned into a [`StatSnapshot`] and reset.

use std::collections::HashMap;

use crate::domain::event::CallEvent;

/// Call counts for one completed window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Unix timestamp (seconds) at which the window was closed.
    pub timestamp: i64,
    /// Calls per full method path.
    pub by_method: HashMap<String, u64>,
    /// Calls per consumer.
    pub by_consumer: HashMap<String, u64>,
}

impl StatSnapshot {
    /// Total calls counted in this snapshot.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.by_consumer.values().sum()
    }

    /// Check if no calls were counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.by_consumer.is_empty()
    }
}

/// The window currently being accumulated.
#[derive(Debug, Default)]
pub struct StatWindow {
    by_method: HashMap<String, u64>,
    by_consumer: HashMap<String, u64>,
    events: u64,
}

impl StatWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event.
    pub fn record(&mut self, event: &CallEvent) {
        *self.by_method.entry(event.method.clone()).or_insert(0) += 1;
        *self.by_consumer.entry(event.consumer.clone()).or_insert(0) += 1;
        self.events += 1;
    }

    /// Events counted since the window opened.
    #[must_use]
    pub const fn event_count(&self) -> u64 {
        self.events
    }

    /// Check if no events have been counted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.events == 0
    }

    /// Close the window, stamping it with `timestamp`, and start a new one.
    pub fn take_snapshot(&mut self, timestamp: i64) -> StatSnapshot {
        let window = std::mem::take(self);
        StatSnapshot {
            timestamp,
            by_method: window.by_method,
            by_consumer: window.by_consumer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(consumer: &str, method: &str) -> CallEvent {
        CallEvent::new("127.0.0.1:1", method, consumer, 0)
    }

    #[test]
    fn counts_by_consumer_and_method() {
        let mut window = StatWindow::new();
        for _ in 0..3 {
            window.record(&event("alice", "/gateway.v1.Biz/Check"));
        }
        for _ in 0..2 {
            window.record(&event("bob", "/gateway.v1.Biz/Add"));
        }

        let snapshot = window.take_snapshot(42);
        assert_eq!(snapshot.timestamp, 42);
        assert_eq!(snapshot.by_consumer["alice"], 3);
        assert_eq!(snapshot.by_consumer["bob"], 2);
        assert_eq!(snapshot.by_method["/gateway.v1.Biz/Check"], 3);
        assert_eq!(snapshot.by_method["/gateway.v1.Biz/Add"], 2);
        assert_eq!(snapshot.total_calls(), 5);
    }

    #[test]
    fn snapshot_resets_window() {
        let mut window = StatWindow::new();
        window.record(&event("alice", "/gateway.v1.Biz/Check"));
        assert_eq!(window.event_count(), 1);

        let _ = window.take_snapshot(1);
        assert!(window.is_empty());

        let next = window.take_snapshot(2);
        assert!(next.is_empty());
        assert_eq!(next.total_calls(), 0);
    }
}
