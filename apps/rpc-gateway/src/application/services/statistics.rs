//! Statistics Aggregator
//!
//! Per-subscription state machine that folds call events into fixed windows.
//!
//! ```text
//!              event                     tick
//!   ┌──────────────────────┐   ┌─────────────────────────┐
//!   ▼                      │   │                         ▼
//! Accumulating ────────────┘   └──── Accumulating ◄── Emitting
//!      │                                                 │
//!      └── source closed / sink gone ──► Closed ◄── send failed
//! ```
//!
//! Events, ticks and sink closure are all handled by one `select!` loop, so
//! the current window is never shared between tasks.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::application::error::CallError;
use crate::application::ports::{EventSource, StreamSink};
use crate::domain::stats::{StatSnapshot, StatWindow};
use crate::infrastructure::metrics;

/// Longest accepted window (one day).
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Folds one subscription's events into periodic [`StatSnapshot`]s.
#[derive(Debug)]
pub struct StatsAggregator<S> {
    source: S,
    period: Duration,
    window: StatWindow,
    emitted: u64,
}

impl<S: EventSource> StatsAggregator<S> {
    /// Create an aggregator emitting every `period`.
    ///
    /// # Errors
    ///
    /// Returns `CallError::InvalidArgument` for a zero period or one longer
    /// than [`MAX_INTERVAL`].
    pub fn new(source: S, period: Duration) -> Result<Self, CallError> {
        if period.is_zero() {
            return Err(CallError::InvalidArgument(
                "statistics interval must be at least one second".to_string(),
            ));
        }
        if period > MAX_INTERVAL {
            return Err(CallError::InvalidArgument(format!(
                "statistics interval must be at most {} seconds",
                MAX_INTERVAL.as_secs()
            )));
        }

        Ok(Self {
            source,
            period,
            window: StatWindow::new(),
            emitted: 0,
        })
    }

    /// Create an aggregator from a whole-second interval.
    ///
    /// # Errors
    ///
    /// Returns `CallError::InvalidArgument` for a zero or oversized interval.
    pub fn from_interval_seconds(source: S, seconds: u64) -> Result<Self, CallError> {
        Self::new(source, Duration::from_secs(seconds))
    }

    /// Window length.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Run until the source closes or the sink goes away.
    ///
    /// The first snapshot is emitted one period after the call. Returns the
    /// number of snapshots emitted when the source closes.
    ///
    /// # Errors
    ///
    /// Returns `CallError::Disconnected` if the sink closes or rejects a
    /// snapshot. The source is dropped (and so unsubscribed) either way.
    pub async fn run<K>(mut self, sink: &K) -> Result<u64, CallError>
    where
        K: StreamSink<StatSnapshot> + ?Sized,
    {
        let first_tick = Instant::now().checked_add(self.period).ok_or_else(|| {
            CallError::InvalidArgument("statistics interval out of range".to_string())
        })?;
        let mut ticker = tokio::time::interval_at(first_tick, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.source.next_event() => {
                    let Some(event) = event else {
                        tracing::debug!(emitted = self.emitted, "Statistics source closed");
                        return Ok(self.emitted);
                    };
                    self.window.record(&event);
                }
                _ = ticker.tick() => {
                    let snapshot = self.window.take_snapshot(Utc::now().timestamp());
                    let calls = snapshot.total_calls();

                    if sink.send(snapshot).await.is_err() {
                        return Err(CallError::Disconnected);
                    }

                    self.emitted += 1;
                    metrics::record_snapshot_emitted(calls);
                }
                () = sink.closed() => {
                    return Err(CallError::Disconnected);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::event::CallEvent;

    fn event(consumer: &str, method: &str) -> CallEvent {
        CallEvent::new("127.0.0.1:1", method, consumer, 0)
    }

    #[test]
    fn zero_interval_rejected() {
        let (_tx, rx) = mpsc::channel::<CallEvent>(1);
        let err = StatsAggregator::from_interval_seconds(rx, 0).unwrap_err();
        assert!(matches!(err, CallError::InvalidArgument(_)));
    }

    #[test]
    fn oversized_interval_rejected() {
        let (_tx, rx) = mpsc::channel::<CallEvent>(1);
        let err = StatsAggregator::from_interval_seconds(rx, u64::MAX).unwrap_err();
        assert!(matches!(err, CallError::InvalidArgument(_)));

        let (_tx, rx) = mpsc::channel::<CallEvent>(1);
        let err = StatsAggregator::new(rx, MAX_INTERVAL + Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CallError::InvalidArgument(_)));
    }

    #[test]
    fn keeps_requested_period() {
        let (_tx, rx) = mpsc::channel::<CallEvent>(1);
        let aggregator = StatsAggregator::from_interval_seconds(rx, 5).unwrap();
        assert_eq!(aggregator.period(), Duration::from_secs(5));

        let (_tx, rx) = mpsc::channel::<CallEvent>(1);
        let aggregator = StatsAggregator::new(rx, MAX_INTERVAL).unwrap();
        assert_eq!(aggregator.period(), MAX_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_window_counts_then_resets() {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let aggregator = StatsAggregator::from_interval_seconds(event_rx, 1).unwrap();
        let task = tokio::spawn(async move { aggregator.run(&out_tx).await });

        for _ in 0..3 {
            event_tx.send(event("alice", "/gateway.v1.Biz/Check")).await.unwrap();
        }
        for _ in 0..2 {
            event_tx.send(event("bob", "/gateway.v1.Biz/Add")).await.unwrap();
        }

        let first = out_rx.recv().await.unwrap();
        assert_eq!(first.by_consumer.get("alice"), Some(&3));
        assert_eq!(first.by_consumer.get("bob"), Some(&2));
        assert_eq!(first.by_method.get("/gateway.v1.Biz/Check"), Some(&3));
        assert_eq!(first.by_method.get("/gateway.v1.Biz/Add"), Some(&2));

        let second = out_rx.recv().await.unwrap();
        assert!(second.is_empty());

        drop(event_tx);
        assert_eq!(task.await.unwrap(), Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn first_snapshot_after_one_period() {
        let (_event_tx, event_rx) = mpsc::channel::<CallEvent>(16);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let aggregator = StatsAggregator::from_interval_seconds(event_rx, 3).unwrap();
        let started = Instant::now();
        tokio::spawn(async move { aggregator.run(&out_tx).await });

        out_rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
        out_rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn sink_gone_disconnects() {
        let (_event_tx, event_rx) = mpsc::channel::<CallEvent>(16);
        let (out_tx, out_rx) = mpsc::channel(4);
        drop(out_rx);

        let aggregator = StatsAggregator::from_interval_seconds(event_rx, 1).unwrap();
        assert_eq!(aggregator.run(&out_tx).await, Err(CallError::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn source_close_ends_cleanly() {
        let (event_tx, event_rx) = mpsc::channel::<CallEvent>(16);
        let (out_tx, _out_rx) = mpsc::channel(4);
        drop(event_tx);

        let aggregator = StatsAggregator::from_interval_seconds(event_rx, 1).unwrap();
        assert_eq!(aggregator.run(&out_tx).await, Ok(0));
    }
}
