//! Port Interfaces
//!
//! Defines the interfaces (ports) between the gateway's use cases and the
//! adapters that implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - `EventPublisher`: fan a call event out to live subscribers
//! - `SubscriberRegistry`: lifecycle of the subscriber set (close, count)
//! - `StreamSink`: deliver items to a streaming caller
//!
//! ## Driver Ports (Inbound)
//!
//! - `EventSource`: the receive side of one subscription

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::event::CallEvent;

// =============================================================================
// Publishing
// =============================================================================

/// Result of publishing one event to every current subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOutcome {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers whose buffer was full.
    pub dropped: usize,
}

impl PublishOutcome {
    /// Check if every subscriber received the event.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// Port for publishing call events.
///
/// Implementations must never block the caller.
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    /// Offer `event` to every current subscriber.
    fn publish(&self, event: &CallEvent) -> PublishOutcome;
}

/// Port for the subscriber set's lifecycle.
pub trait SubscriberRegistry: Send + Sync {
    /// Close every subscription and refuse new ones.
    fn close(&self);

    /// Number of live subscriptions.
    fn subscriber_count(&self) -> usize;
}

/// No-op event publisher for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventPublisher;

impl EventPublisher for NoOpEventPublisher {
    fn publish(&self, _event: &CallEvent) -> PublishOutcome {
        PublishOutcome::default()
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Receive side of one event subscription.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event; `None` once the subscription is closed.
    async fn next_event(&mut self) -> Option<CallEvent>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<CallEvent> {
    async fn next_event(&mut self) -> Option<CallEvent> {
        self.recv().await
    }
}

// =============================================================================
// Stream Sinks
// =============================================================================

/// The streaming caller is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stream sink closed")]
pub struct SinkClosed;

/// Outbound side of a server-streaming call.
#[async_trait]
pub trait StreamSink<T: Send + 'static>: Send + Sync {
    /// Deliver one item, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns `SinkClosed` if the caller has gone away.
    async fn send(&self, item: T) -> Result<(), SinkClosed>;

    /// Resolves once the caller has gone away.
    async fn closed(&self);
}

#[async_trait]
impl<T: Send + 'static> StreamSink<T> for mpsc::Sender<T> {
    async fn send(&self, item: T) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, item).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_publisher_delivers_nothing() {
        let outcome = NoOpEventPublisher.publish(&CallEvent::new("", "/a.B/C", "x", 0));
        assert_eq!(outcome, PublishOutcome::default());
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn channel_sink_reports_closure() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        assert!(StreamSink::send(&tx, 1).await.is_ok());

        drop(rx);
        assert_eq!(StreamSink::send(&tx, 2).await, Err(SinkClosed));
        StreamSink::closed(&tx).await;
    }

    #[tokio::test]
    async fn channel_source_ends_when_senders_drop() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(CallEvent::new("", "/a.B/C", "x", 0)).await.unwrap();
        drop(tx);

        assert!(rx.next_event().await.is_some());
        assert!(rx.next_event().await.is_none());
    }
}
