//! Event Bus
//!
//! In-process registry of live subscribers to the call event stream.
//!
//! # Architecture
//!
//! Each subscriber owns a bounded `mpsc` channel. The bus keeps the sending
//! halves in a `BTreeMap` keyed by a monotonically increasing
//! [`SubscriberId`]:
//!
//! - `subscribe` / `unsubscribe` / `shutdown` take the registry write lock
//! - `publish` takes the read lock and `try_send`s to every slot
//!
//! Publishing never waits. A subscriber whose buffer is full misses that
//! event (counted per slot and in `rpc_gateway_events_dropped_total`); other
//! subscribers are unaffected. Because removal needs the write lock, no event
//! is delivered to a subscriber after its `unsubscribe` has returned.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::{EventPublisher, EventSource, PublishOutcome, SubscriberRegistry};
use crate::domain::event::CallEvent;
use crate::infrastructure::metrics;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1024;

/// Shared handle to the event bus.
pub type SharedEventBus = Arc<EventBus>;

// =============================================================================
// Subscriber Ids
// =============================================================================

/// Identifier of one subscription. Never reused within a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
struct Slot {
    sender: mpsc::Sender<CallEvent>,
    dropped: AtomicU64,
}

#[derive(Debug, Default)]
struct Registry {
    slots: BTreeMap<SubscriberId, Slot>,
    next_id: u64,
    closed: bool,
}

impl Registry {
    const fn allocate_id(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Snapshot of bus counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusStats {
    /// Live subscriptions.
    pub subscribers: usize,
    /// Events dropped across live subscriptions.
    pub dropped: u64,
    /// Whether the bus has been shut down.
    pub closed: bool,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Dynamic publish/subscribe registry for call events.
#[derive(Debug)]
pub struct EventBus {
    registry: RwLock<Registry>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `capacity` events.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            capacity: capacity.max(1),
        }
    }

    /// Per-subscriber buffer capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a new subscriber.
    ///
    /// After [`EventBus::shutdown`] the returned subscription is already
    /// closed, so a consumer of it ends immediately.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);

        let (id, count) = {
            let mut registry = self.registry.write();
            let id = registry.allocate_id();
            if !registry.closed {
                registry.slots.insert(
                    id,
                    Slot {
                        sender,
                        dropped: AtomicU64::new(0),
                    },
                );
            }
            (id, registry.slots.len())
        };

        metrics::set_subscribers(count);
        tracing::debug!(subscriber_id = %id, subscribers = count, "Subscriber registered");

        Subscription {
            id,
            receiver,
            bus: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber, closing its channel.
    ///
    /// Unknown or already-removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let (removed, count) = {
            let mut registry = self.registry.write();
            let removed = registry.slots.remove(&id);
            (removed, registry.slots.len())
        };

        if let Some(slot) = removed {
            metrics::set_subscribers(count);
            tracing::debug!(
                subscriber_id = %id,
                subscribers = count,
                dropped = slot.dropped.load(Ordering::Relaxed),
                "Subscriber removed"
            );
        }
    }

    /// Offer an event to every subscriber without waiting.
    pub fn publish(&self, event: &CallEvent) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let registry = self.registry.read();

        for (id, slot) in &registry.slots {
            match slot.sender.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    let total = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber_id = %id,
                        dropped_total = total,
                        "Subscriber buffer full, event dropped"
                    );
                }
                // Receiver dropped but not yet unsubscribed.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        drop(registry);

        metrics::record_event_published(outcome.delivered, outcome.dropped);
        outcome
    }

    /// Close every subscription and refuse new ones.
    pub fn shutdown(&self) {
        let slots = {
            let mut registry = self.registry.write();
            registry.closed = true;
            std::mem::take(&mut registry.slots)
        };

        metrics::set_subscribers(0);
        tracing::info!(closed = slots.len(), "Event bus shut down");
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.read().slots.len()
    }

    /// Whether the bus has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registry.read().closed
    }

    /// Current bus counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let registry = self.registry.read();
        BusStats {
            subscribers: registry.slots.len(),
            dropped: registry
                .slots
                .values()
                .map(|slot| slot.dropped.load(Ordering::Relaxed))
                .sum(),
            closed: registry.closed,
        }
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: &CallEvent) -> PublishOutcome {
        Self::publish(self, event)
    }
}

impl SubscriberRegistry for EventBus {
    fn close(&self) {
        self.shutdown();
    }

    fn subscriber_count(&self) -> usize {
        Self::subscriber_count(self)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Receive side of one bus subscription.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<CallEvent>,
    bus: Weak<EventBus>,
}

impl Subscription {
    /// This subscription's id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event; `None` once the bus closed this subscription.
    pub async fn recv(&mut self) -> Option<CallEvent> {
        self.receiver.recv().await
    }

    /// Take an event if one is buffered.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<CallEvent> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl EventSource for Subscription {
    async fn next_event(&mut self) -> Option<CallEvent> {
        self.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
