//! In-process publish/subscribe fan-out of [`Event`]s.
//!
//! Every [`Subscription`] owns a bounded queue. Publishing never waits for a
//! subscriber: when a queue is full its **oldest** event is discarded to make room
//! for the new one, and the loss is counted both on the subscription and bus-wide.
//!
//! The bus keeps only weak references to subscription queues. Dropping a
//! [`Subscription`] unregisters it lazily on the next publish.
//!
//! # Example
//!
//! ```rust
//! # tokio_test_block_on(async {
//! use plugin_controller::bus::EventBus;
//! use plugin_controller::event::{Event, EventKind};
//!
//! let bus = EventBus::new(16);
//! let mut subscription = bus.subscribe();
//! bus.publish(Event::at(EventKind::PerfMemory(1024), 1));
//! let event = subscription.recv().await.unwrap();
//! assert_eq!(event.kind(), &EventKind::PerfMemory(1024));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use prometheus_client::metrics::counter::Counter;
use tokio::sync::Notify;

use crate::event::Event;

const LOG_TARGET: &str = "event bus";

#[derive(Debug)]
struct Queue {
    events: Mutex<VecDeque<Arc<Event>>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Event>>> {
        // Critical sections never panic halfway through, so a poisoned queue is consistent.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues the event, returning `true` if the oldest event had to be dropped.
    fn push(&self, event: Arc<Event>) -> bool {
        let overflowed = {
            let mut events = self.lock();
            let overflowed = events.len() >= self.capacity;
            if overflowed {
                events.pop_front();
            }
            events.push_back(event);
            overflowed
        };
        if overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        overflowed
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Fan-out of events to every currently registered subscription.
///
/// Cloning the bus yields another handle to the same registry.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    subscribers: DashMap<u64, Weak<Queue>>,
    next_id: AtomicU64,
    capacity: usize,
    dropped: Counter,
    closed: AtomicBool,
}

impl EventBus {
    /// Creates a bus whose subscriptions buffer at most `capacity` events each.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
                dropped: Counter::default(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a new subscription.
    ///
    /// The subscription observes only events published after this call. Subscribing to a
    /// closed bus yields a subscription that is already closed.
    pub fn subscribe(&self) -> Subscription {
        let queue = Arc::new(Queue::new(self.inner.capacity));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, Arc::downgrade(&queue));
        // Re-checked after registering so a concurrent close cannot miss this queue.
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.subscribers.remove(&id);
            queue.close();
        }
        Subscription { queue }
    }

    /// Delivers the event to every live subscription without blocking.
    pub fn publish(&self, event: Event) {
        if self.inner.closed.load(Ordering::Acquire) {
            log::debug!(target: LOG_TARGET, "dropping {} published after close", event.name());
            return;
        }
        let event = Arc::new(event);
        self.inner.subscribers.retain(|id, queue| {
            let Some(queue) = queue.upgrade() else {
                log::trace!(target: LOG_TARGET, "removing dropped subscription {id}");
                return false;
            };
            if queue.push(Arc::clone(&event)) {
                self.inner.dropped.inc();
                log::warn!(
                    target: LOG_TARGET,
                    "subscription {id} is full, dropped its oldest event"
                );
            }
            true
        });
    }

    /// Closes the bus and every subscription.
    ///
    /// Subscribers still receive the events queued before the close.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.subscribers.retain(|_, queue| {
            if let Some(queue) = queue.upgrade() {
                queue.close();
            }
            false
        });
    }

    /// Number of events dropped across all subscriptions because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.get()
    }

    /// The bus-wide drop counter, for registration with a metrics registry.
    pub fn dropped_counter(&self) -> Counter {
        self.inner.dropped.clone()
    }

    /// Number of registered subscriptions, including dropped ones not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

/// The receiving end of an [`EventBus`] registration, owned by the subscriber.
#[derive(Debug)]
pub struct Subscription {
    queue: Arc<Queue>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// Returns `None` once the bus is closed and every queued event was received.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return self.try_recv();
            }
            // A notification issued between the checks above and this await is kept as
            // a permit by `notify_one`, so no wake-up is lost.
            self.queue.notify.notified().await;
        }
    }

    /// Returns the next queued event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.queue.lock().pop_front()
    }

    /// Number of events this subscription lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}
