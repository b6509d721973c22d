//! Typed topic handles and subscriptions.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Counters;

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler<T>,
}

/// Events published while a delivery on the same topic is running.
struct Delivery<T> {
    pending: VecDeque<T>,
    delivering: bool,
}

/// Subscriber list and delivery queue for one topic.
pub(crate) struct Channel<T> {
    subscribers: Mutex<Vec<Arc<Subscriber<T>>>>,
    delivery: Mutex<Delivery<T>>,
}

impl<T> Channel<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            delivery: Mutex::new(Delivery {
                pending: VecDeque::new(),
                delivering: false,
            }),
        }
    }
}

/// Type-erased removal, so a `Subscription` does not carry the payload type.
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send> Detach for Channel<T> {
    fn detach(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }
}

/// Typed handle to a named topic. Cloning shares the same topic.
pub struct Topic<T> {
    name: Arc<str>,
    channel: Arc<Channel<T>>,
    counters: Arc<Counters>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            channel: Arc::clone(&self.channel),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub(crate) fn from_parts(name: &str, channel: Arc<Channel<T>>, counters: Arc<Counters>) -> Self {
        Self {
            name: Arc::from(name),
            channel,
            counters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler. Events published before this call are never seen.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.counters.next_id();
        let active = Arc::new(AtomicBool::new(true));
        self.channel.subscribers.lock().push(Arc::new(Subscriber {
            id,
            active: Arc::clone(&active),
            handler: Box::new(handler),
        }));
        log::debug!("Subscription {} on '{}'", id, self.name);

        let channel: Arc<dyn Detach> = self.channel.clone();
        Subscription {
            id,
            topic: Arc::clone(&self.name),
            active,
            channel: Arc::downgrade(&channel),
        }
    }

    /// Deliver an event to every current subscriber, in subscription order.
    ///
    /// The subscriber list is snapshotted before delivery; a subscriber
    /// removed mid-delivery is skipped if it has not run yet.
    ///
    /// A publish on this topic from inside one of its handlers is queued and
    /// delivered after the current event has reached every subscriber, so
    /// all subscribers observe events in publish order.
    /// A publish from another thread during delivery is queued the same way
    /// and delivered by the thread already delivering.
    pub fn publish(&self, event: &T) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        {
            let mut delivery = self.channel.delivery.lock();
            if delivery.delivering {
                delivery.pending.push_back(event.clone());
                log::trace!("Nested publish on '{}' queued", self.name);
                return;
            }
            delivery.delivering = true;
        }

        self.deliver(event);
        loop {
            let next = {
                let mut delivery = self.channel.delivery.lock();
                match delivery.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        delivery.delivering = false;
                        return;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, event: &T) {
        let snapshot: Vec<Arc<Subscriber<T>>> = self.channel.subscribers.lock().clone();
        if snapshot.is_empty() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("No subscribers on '{}', event dropped", self.name);
            return;
        }

        for subscriber in snapshot {
            if !subscriber.active.load(Ordering::Acquire) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event))) {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Subscriber {} on '{}' panicked: {}",
                        subscriber.id,
                        self.name,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.channel.subscribers.lock().len()
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic").field("name", &self.name).finish()
    }
}

/// Handle returned by [`Topic::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: u64,
    topic: Arc<str>,
    active: Arc<AtomicBool>,
    channel: Weak<dyn Detach>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery to this subscriber. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.id);
        }
        log::debug!("Unsubscribed {} from '{}'", self.id, self.topic);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
