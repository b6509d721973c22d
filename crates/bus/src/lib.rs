//! Event bus for cell controllers.
//!
//! The bus is an explicitly constructed object handed to every component.
//! Topics are typed channel handles: a `Topic<CellsEvent>` cannot carry a
//! `SessionEvent`, and asking for an existing topic name with another payload
//! type is rejected.
//!
//! Delivery contract:
//! - Synchronous, in-process, FIFO per topic in publish order (a publish from
//!   inside a handler of the same topic is delivered after the current event)
//! - Subscribers are invoked in subscription order
//! - Handler panics are caught and counted; remaining subscribers still run
//! - No persistence: an event published with no subscribers is dropped
//! - No lock is held while a handler runs (handlers may publish, subscribe
//!   and unsubscribe re-entrantly)

mod topic;

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub use topic::{Subscription, Topic};

/// Errors from bus operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Topic already exists with a different payload type.
    #[error("topic '{topic}' already carries {existing}, requested {requested}")]
    TopicTypeMismatch {
        topic: String,
        existing: &'static str,
        requested: &'static str,
    },
}

/// Delivery counters (for diagnostics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events published on any topic.
    pub published: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Events published while the topic had no subscribers.
    pub dropped: u64,
    /// Handler invocations that panicked.
    pub handler_failures: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) published: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    next_subscription_id: AtomicU64,
}

impl Counters {
    pub(crate) fn next_id(&self) -> u64 {
        self.next_subscription_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

struct TopicSlot {
    payload: &'static str,
    channel: Arc<dyn Any + Send + Sync>,
}

/// Process-wide publish/subscribe bus. Cloning shares the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    topics: Arc<Mutex<HashMap<String, TopicSlot>>>,
    counters: Arc<Counters>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the typed handle for a topic.
    pub fn topic<T: Clone + Send + 'static>(&self, name: &str) -> Result<Topic<T>, BusError> {
        let mut topics = self.topics.lock();

        if let Some(slot) = topics.get(name) {
            return match Arc::clone(&slot.channel).downcast::<topic::Channel<T>>() {
                Ok(channel) => Ok(Topic::from_parts(name, channel, Arc::clone(&self.counters))),
                Err(_) => {
                    log::warn!(
                        "Topic '{}' requested as {} but carries {}",
                        name,
                        type_name::<T>(),
                        slot.payload
                    );
                    Err(BusError::TopicTypeMismatch {
                        topic: name.to_string(),
                        existing: slot.payload,
                        requested: type_name::<T>(),
                    })
                }
            };
        }

        let channel = Arc::new(topic::Channel::<T>::new());
        topics.insert(
            name.to_string(),
            TopicSlot {
                payload: type_name::<T>(),
                channel: channel.clone(),
            },
        );
        log::debug!("Created topic '{}' ({})", name, type_name::<T>());
        Ok(Topic::from_parts(name, channel, Arc::clone(&self.counters)))
    }

    /// Snapshot of delivery counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.lock();
        let mut names: Vec<&str> = topics.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventBus")
            .field("topics", &names)
            .field("stats", &self.stats())
            .finish()
    }
}
