// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process topic bus.
//!
//! Each subscription owns a bounded queue; publishing fans a message out to
//! every live queue on the topic without blocking the publisher.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashMap;

/// Queue capacity given to each subscription by default.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

/// Topic-addressed publish/subscribe within one process.
pub struct LocalBus<T> {
    topics: DashMap<String, Vec<Sender<T>>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> LocalBus<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Bus whose subscriptions each buffer up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscription on `topic`.
    pub fn subscribe(&self, topic: &str) -> Subscription<T> {
        let (sender, receiver) = bounded(self.capacity);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        tracing::debug!(topic = %topic, "Subscribed to topic");
        Subscription {
            topic: topic.to_string(),
            receiver,
        }
    }

    /// Deliver `message` to every subscription on `topic`.
    ///
    /// Returns how many subscriptions accepted it. A subscription whose
    /// queue is full misses the message; dropped subscriptions are pruned.
    pub fn publish(&self, topic: &str, message: T) -> usize {
        let Some(mut senders) = self.topics.get_mut(topic) else {
            return 0;
        };

        let mut delivered = 0;
        senders.retain(|sender| match sender.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(topic = %topic, "Subscriber queue full, dropping message");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    /// Handle bound to one topic.
    pub fn publisher(self: &Arc<Self>, topic: &str) -> TopicPublisher<T> {
        TopicPublisher {
            bus: Arc::clone(self),
            topic: topic.to_string(),
        }
    }

    /// Subscriptions registered on `topic`. Dropped subscriptions are
    /// counted until the next publish prunes them.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|senders| senders.len()).unwrap_or(0)
    }
}

impl<T: Clone + Send + 'static> Default for LocalBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishing handle for a single topic.
pub struct TopicPublisher<T> {
    bus: Arc<LocalBus<T>>,
    topic: String,
}

impl<T: Clone + Send + 'static> TopicPublisher<T> {
    pub fn publish(&self, message: T) -> usize {
        self.bus.publish(&self.topic, message)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T> Clone for TopicPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            topic: self.topic.clone(),
        }
    }
}

/// Receiving end of one topic subscription.
pub struct Subscription<T> {
    topic: String,
    receiver: Receiver<T>,
}

impl<T> Subscription<T> {
    /// Next message, waiting up to `timeout`. A zero timeout polls once.
    ///
    /// Returns `None` on timeout or once every publisher is gone and the
    /// queue is drained.
    pub fn try_receive(&self, timeout: Duration) -> Option<T> {
        if timeout.is_zero() {
            return self.receiver.try_recv().ok();
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Messages waiting in the queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }
}
