// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Consumer-side handle on a shared ring.

use crate::error::SharedMemoryError;
use crate::shm::descriptor::BufferDescriptor;
use crate::shm::ring::{RingEntry, SharedRing};
use crate::stats::RingSnapshot;
use crate::types::{RingName, WaitTimeout};

/// Takes descriptors off a ring created by a [`SharedPublisher`].
///
/// Several subscribers on one ring compete for descriptors; each one is
/// delivered to at most one of them.
///
/// [`SharedPublisher`]: crate::shm::SharedPublisher
pub struct SharedSubscriber {
    name: RingName,
    ring: Option<SharedRing>,
}

impl SharedSubscriber {
    /// Open an existing ring.
    ///
    /// # Errors
    /// `NotFound` if no ring with this name exists or its creator never
    /// finished initializing it.
    pub fn attach(name: &RingName) -> Result<Self, SharedMemoryError> {
        let ring = SharedRing::open(name)?;
        tracing::info!(ring = %name, capacity = ring.capacity(), "Subscriber attached");
        Ok(Self {
            name: name.clone(),
            ring: Some(ring),
        })
    }

    /// Next descriptor, waiting up to `timeout`.
    pub fn pop(&self, timeout: WaitTimeout) -> Result<BufferDescriptor, SharedMemoryError> {
        self.pop_entry(timeout).map(|entry| entry.descriptor)
    }

    /// Next descriptor together with its ring sequence number.
    pub fn pop_entry(&self, timeout: WaitTimeout) -> Result<RingEntry, SharedMemoryError> {
        self.ring()?.try_consume(timeout)
    }

    /// Header and slot states of the ring.
    pub fn snapshot(&self, timeout: WaitTimeout) -> Result<RingSnapshot, SharedMemoryError> {
        self.ring()?.snapshot(timeout)
    }

    /// Drop the local mapping. The ring itself survives.
    pub fn detach(&mut self) {
        if self.ring.take().is_some() {
            tracing::debug!(ring = %self.name, "Subscriber detached");
        }
    }

    pub fn name(&self) -> &RingName {
        &self.name
    }

    pub fn is_attached(&self) -> bool {
        self.ring.is_some()
    }

    fn ring(&self) -> Result<&SharedRing, SharedMemoryError> {
        self.ring.as_ref().ok_or_else(|| SharedMemoryError::BadState {
            reason: format!("subscriber for ring {} is detached", self.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::descriptor::BufferFormat;
    use crate::shm::SharedPublisher;
    use crate::types::QueueDepth;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn unique_name(tag: &str) -> RingName {
        RingName::new(format!("fl-sub-{}-{}", tag, std::process::id())).unwrap()
    }

    #[test]
    fn test_attach_missing_ring() {
        assert!(matches!(
            SharedSubscriber::attach(&unique_name("missing")),
            Err(SharedMemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_round_trip_is_bit_identical() {
        let name = unique_name("roundtrip");
        let publisher = SharedPublisher::attach(&name, QueueDepth::default()).unwrap();
        let subscriber = SharedSubscriber::attach(&name).unwrap();

        let sent = BufferDescriptor::new("cam0.nv12", 0x7f00_dead_0000, 3_110_400, BufferFormat::Nv12)
            .unwrap()
            .with_frame(1234, 987_654_321);
        let sequence = publisher.push(&sent, WaitTimeout::millis(10)).unwrap();

        let entry = subscriber.pop_entry(WaitTimeout::millis(10)).unwrap();
        assert_eq!(entry.sequence, sequence);
        assert_eq!(bytemuck::bytes_of(&entry.descriptor), bytemuck::bytes_of(&sent));

        publisher.destroy().unwrap();
    }

    #[test]
    fn test_detached_subscriber_is_bad_state() {
        let name = unique_name("detach");
        let publisher = SharedPublisher::attach(&name, QueueDepth::default()).unwrap();
        let mut subscriber = SharedSubscriber::attach(&name).unwrap();
        subscriber.detach();
        assert!(matches!(
            subscriber.pop(WaitTimeout::immediate()),
            Err(SharedMemoryError::BadState { .. })
        ));
        // Detaching does not remove the ring.
        assert!(SharedSubscriber::attach(&name).is_ok());
        publisher.destroy().unwrap();
    }

    #[test]
    fn test_competing_subscribers_get_each_descriptor_once() {
        const FRAMES: u64 = 200;

        let name = unique_name("compete");
        let publisher = SharedPublisher::attach_with(
            &name,
            QueueDepth::new(8).unwrap(),
            crate::shm::OverflowPolicy::Block,
        )
        .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let name = name.clone();
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    let subscriber = SharedSubscriber::attach(&name).unwrap();
                    while let Ok(desc) = subscriber.pop(WaitTimeout::millis(200)) {
                        seen.lock().unwrap().push(desc.frame_id);
                    }
                })
            })
            .collect();

        for frame_id in 0..FRAMES {
            let desc = BufferDescriptor::new("f", frame_id, 1, BufferFormat::Raw)
                .unwrap()
                .with_frame(frame_id, 0);
            publisher.push(&desc, WaitTimeout::millis(1_000)).unwrap();
        }

        for consumer in consumers {
            consumer.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len() as u64, FRAMES);
        assert_eq!(unique.len() as u64, FRAMES);

        publisher.destroy().unwrap();
    }
}
