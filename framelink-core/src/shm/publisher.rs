// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Producer-side handle on a shared ring.

use crate::config::RingConfig;
use crate::error::SharedMemoryError;
use crate::shm::descriptor::BufferDescriptor;
use crate::shm::ring::{OverflowPolicy, SharedRing, ATTACH_WAIT};
use crate::shm::spin_lock::{relax, Deadline};
use crate::shm::SharedMemoryRegion;
use crate::stats::RingSnapshot;
use crate::types::{QueueDepth, RingName, WaitTimeout};

/// Publishes descriptors into a named ring, creating the ring if needed.
///
/// Any number of publishers may attach to the same ring; the first one
/// creates and initializes it.
pub struct SharedPublisher {
    name: RingName,
    ring: Option<SharedRing>,
    created: bool,
}

impl SharedPublisher {
    /// Attach with the default overflow policy (evict oldest).
    pub fn attach(name: &RingName, depth: QueueDepth) -> Result<Self, SharedMemoryError> {
        Self::attach_with(name, depth, OverflowPolicy::default())
    }

    /// Attach using a validated ring configuration.
    pub fn from_config(config: &RingConfig) -> Result<Self, SharedMemoryError> {
        Self::attach_with(&config.name, config.queue_depth, config.overflow)
    }

    /// Create the ring, or join it if another process already did.
    ///
    /// # Errors
    /// `BadArguments` if an existing ring has a different depth or overflow
    /// policy; `BadState` if it exists but was destroyed or never finished
    /// initializing.
    pub fn attach_with(
        name: &RingName,
        depth: QueueDepth,
        overflow: OverflowPolicy,
    ) -> Result<Self, SharedMemoryError> {
        // The creator may still be sizing or initializing the segment.
        let deadline = Deadline::start(WaitTimeout::After(ATTACH_WAIT));
        let mut attempt = 0;
        let ring = loop {
            match SharedRing::create(name, depth, overflow) {
                Ok(ring) => {
                    tracing::info!(ring = %name, depth = depth.value(), "Created shared ring");
                    return Ok(Self {
                        name: name.clone(),
                        ring: Some(ring),
                        created: true,
                    });
                }
                Err(SharedMemoryError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }

            match SharedRing::open(name) {
                Ok(ring) => break ring,
                Err(SharedMemoryError::NotFound { .. }) if !deadline.expired() => {
                    tracing::debug!(ring = %name, "Ring not ready yet, retrying attach");
                    relax(&mut attempt);
                }
                Err(SharedMemoryError::NotFound { .. }) => {
                    return Err(SharedMemoryError::BadState {
                        reason: format!(
                            "ring {} exists but was never initialized; destroy it and retry",
                            name
                        ),
                    })
                }
                Err(e) => return Err(e),
            }
        };

        if ring.capacity() != depth.value() {
            return Err(SharedMemoryError::BadArguments {
                reason: format!(
                    "ring {} has depth {}, requested {}",
                    name,
                    ring.capacity(),
                    depth
                ),
            });
        }
        if ring.overflow_policy() != overflow {
            return Err(SharedMemoryError::BadArguments {
                reason: format!(
                    "ring {} uses overflow policy {}, requested {}",
                    name,
                    ring.overflow_policy().name(),
                    overflow.name()
                ),
            });
        }

        tracing::info!(ring = %name, depth = depth.value(), "Joined existing shared ring");
        Ok(Self {
            name: name.clone(),
            ring: Some(ring),
            created: false,
        })
    }

    /// Claim a slot and commit `descriptor` into it.
    ///
    /// Returns the sequence number assigned to the descriptor.
    pub fn push(
        &self,
        descriptor: &BufferDescriptor,
        timeout: WaitTimeout,
    ) -> Result<u64, SharedMemoryError> {
        let sequence = self.ring()?.push(descriptor, timeout)?;
        tracing::trace!(
            ring = %self.name,
            sequence = sequence,
            frame_id = descriptor.frame_id,
            "Pushed descriptor"
        );
        Ok(sequence)
    }

    /// Header and slot states of the ring.
    pub fn snapshot(&self, timeout: WaitTimeout) -> Result<RingSnapshot, SharedMemoryError> {
        self.ring()?.snapshot(timeout)
    }

    /// Drop the local mapping. The ring itself survives.
    pub fn detach(&mut self) {
        if self.ring.take().is_some() {
            tracing::debug!(ring = %self.name, "Publisher detached");
        }
    }

    /// End the ring's lifetime: mark it destroyed for every peer still
    /// mapped and unlink its name.
    pub fn destroy(mut self) -> Result<(), SharedMemoryError> {
        let ring = self.ring.take().ok_or_else(|| self.detached_error())?;
        ring.mark_destroyed();
        drop(ring);

        match SharedMemoryRegion::unlink(self.name.as_str()) {
            Ok(()) | Err(SharedMemoryError::NotFound { .. }) => {
                tracing::info!(ring = %self.name, "Destroyed shared ring");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Destroy a ring by name without attaching a publisher to it.
    ///
    /// Works on rings that never finished initializing.
    pub fn destroy_named(name: &RingName) -> Result<(), SharedMemoryError> {
        match SharedRing::open(name) {
            Ok(ring) => ring.mark_destroyed(),
            Err(SharedMemoryError::NotFound { .. }) | Err(SharedMemoryError::BadState { .. }) => {}
            Err(e) => return Err(e),
        }
        SharedMemoryRegion::unlink(name.as_str())?;
        tracing::info!(ring = %name, "Destroyed shared ring");
        Ok(())
    }

    pub fn name(&self) -> &RingName {
        &self.name
    }

    /// Whether this publisher created the ring.
    pub fn is_creator(&self) -> bool {
        self.created
    }

    pub fn is_attached(&self) -> bool {
        self.ring.is_some()
    }

    fn ring(&self) -> Result<&SharedRing, SharedMemoryError> {
        self.ring.as_ref().ok_or_else(|| self.detached_error())
    }

    fn detached_error(&self) -> SharedMemoryError {
        SharedMemoryError::BadState {
            reason: format!("publisher for ring {} is detached", self.name),
        }
    }
}
