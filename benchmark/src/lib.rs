// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Framelink Benchmark Fixtures
//!
//! Shared setup for the criterion benches: rings with unique names that are
//! destroyed when the fixture drops, and synthetic frame descriptors.

use std::sync::atomic::{AtomicUsize, Ordering};

use framelink_core::{
    BufferDescriptor, BufferFormat, OverflowPolicy, QueueDepth, RingName, SharedPublisher,
    SharedSubscriber,
};

static NEXT_RING: AtomicUsize = AtomicUsize::new(0);

/// Ring name unique to this process and call.
pub fn unique_ring(tag: &str) -> RingName {
    let n = NEXT_RING.fetch_add(1, Ordering::Relaxed);
    RingName::new(format!("fl-bench-{}-{}-{}", tag, std::process::id(), n))
        .expect("Invalid benchmark ring name")
}

/// Descriptor for a 1080p NV12 frame.
pub fn descriptor(frame_id: u64) -> BufferDescriptor {
    BufferDescriptor::new("bench", frame_id, 1920 * 1080 * 3 / 2, BufferFormat::Nv12)
        .expect("Invalid benchmark descriptor")
        .with_frame(frame_id, frame_id * 33_333_333)
}

/// A publisher and subscriber on a fresh ring.
pub struct BenchRing {
    pub publisher: Option<SharedPublisher>,
    pub subscriber: SharedSubscriber,
}

impl BenchRing {
    pub fn new(tag: &str, depth: u32, overflow: OverflowPolicy) -> Self {
        let name = unique_ring(tag);
        let depth = QueueDepth::new(depth).expect("Invalid benchmark depth");
        let publisher = SharedPublisher::attach_with(&name, depth, overflow)
            .expect("Failed to create benchmark ring");
        let subscriber =
            SharedSubscriber::attach(&name).expect("Failed to attach benchmark subscriber");
        Self {
            publisher: Some(publisher),
            subscriber,
        }
    }

    pub fn publisher(&self) -> &SharedPublisher {
        self.publisher
            .as_ref()
            .expect("Publisher is only taken on drop")
    }
}

impl Drop for BenchRing {
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            let _ = publisher.destroy();
        }
    }
}
