// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Framelink Core Library
//!
//! Zero-copy frame transport between processes and multi-stream frame
//! synchronization. Provides a process-shared spin lock, fixed-depth
//! descriptor rings in POSIX shared memory with publisher/subscriber
//! handles, an in-process topic bus, window-based frame alignment, and
//! configuration parsing.

pub mod config;
pub mod error;
pub mod shm;
pub mod stats;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, RingConfig, SynchronizerConfig};
pub use error::{HardValidationError, LinkError, LinkResult, SharedMemoryError};
pub use shm::{
    BufferDescriptor, BufferFormat, OverflowPolicy, SharedPublisher, SharedRing,
    SharedSubscriber, SpinLock,
};
pub use stats::{RingSnapshot, SyncStats};
pub use sync::{AlignmentStrategy, FrameSet, FrameSynchronizer, LocalBus, SyncHandle};
pub use types::{Permutation, QueueDepth, RingName, WaitTimeout};
