// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared Memory IPC module.
//!
//! Zero-copy inter-process communication using POSIX shared memory.
//! Rings carry fixed-size buffer descriptors; payloads stay in the external
//! buffer pool and are never copied.

mod descriptor;
mod publisher;
mod region;
mod ring;
mod spin_lock;
mod subscriber;

pub use descriptor::{BufferDescriptor, BufferFormat, DESCRIPTOR_NAME_LEN};
pub use publisher::SharedPublisher;
pub use region::SharedMemoryRegion;
pub use ring::{OverflowPolicy, RingEntry, RingStatus, SharedRing, SlotClaim, SlotState};
pub use spin_lock::{SpinLock, SpinLockGuard, LOCKED, UNLOCKED};
pub use subscriber::SharedSubscriber;
