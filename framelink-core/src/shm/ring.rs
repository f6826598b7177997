// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-depth descriptor ring in shared memory.
//!
//! Layout of a ring segment:
//!
//! ```text
//! +------------------+ 0
//! | RingHeader       |  status, spin lock, head/tail/count, counters, name
//! +------------------+ HEADER_SIZE
//! | RingSlot[0]      |  sequence, state, checksum, BufferDescriptor
//! | ...              |
//! | RingSlot[cap-1]  |
//! +------------------+
//! ```
//!
//! Every read or write of head, tail, count and slot state happens while
//! holding the header's spin lock. Descriptors are written into a claimed
//! slot outside the lock; only the claiming producer touches a `CLAIMED` slot,
//! and at most one slot per ring is `CLAIMED` at any time.

use std::cell::UnsafeCell;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SharedMemoryError;
use crate::shm::descriptor::BufferDescriptor;
use crate::shm::spin_lock::{relax, Deadline, SpinLock};
use crate::shm::SharedMemoryRegion;
use crate::stats::{RingSnapshot, SlotSnapshot};
use crate::types::{QueueDepth, RingName, WaitTimeout, MAX_RING_NAME_LEN};

/// Identifies a framelink ring segment ("FRMLINK1").
const RING_MAGIC: u64 = u64::from_le_bytes(*b"FRMLINK1");

/// Header bytes reserved at the start of the segment.
const HEADER_SIZE: usize = align_up(size_of::<RingHeader>(), 64);

/// Segments are sized in whole pages.
const PAGE_SIZE: usize = 4096;

/// How long `open` waits for a creator to publish the presence flag.
pub(crate) const ATTACH_WAIT: Duration = Duration::from_millis(100);

/// Lock budget for handing back a slot whose commit timed out.
const ABANDON_WAIT: Duration = Duration::from_millis(100);

/// Smallest lock budget handed to a nested lock acquisition, so that a
/// zero-timeout poll still gets past momentary contention.
const MIN_LOCK_WAIT: Duration = Duration::from_millis(1);

// Segment status values.
const STATUS_UNINITIALIZED: u32 = 0;
const STATUS_INITIALIZED: u32 = 1;
const STATUS_DESTROYED: u32 = 2;

// Slot state values.
const SLOT_EMPTY: u32 = 0;
const SLOT_CLAIMED: u32 = 1;
const SLOT_COMMITTED: u32 = 2;
const SLOT_ABANDONED: u32 = 3;

/// Lifecycle of a ring segment as recorded in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingStatus {
    Uninitialized,
    Initialized,
    Destroyed,
    /// Any status word this build does not recognise.
    Corrupted,
}

impl RingStatus {
    fn from_raw(raw: u32) -> Self {
        match raw {
            STATUS_UNINITIALIZED => Self::Uninitialized,
            STATUS_INITIALIZED => Self::Initialized,
            STATUS_DESTROYED => Self::Destroyed,
            _ => Self::Corrupted,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Destroyed => "destroyed",
            Self::Corrupted => "corrupted",
        }
    }
}

/// Slot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Empty,
    /// A producer is writing the descriptor.
    Claimed,
    /// Descriptor valid, awaiting consumption.
    Committed,
    /// Claimed but given up by its producer; skipped by consumers.
    Abandoned,
}

impl SlotState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            SLOT_CLAIMED => Self::Claimed,
            SLOT_COMMITTED => Self::Committed,
            SLOT_ABANDONED => Self::Abandoned,
            _ => Self::Empty,
        }
    }
}

/// What a producer does when every slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the oldest unread descriptor so the producer never waits on a
    /// slow consumer.
    #[default]
    EvictOldest,
    /// Wait for a consumer to free a slot, bounded by the caller's timeout.
    Block,
}

impl OverflowPolicy {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Block,
            _ => Self::EvictOldest,
        }
    }

    fn to_raw(self) -> u32 {
        match self {
            Self::EvictOldest => 0,
            Self::Block => 1,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::EvictOldest => "evict_oldest",
            Self::Block => "block",
        }
    }
}

/// Ring header stored at the start of shared memory.
#[repr(C)]
struct RingHeader {
    magic: AtomicU64,
    /// Presence flag; published last by the creator.
    status: AtomicU32,
    lock: SpinLock,
    capacity: AtomicU32,
    /// Next slot to claim.
    head: AtomicU32,
    /// Next slot to consume.
    tail: AtomicU32,
    /// Claimed plus committed slots.
    count: AtomicU32,
    overflow: AtomicU32,
    /// 1 while a producer holds a claimed, uncommitted slot.
    claimed: AtomicU32,
    next_sequence: AtomicU64,
    pushed: AtomicU64,
    popped: AtomicU64,
    evicted: AtomicU64,
    /// NUL-padded ring name, written once before the status is published.
    name: [u8; MAX_RING_NAME_LEN + 1],
}

/// One fixed-size slot of the ring.
#[repr(C)]
struct RingSlot {
    sequence: AtomicU64,
    state: AtomicU32,
    checksum: AtomicU32,
    descriptor: UnsafeCell<BufferDescriptor>,
}

const _: () = assert!(size_of::<RingSlot>() == 112);
const _: () = assert!(HEADER_SIZE % std::mem::align_of::<RingSlot>() == 0);

/// A slot handed to a producer by [`SharedRing::claim`].
///
/// Must be passed to [`SharedRing::commit`] or [`SharedRing::abandon`];
/// a claim that is neither blocks consumers at that position.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a claimed slot blocks consumers until it is committed or abandoned"]
pub struct SlotClaim {
    index: u32,
    sequence: u64,
}

impl SlotClaim {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A descriptor taken off the ring, with the sequence number it was
/// claimed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntry {
    pub sequence: u64,
    pub descriptor: BufferDescriptor,
}

/// Multi-producer, multi-consumer descriptor ring over a shared segment.
pub struct SharedRing {
    region: SharedMemoryRegion,
    capacity: u32,
}

impl SharedRing {
    /// Bytes needed for a ring of the given depth, rounded up to whole pages.
    pub fn segment_size(depth: QueueDepth) -> usize {
        let raw = HEADER_SIZE + depth.value() as usize * size_of::<RingSlot>();
        align_up(raw.max(SharedMemoryRegion::MIN_SIZE), PAGE_SIZE)
    }

    /// Create and initialize a new ring segment.
    ///
    /// # Errors
    /// `AlreadyExists` if a segment with this name is already present.
    pub fn create(
        name: &RingName,
        depth: QueueDepth,
        overflow: OverflowPolicy,
    ) -> Result<Self, SharedMemoryError> {
        let region = SharedMemoryRegion::create(name.as_str(), Self::segment_size(depth))?;
        let ring = Self {
            region,
            capacity: depth.value(),
        };

        // SAFETY: the region was just created with O_EXCL; no other process
        // reads the header until the status below is published.
        unsafe {
            let header = ring.region.as_ptr() as *mut RingHeader;
            let name_field = std::ptr::addr_of_mut!((*header).name) as *mut u8;
            std::ptr::copy_nonoverlapping(name.as_str().as_ptr(), name_field, name.as_str().len());
        }

        let header = ring.header();
        header.magic.store(RING_MAGIC, Ordering::Relaxed);
        header.lock.init();
        header.capacity.store(depth.value(), Ordering::Relaxed);
        header.head.store(0, Ordering::Relaxed);
        header.tail.store(0, Ordering::Relaxed);
        header.count.store(0, Ordering::Relaxed);
        header.overflow.store(overflow.to_raw(), Ordering::Relaxed);
        header.claimed.store(0, Ordering::Relaxed);
        header.next_sequence.store(0, Ordering::Relaxed);
        for index in 0..depth.value() {
            let slot = ring.slot(index);
            slot.state.store(SLOT_EMPTY, Ordering::Relaxed);
            slot.sequence.store(0, Ordering::Relaxed);
        }
        header.status.store(STATUS_INITIALIZED, Ordering::Release);

        tracing::debug!(
            ring = %name,
            capacity = depth.value(),
            overflow = overflow.name(),
            "Shared ring initialized"
        );

        Ok(ring)
    }

    /// Open an existing ring segment created by another process.
    ///
    /// # Errors
    /// `NotFound` if the segment does not exist or its creator never
    /// finished initializing it; `BadState` if it was destroyed or is not a
    /// framelink ring.
    pub fn open(name: &RingName) -> Result<Self, SharedMemoryError> {
        let region = SharedMemoryRegion::open(name.as_str())?;
        if region.size() < HEADER_SIZE {
            return Err(SharedMemoryError::NotFound {
                name: name.to_string(),
            });
        }

        let mut ring = Self {
            region,
            capacity: 0,
        };

        let deadline = Deadline::start(WaitTimeout::After(ATTACH_WAIT));
        let mut attempt = 0;
        let status = loop {
            match ring.status() {
                RingStatus::Uninitialized if !deadline.expired() => relax(&mut attempt),
                RingStatus::Uninitialized => {
                    return Err(SharedMemoryError::NotFound {
                        name: name.to_string(),
                    })
                }
                other => break other,
            }
        };

        if status != RingStatus::Initialized {
            return Err(SharedMemoryError::BadState {
                reason: format!("ring {} is {}", name, status.name()),
            });
        }

        let header = ring.header();
        if header.magic.load(Ordering::Relaxed) != RING_MAGIC {
            return Err(SharedMemoryError::BadState {
                reason: format!("segment {} is not a framelink ring", name),
            });
        }

        let capacity = header.capacity.load(Ordering::Relaxed);
        let depth = QueueDepth::new(capacity).map_err(|e| SharedMemoryError::BadState {
            reason: format!("ring {} has invalid capacity: {}", name, e),
        })?;
        if Self::segment_size(depth) > ring.region.size() {
            return Err(SharedMemoryError::BadState {
                reason: format!(
                    "ring {} capacity {} does not fit its {} byte segment",
                    name,
                    capacity,
                    ring.region.size()
                ),
            });
        }
        ring.capacity = capacity;

        tracing::debug!(ring = %name, capacity = capacity, "Shared ring opened");
        Ok(ring)
    }

    /// Name of the underlying segment.
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Number of slots, fixed at creation.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Overflow policy chosen by the creator.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::from_raw(self.header().overflow.load(Ordering::Relaxed))
    }

    /// Current segment status.
    pub fn status(&self) -> RingStatus {
        RingStatus::from_raw(self.header().status.load(Ordering::Acquire))
    }

    /// Reserve the slot at `head` for writing.
    ///
    /// At most one slot per ring is claimed at a time. While another
    /// producer's claim is outstanding the call retries until that claim is
    /// committed or abandoned. On a full ring the oldest committed descriptor
    /// is evicted under [`OverflowPolicy::EvictOldest`]; under
    /// [`OverflowPolicy::Block`] the call retries until a consumer frees a
    /// slot. Either wait ends with `Timeout` when the deadline passes.
    pub fn claim(&self, timeout: WaitTimeout) -> Result<SlotClaim, SharedMemoryError> {
        let deadline = Deadline::start(timeout);
        let policy = self.overflow_policy();
        let header = self.header();
        let mut attempt = 0;

        loop {
            self.ensure_live()?;
            {
                let _guard = header.lock.guard(lock_budget(&deadline))?;
                if header.claimed.load(Ordering::Relaxed) == 0 {
                    if let Some(claim) = self.claim_locked(policy) {
                        return Ok(claim);
                    }
                }
            }

            if deadline.expired() {
                return Err(deadline.timeout_error("ring claim"));
            }
            relax(&mut attempt);
        }
    }

    /// Publish a descriptor into a claimed slot.
    pub fn commit(
        &self,
        claim: SlotClaim,
        descriptor: &BufferDescriptor,
        timeout: WaitTimeout,
    ) -> Result<(), SharedMemoryError> {
        let slot = self.claimed_slot(&claim)?;

        // SAFETY: the slot is CLAIMED under our sequence; no other process
        // reads or writes a claimed slot.
        unsafe {
            std::ptr::write(slot.descriptor.get(), *descriptor);
        }
        slot.checksum.store(descriptor.checksum(), Ordering::Relaxed);

        let header = self.header();
        let deadline = Deadline::start(timeout);
        let _guard = header.lock.guard(lock_budget(&deadline))?;
        self.verify_claim(slot, &claim)?;
        slot.state.store(SLOT_COMMITTED, Ordering::Relaxed);
        header.claimed.store(0, Ordering::Relaxed);
        header.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Give up a claimed slot without publishing anything.
    pub fn abandon(&self, claim: SlotClaim, timeout: WaitTimeout) -> Result<(), SharedMemoryError> {
        let slot = self.claimed_slot(&claim)?;
        let deadline = Deadline::start(timeout);
        let header = self.header();
        let _guard = header.lock.guard(lock_budget(&deadline))?;
        self.verify_claim(slot, &claim)?;
        slot.state.store(SLOT_ABANDONED, Ordering::Relaxed);
        header.claimed.store(0, Ordering::Relaxed);
        tracing::debug!(ring = %self.name(), slot = claim.index, "Abandoned claimed slot");
        Ok(())
    }

    /// Claim a slot and commit `descriptor` into it, returning its sequence.
    ///
    /// If the commit cannot take the lock in time the slot is abandoned so
    /// consumers do not stall behind it.
    pub fn push(
        &self,
        descriptor: &BufferDescriptor,
        timeout: WaitTimeout,
    ) -> Result<u64, SharedMemoryError> {
        let deadline = Deadline::start(timeout);
        let claim = self.claim(timeout)?;
        self.commit_or_abandon(claim, descriptor, deadline.remaining())
    }

    fn commit_or_abandon(
        &self,
        claim: SlotClaim,
        descriptor: &BufferDescriptor,
        timeout: WaitTimeout,
    ) -> Result<u64, SharedMemoryError> {
        let retained = SlotClaim {
            index: claim.index,
            sequence: claim.sequence,
        };

        match self.commit(claim, descriptor, timeout) {
            Ok(()) => Ok(retained.sequence),
            Err(e) if e.is_timeout() => {
                let sequence = retained.sequence;
                if let Err(abandon_err) = self.abandon(retained, WaitTimeout::After(ABANDON_WAIT)) {
                    tracing::error!(
                        ring = %self.name(),
                        sequence = sequence,
                        error = %abandon_err,
                        "Failed to abandon claimed slot"
                    );
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Take the descriptor at `tail`, waiting up to `timeout` for one.
    ///
    /// A zero timeout polls once and returns `RingBufferEmpty` when nothing
    /// is ready; a non-zero timeout returns `Timeout` on expiry.
    pub fn try_consume(&self, timeout: WaitTimeout) -> Result<RingEntry, SharedMemoryError> {
        let deadline = Deadline::start(timeout);
        let header = self.header();
        let mut attempt = 0;

        loop {
            self.ensure_live()?;
            {
                let _guard = header.lock.guard(lock_budget(&deadline))?;

                while header.count.load(Ordering::Relaxed) > 0 {
                    let tail = header.tail.load(Ordering::Relaxed);
                    let slot = self.slot(tail);
                    match slot.state.load(Ordering::Relaxed) {
                        SLOT_COMMITTED => {
                            let sequence = slot.sequence.load(Ordering::Relaxed);
                            let expected = slot.checksum.load(Ordering::Relaxed);
                            // SAFETY: committed slots are only read or released
                            // while holding the lock, which we do.
                            let descriptor = unsafe { std::ptr::read(slot.descriptor.get()) };
                            self.release_tail(tail);
                            header.popped.fetch_add(1, Ordering::Relaxed);

                            let actual = descriptor.checksum();
                            if actual != expected {
                                tracing::error!(
                                    ring = %self.name(),
                                    slot = tail,
                                    sequence = sequence,
                                    "Dropping slot with corrupted descriptor"
                                );
                                return Err(SharedMemoryError::ChecksumMismatch {
                                    slot: tail,
                                    expected,
                                    actual,
                                });
                            }

                            return Ok(RingEntry {
                                sequence,
                                descriptor,
                            });
                        }
                        SLOT_ABANDONED => self.release_tail(tail),
                        // Oldest slot is claimed but not yet committed.
                        _ => break,
                    }
                }
            }

            if timeout.is_immediate() {
                return Err(SharedMemoryError::RingBufferEmpty);
            }
            if deadline.expired() {
                return Err(deadline.timeout_error("ring consume"));
            }
            relax(&mut attempt);
        }
    }

    /// Number of occupied (claimed or committed) slots.
    pub fn len(&self, timeout: WaitTimeout) -> Result<u32, SharedMemoryError> {
        let _guard = self.header().lock.guard(timeout)?;
        Ok(self.header().count.load(Ordering::Relaxed))
    }

    /// Copy of the header and slot states, taken under the lock.
    pub fn snapshot(&self, timeout: WaitTimeout) -> Result<RingSnapshot, SharedMemoryError> {
        let header = self.header();
        let _guard = header.lock.guard(timeout)?;

        let slots = (0..self.capacity)
            .map(|index| {
                let slot = self.slot(index);
                let state = SlotState::from_raw(slot.state.load(Ordering::Relaxed));
                // SAFETY: the lock is held, so no slot changes state under us.
                // A claimed slot may be mid-write; only committed contents
                // are reported.
                let frame_id = (state == SlotState::Committed)
                    .then(|| unsafe { (*slot.descriptor.get()).frame_id });
                SlotSnapshot {
                    index,
                    state,
                    sequence: slot.sequence.load(Ordering::Relaxed),
                    frame_id,
                }
            })
            .collect();

        Ok(RingSnapshot {
            name: self.header_name(),
            status: self.status(),
            overflow: self.overflow_policy(),
            capacity: self.capacity,
            head: header.head.load(Ordering::Relaxed),
            tail: header.tail.load(Ordering::Relaxed),
            count: header.count.load(Ordering::Relaxed),
            next_sequence: header.next_sequence.load(Ordering::Relaxed),
            pushed: header.pushed.load(Ordering::Relaxed),
            popped: header.popped.load(Ordering::Relaxed),
            evicted: header.evicted.load(Ordering::Relaxed),
            lock_word: header.lock.raw_state(),
            slots,
        })
    }

    /// Flag the segment as destroyed so peers stop using it.
    pub fn mark_destroyed(&self) {
        self.header()
            .status
            .store(STATUS_DESTROYED, Ordering::Release);
        tracing::debug!(ring = %self.name(), "Shared ring marked destroyed");
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: the region is at least HEADER_SIZE bytes and page aligned;
        // every mutable header field is atomic.
        unsafe { &*(self.region.as_ptr() as *const RingHeader) }
    }

    fn slot(&self, index: u32) -> &RingSlot {
        debug_assert!(index < self.capacity.max(1));
        // SAFETY: index < capacity and segment_size(capacity) <= region size,
        // checked in create/open.
        unsafe {
            &*(self
                .region
                .as_ptr()
                .add(HEADER_SIZE + index as usize * size_of::<RingSlot>())
                as *const RingSlot)
        }
    }

    fn header_name(&self) -> String {
        let raw = &self.header().name;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Claim step of [`SharedRing::claim`]. Lock must be held and no other
    /// claim outstanding. `None` when no slot can be freed right now.
    fn claim_locked(&self, policy: OverflowPolicy) -> Option<SlotClaim> {
        let header = self.header();
        let mut count = header.count.load(Ordering::Relaxed);

        if count == self.capacity {
            let tail = header.tail.load(Ordering::Relaxed);
            let oldest = self.slot(tail);
            match oldest.state.load(Ordering::Relaxed) {
                SLOT_COMMITTED if policy == OverflowPolicy::EvictOldest => {
                    let sequence = oldest.sequence.load(Ordering::Relaxed);
                    self.release_tail(tail);
                    header.evicted.fetch_add(1, Ordering::Relaxed);
                    count -= 1;
                    tracing::debug!(
                        ring = %self.name(),
                        slot = tail,
                        sequence = sequence,
                        "Ring full, evicted oldest unread descriptor"
                    );
                }
                SLOT_ABANDONED => {
                    self.release_tail(tail);
                    count -= 1;
                }
                // Block policy: wait for a consumer.
                _ => {}
            }
        }

        if count < self.capacity {
            let index = header.head.load(Ordering::Relaxed);
            let slot = self.slot(index);
            debug_assert_eq!(slot.state.load(Ordering::Relaxed), SLOT_EMPTY);

            let sequence = header.next_sequence.fetch_add(1, Ordering::Relaxed);
            slot.sequence.store(sequence, Ordering::Relaxed);
            slot.state.store(SLOT_CLAIMED, Ordering::Relaxed);
            header
                .head
                .store((index + 1) % self.capacity, Ordering::Relaxed);
            header.count.store(count + 1, Ordering::Relaxed);
            header.claimed.store(1, Ordering::Relaxed);

            return Some(SlotClaim { index, sequence });
        }

        None
    }

    /// Mark the tail slot empty and advance past it. Lock must be held.
    fn release_tail(&self, tail: u32) {
        let header = self.header();
        self.slot(tail).state.store(SLOT_EMPTY, Ordering::Relaxed);
        header
            .tail
            .store((tail + 1) % self.capacity, Ordering::Relaxed);
        header.count.fetch_sub(1, Ordering::Relaxed);
    }

    fn ensure_live(&self) -> Result<(), SharedMemoryError> {
        match self.status() {
            RingStatus::Initialized => Ok(()),
            other => Err(SharedMemoryError::BadState {
                reason: format!("ring {} is {}", self.name(), other.name()),
            }),
        }
    }

    fn claimed_slot(&self, claim: &SlotClaim) -> Result<&RingSlot, SharedMemoryError> {
        if claim.index >= self.capacity {
            return Err(SharedMemoryError::BadArguments {
                reason: format!(
                    "slot {} out of range for ring {} of capacity {}",
                    claim.index,
                    self.name(),
                    self.capacity
                ),
            });
        }
        let slot = self.slot(claim.index);
        self.verify_claim(slot, claim)?;
        Ok(slot)
    }

    fn verify_claim(&self, slot: &RingSlot, claim: &SlotClaim) -> Result<(), SharedMemoryError> {
        let state = slot.state.load(Ordering::Relaxed);
        let sequence = slot.sequence.load(Ordering::Relaxed);
        if state != SLOT_CLAIMED || sequence != claim.sequence {
            return Err(SharedMemoryError::BadState {
                reason: format!(
                    "slot {} of ring {} is not claimed under sequence {}",
                    claim.index,
                    self.name(),
                    claim.sequence
                ),
            });
        }
        Ok(())
    }
}

/// Lock budget for one critical section inside a bounded ring operation.
fn lock_budget(deadline: &Deadline) -> WaitTimeout {
    match deadline.remaining() {
        WaitTimeout::After(d) => WaitTimeout::After(d.max(MIN_LOCK_WAIT)),
        WaitTimeout::Infinite => WaitTimeout::Infinite,
    }
}

/// Align value up to the given power-of-two alignment.
const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::descriptor::BufferFormat;
    use std::sync::atomic::AtomicUsize;

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> RingName {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        RingName::new(format!("fl-ring-{}-{}-{}", tag, std::process::id(), n)).unwrap()
    }

    struct Fixture {
        ring: SharedRing,
    }

    impl Fixture {
        fn new(tag: &str, depth: u32, overflow: OverflowPolicy) -> Self {
            let name = unique_name(tag);
            let ring = SharedRing::create(&name, QueueDepth::new(depth).unwrap(), overflow)
                .expect("create ring");
            Self { ring }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = SharedMemoryRegion::unlink(self.ring.name());
        }
    }

    fn desc(frame_id: u64) -> BufferDescriptor {
        BufferDescriptor::new("frame", 0x1000 + frame_id, 4096, BufferFormat::Nv12)
            .unwrap()
            .with_frame(frame_id, frame_id * 33_000_000)
    }

    fn push(ring: &SharedRing, frame_id: u64) {
        let claim = ring.claim(WaitTimeout::millis(100)).unwrap();
        ring.commit(claim, &desc(frame_id), WaitTimeout::millis(100))
            .unwrap();
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(0, 8), 0);
    }

    #[test]
    fn test_segment_size_is_page_multiple() {
        let small = SharedRing::segment_size(QueueDepth::default());
        assert_eq!(small, PAGE_SIZE);
        let large = SharedRing::segment_size(QueueDepth::new(1024).unwrap());
        assert_eq!(large % PAGE_SIZE, 0);
        assert!(large >= HEADER_SIZE + 1024 * size_of::<RingSlot>());
    }

    #[test]
    fn test_fifo_within_depth() {
        let fx = Fixture::new("fifo", 4, OverflowPolicy::EvictOldest);
        for id in 0..4 {
            push(&fx.ring, id);
        }
        for id in 0..4 {
            let entry = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
            assert_eq!(entry.descriptor.frame_id, id);
            assert_eq!(entry.sequence, id);
        }
        assert!(matches!(
            fx.ring.try_consume(WaitTimeout::immediate()),
            Err(SharedMemoryError::RingBufferEmpty)
        ));
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let fx = Fixture::new("evict", 2, OverflowPolicy::EvictOldest);
        push(&fx.ring, 1);
        push(&fx.ring, 2);
        push(&fx.ring, 3);

        let first = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
        let second = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
        assert_eq!(first.descriptor.frame_id, 2);
        assert_eq!(second.descriptor.frame_id, 3);
        assert!(fx.ring.try_consume(WaitTimeout::immediate()).is_err());

        let snap = fx.ring.snapshot(WaitTimeout::millis(10)).unwrap();
        assert_eq!(snap.evicted, 1);
        assert_eq!(snap.pushed, 3);
        assert_eq!(snap.popped, 2);
    }

    #[test]
    fn test_block_policy_times_out_when_full() {
        let fx = Fixture::new("block", 1, OverflowPolicy::Block);
        push(&fx.ring, 1);

        let err = fx.ring.claim(WaitTimeout::millis(20)).unwrap_err();
        assert!(err.is_timeout());

        // Nothing was evicted.
        let entry = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
        assert_eq!(entry.descriptor.frame_id, 1);
    }

    #[test]
    fn test_consume_timeout_on_empty() {
        let fx = Fixture::new("empty", 2, OverflowPolicy::EvictOldest);
        let start = std::time::Instant::now();
        let err = fx.ring.try_consume(WaitTimeout::millis(30)).unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_claimed_slot_is_not_consumed_or_evicted() {
        let fx = Fixture::new("claimed", 1, OverflowPolicy::EvictOldest);
        let claim = fx.ring.claim(WaitTimeout::millis(10)).unwrap();

        // Consumer cannot see an uncommitted slot.
        assert!(fx.ring.try_consume(WaitTimeout::immediate()).is_err());
        // A second producer waits for the outstanding claim.
        assert!(fx.ring.claim(WaitTimeout::millis(10)).unwrap_err().is_timeout());

        fx.ring
            .commit(claim, &desc(7), WaitTimeout::millis(10))
            .unwrap();
        let entry = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
        assert_eq!(entry.descriptor.frame_id, 7);
    }

    #[test]
    fn test_abandoned_slot_is_skipped() {
        let fx = Fixture::new("abandon", 3, OverflowPolicy::EvictOldest);
        let claim = fx.ring.claim(WaitTimeout::millis(10)).unwrap();
        fx.ring.abandon(claim, WaitTimeout::millis(10)).unwrap();
        push(&fx.ring, 2);

        let entry = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
        assert_eq!(entry.descriptor.frame_id, 2);
        assert_eq!(fx.ring.len(WaitTimeout::millis(10)).unwrap(), 0);
    }

    #[test]
    fn test_single_outstanding_claim() {
        let fx = Fixture::new("single", 4, OverflowPolicy::EvictOldest);
        let first = fx.ring.claim(WaitTimeout::millis(10)).unwrap();

        // Free slots remain, but only one claim may be held per ring.
        assert!(fx.ring.claim(WaitTimeout::millis(10)).unwrap_err().is_timeout());
        let snap = fx.ring.snapshot(WaitTimeout::millis(10)).unwrap();
        let claimed = snap
            .slots
            .iter()
            .filter(|slot| slot.state == SlotState::Claimed)
            .count();
        assert_eq!(claimed, 1);
        assert_eq!(snap.count, 1);

        fx.ring
            .commit(first, &desc(1), WaitTimeout::millis(10))
            .unwrap();
        let second = fx.ring.claim(WaitTimeout::millis(10)).unwrap();
        assert_eq!(second.sequence(), 1);
        fx.ring.abandon(second, WaitTimeout::millis(10)).unwrap();
        let third = fx.ring.claim(WaitTimeout::millis(10)).unwrap();
        assert_eq!(third.sequence(), 2);
        fx.ring
            .commit(third, &desc(3), WaitTimeout::millis(10))
            .unwrap();
    }

    #[test]
    fn test_claim_waits_for_other_producer() {
        let fx = Fixture::new("handoff", 4, OverflowPolicy::EvictOldest);
        let claim = fx.ring.claim(WaitTimeout::millis(10)).unwrap();

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| fx.ring.claim(WaitTimeout::millis(1_000)));
            std::thread::sleep(Duration::from_millis(20));
            fx.ring
                .commit(claim, &desc(1), WaitTimeout::millis(10))
                .unwrap();

            let next = waiter.join().unwrap().unwrap();
            assert_eq!(next.sequence(), 1);
            fx.ring
                .commit(next, &desc(2), WaitTimeout::millis(10))
                .unwrap();
        });

        for id in 1..=2 {
            let entry = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
            assert_eq!(entry.descriptor.frame_id, id);
        }
    }

    #[test]
    fn test_stalled_commit_abandons_slot() {
        let fx = Fixture::new("stalled", 4, OverflowPolicy::EvictOldest);
        let claim = fx.ring.claim(WaitTimeout::millis(10)).unwrap();
        let locked = std::sync::Barrier::new(2);

        std::thread::scope(|scope| {
            // Another party sits on the header lock past the commit budget
            // but within the abandon budget.
            scope.spawn(|| {
                fx.ring.header().lock.lock(WaitTimeout::Infinite).unwrap();
                locked.wait();
                std::thread::sleep(Duration::from_millis(20));
                fx.ring.header().lock.unlock();
            });
            locked.wait();

            let err = fx
                .ring
                .commit_or_abandon(claim, &desc(1), WaitTimeout::millis(5))
                .unwrap_err();
            assert!(err.is_timeout());
        });

        let snap = fx.ring.snapshot(WaitTimeout::millis(10)).unwrap();
        assert_eq!(snap.slots[0].state, SlotState::Abandoned);
        assert_eq!(snap.pushed, 0);

        // Consumers skip the abandoned slot and producers can claim again.
        assert!(matches!(
            fx.ring.try_consume(WaitTimeout::immediate()),
            Err(SharedMemoryError::RingBufferEmpty)
        ));
        assert_eq!(fx.ring.len(WaitTimeout::millis(10)).unwrap(), 0);
        push(&fx.ring, 2);
        let entry = fx.ring.try_consume(WaitTimeout::millis(10)).unwrap();
        assert_eq!(entry.descriptor.frame_id, 2);
    }

    #[test]
    fn test_commit_twice_is_bad_state() {
        let fx = Fixture::new("twice", 2, OverflowPolicy::EvictOldest);
        let claim = fx.ring.claim(WaitTimeout::millis(10)).unwrap();
        let forged = SlotClaim {
            index: claim.index(),
            sequence: claim.sequence(),
        };
        fx.ring
            .commit(claim, &desc(1), WaitTimeout::millis(10))
            .unwrap();
        assert!(matches!(
            fx.ring.commit(forged, &desc(1), WaitTimeout::millis(10)),
            Err(SharedMemoryError::BadState { .. })
        ));
    }

    #[test]
    fn test_corrupted_slot_is_rejected() {
        let fx = Fixture::new("crc", 2, OverflowPolicy::EvictOldest);
        push(&fx.ring, 1);
        fx.ring
            .slot(0)
            .checksum
            .fetch_xor(0xffff_ffff, Ordering::Relaxed);

        assert!(matches!(
            fx.ring.try_consume(WaitTimeout::millis(10)),
            Err(SharedMemoryError::ChecksumMismatch { slot: 0, .. })
        ));
        // The corrupted slot was dropped, not left blocking the ring.
        assert_eq!(fx.ring.len(WaitTimeout::millis(10)).unwrap(), 0);
    }

    #[test]
    fn test_open_sees_same_ring() {
        let fx = Fixture::new("open", 8, OverflowPolicy::Block);
        let name = RingName::new(fx.ring.name()).unwrap();
        let peer = SharedRing::open(&name).unwrap();
        assert_eq!(peer.capacity(), 8);
        assert_eq!(peer.overflow_policy(), OverflowPolicy::Block);

        push(&fx.ring, 11);
        let entry = peer.try_consume(WaitTimeout::millis(10)).unwrap();
        assert_eq!(entry.descriptor.frame_id, 11);

        let snap = peer.snapshot(WaitTimeout::millis(10)).unwrap();
        assert_eq!(snap.name, fx.ring.name());
        assert_eq!(snap.status, RingStatus::Initialized);
    }

    #[test]
    fn test_destroyed_ring_is_bad_state() {
        let fx = Fixture::new("destroyed", 2, OverflowPolicy::EvictOldest);
        fx.ring.mark_destroyed();
        assert!(matches!(
            fx.ring.claim(WaitTimeout::millis(10)),
            Err(SharedMemoryError::BadState { .. })
        ));
        assert!(matches!(
            fx.ring.try_consume(WaitTimeout::millis(10)),
            Err(SharedMemoryError::BadState { .. })
        ));
    }
}
