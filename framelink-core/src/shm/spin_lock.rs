// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process-shared spin lock over a single 32-bit word.
//!
//! The lock lives directly inside a shared memory segment, so any process
//! that maps the segment can take it. There is no owner identity: the lock
//! is not reentrant, and unlocking a lock you do not hold is a contract
//! violation that goes undetected.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Instant;

use crate::error::SharedMemoryError;
use crate::types::WaitTimeout;

/// Raw value of an unlocked spin lock.
pub const UNLOCKED: u32 = 0;
/// Raw value of a held spin lock.
pub const LOCKED: u32 = 1;

/// Busy-spin iterations before yielding the processor.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Spin lock that can be placed in shared memory.
///
/// `#[repr(transparent)]` over an `AtomicU32` so its layout is a plain word
/// inside a `#[repr(C)]` header.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct SpinLock {
    state: AtomicU32,
}

impl SpinLock {
    /// Create an unlocked spin lock (for in-process use).
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Reset to `UNLOCKED`.
    ///
    /// Must run exactly once per segment, by the creating process, before
    /// any other process issues `lock`/`unlock`.
    pub fn init(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    /// Single acquisition attempt.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire the lock, spinning until it is free or `timeout` elapses.
    ///
    /// Never blocks forever unless `WaitTimeout::Infinite` is passed.
    pub fn lock(&self, timeout: WaitTimeout) -> Result<(), SharedMemoryError> {
        if self.try_lock() {
            return Ok(());
        }

        let deadline = Deadline::start(timeout);
        loop {
            // Spin on a plain load so waiters do not bounce the cache line.
            let mut spins = 0u32;
            while self.state.load(Ordering::Relaxed) != UNLOCKED {
                if deadline.expired() {
                    return Err(deadline.timeout_error("spin lock"));
                }
                if spins < SPINS_BEFORE_YIELD {
                    hint::spin_loop();
                    spins += 1;
                } else {
                    thread::yield_now();
                }
            }

            if self.try_lock() {
                return Ok(());
            }

            if deadline.expired() {
                return Err(deadline.timeout_error("spin lock"));
            }
        }
    }

    /// Release the lock.
    #[inline]
    pub fn unlock(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    /// Acquire the lock and release it when the guard drops.
    pub fn guard(&self, timeout: WaitTimeout) -> Result<SpinLockGuard<'_>, SharedMemoryError> {
        self.lock(timeout)?;
        Ok(SpinLockGuard { lock: self })
    }

    /// Whether the lock is currently held by anyone.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }

    /// Raw lock word, for inspection tooling.
    pub fn raw_state(&self) -> u32 {
        self.state.load(Ordering::Relaxed)
    }
}

/// Releases its [`SpinLock`] on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Deadline tracking shared by every bounded wait on a ring.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn start(timeout: WaitTimeout) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: timeout.deadline_from(started),
        }
    }

    pub(crate) fn expired(&self) -> bool {
        matches!(self.at, Some(at) if Instant::now() >= at)
    }

    /// Time left as a timeout for a nested wait.
    pub(crate) fn remaining(&self) -> WaitTimeout {
        match self.at {
            None => WaitTimeout::Infinite,
            Some(at) => WaitTimeout::After(at.saturating_duration_since(Instant::now())),
        }
    }

    pub(crate) fn timeout_error(&self, operation: &'static str) -> SharedMemoryError {
        SharedMemoryError::Timeout {
            operation,
            waited_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Back off between retries of a ring operation that found nothing to do.
pub(crate) fn relax(attempt: &mut u32) {
    if *attempt < SPINS_BEFORE_YIELD {
        hint::spin_loop();
        *attempt += 1;
    } else {
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_lock_unlock() {
        let lock = SpinLock::new();
        assert!(!lock.is_locked());

        lock.lock(WaitTimeout::millis(10)).unwrap();
        assert!(lock.is_locked());
        assert_eq!(lock.raw_state(), LOCKED);
        assert!(!lock.try_lock());

        lock.unlock();
        assert!(!lock.is_locked());
        assert!(lock.try_lock());
    }

    #[test]
    fn test_init_resets_state() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        lock.init();
        assert_eq!(lock.raw_state(), UNLOCKED);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = SpinLock::new();
        {
            let _guard = lock.guard(WaitTimeout::Infinite).unwrap();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_timeout_against_held_lock() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());

        let start = Instant::now();
        let err = lock.lock(WaitTimeout::millis(50)).unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(1000), "took {:?}", elapsed);
    }

    #[test]
    fn test_immediate_timeout() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        assert!(lock.lock(WaitTimeout::immediate()).unwrap_err().is_timeout());
    }

    #[test]
    fn test_infinite_wait_acquires_after_release() {
        let lock = Arc::new(SpinLock::new());
        assert!(lock.try_lock());

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.lock(WaitTimeout::Infinite).unwrap();
                lock.unlock();
            })
        };

        thread::sleep(Duration::from_millis(20));
        lock.unlock();
        waiter.join().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        const THREADS: u64 = 8;
        const ITERATIONS: u64 = 10_000;

        let lock = Arc::new(SpinLock::new());
        // Non-atomic read-modify-write: lost updates would show up if two
        // threads were ever inside the critical section together.
        let counter = Arc::new(AtomicU64::new(0));
        let acquired = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                let acquired = Arc::clone(&acquired);
                thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        if lock.lock(WaitTimeout::millis(5_000)).is_ok() {
                            let value = counter.load(Ordering::Relaxed);
                            counter.store(value + 1, Ordering::Relaxed);
                            lock.unlock();
                            acquired.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            counter.load(Ordering::Relaxed),
            acquired.load(Ordering::Relaxed)
        );
        assert_eq!(acquired.load(Ordering::Relaxed), THREADS * ITERATIONS);
    }
}
