// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `framelink subscribe` command - Pop and print descriptors from a ring.

use std::sync::atomic::Ordering;

use framelink_core::{RingName, SharedMemoryError, SharedSubscriber, WaitTimeout};

use super::run_until_ctrl_c;

pub async fn execute(
    ring: &str,
    timeout_ms: u32,
    count: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = RingName::new(ring)?;
    let subscriber = SharedSubscriber::attach(&name)?;
    let timeout = WaitTimeout::millis(timeout_ms);

    println!("▶ Subscribed to ring {} (timeout: {})", name, timeout);

    let received = run_until_ctrl_c(move |stop| -> Result<u64, SharedMemoryError> {
        let mut received = 0u64;
        while !stop.load(Ordering::Relaxed) && (count == 0 || received < count) {
            match subscriber.pop_entry(timeout) {
                Ok(entry) => {
                    received += 1;
                    println!("  #{:<6} {}", entry.sequence, entry.descriptor);
                }
                Err(e) if e.is_timeout() || matches!(e, SharedMemoryError::RingBufferEmpty) => {
                    tracing::debug!(ring = %subscriber.name(), "No frame within timeout");
                }
                Err(e @ SharedMemoryError::ChecksumMismatch { .. }) => {
                    tracing::warn!(error = %e, "Skipped corrupted slot");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(received)
    })
    .await??;

    println!("✓ Received {} frames", received);
    Ok(())
}
