// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `framelink publish` command - Push synthetic descriptors into a ring.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use framelink_core::{OverflowPolicy, QueueDepth, RingName, SharedPublisher, WaitTimeout};

use super::{run_until_ctrl_c, synthetic_frame};

pub struct PublishArgs {
    pub ring: String,
    pub depth: u32,
    pub block: bool,
    pub count: u64,
    pub interval_ms: u64,
    pub timeout_ms: u32,
}

pub async fn execute(args: PublishArgs) -> Result<(), Box<dyn std::error::Error>> {
    let name = RingName::new(args.ring)?;
    let depth = QueueDepth::new(args.depth)?;
    let overflow = if args.block {
        OverflowPolicy::Block
    } else {
        OverflowPolicy::EvictOldest
    };

    let publisher = SharedPublisher::attach_with(&name, depth, overflow)?;
    println!(
        "▶ Publishing to ring {} (depth: {}, overflow: {}, {})",
        name,
        depth,
        overflow.name(),
        if publisher.is_creator() {
            "created"
        } else {
            "joined"
        }
    );

    let timeout = WaitTimeout::millis(args.timeout_ms);
    let interval = Duration::from_millis(args.interval_ms);
    let count = args.count;

    let (published, failed) = run_until_ctrl_c(move |stop| {
        let mut published = 0u64;
        let mut failed = 0u64;
        let mut frame_id = 0u64;

        while !stop.load(Ordering::Relaxed) && (count == 0 || frame_id < count) {
            let pushed = synthetic_frame("synthetic", frame_id)
                .and_then(|desc| publisher.push(&desc, timeout));
            match pushed {
                Ok(sequence) => {
                    published += 1;
                    tracing::debug!(frame_id = frame_id, sequence = sequence, "Published frame");
                }
                Err(e) if e.is_timeout() => {
                    failed += 1;
                    tracing::warn!(frame_id = frame_id, error = %e, "Push timed out");
                }
                Err(e) => {
                    tracing::error!(frame_id = frame_id, error = %e, "Push failed");
                    failed += 1;
                    break;
                }
            }
            frame_id += 1;
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        (published, failed)
    })
    .await?;

    println!("✓ Published {} frames ({} failed)", published, failed);
    Ok(())
}
