// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `framelink inspect` command - Dump ring header and slot states.

use framelink_core::shm::SlotState;
use framelink_core::{RingName, RingSnapshot, SharedRing, WaitTimeout};

/// How long to wait for the ring lock before giving up.
const INSPECT_LOCK_TIMEOUT_MS: u32 = 100;

pub async fn execute(ring: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let name = RingName::new(ring)?;
    let snapshot = tokio::task::spawn_blocking(move || {
        SharedRing::open(&name)?.snapshot(WaitTimeout::millis(INSPECT_LOCK_TIMEOUT_MS))
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &RingSnapshot) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ RING {:<56}║", snapshot.name);
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("  Status:         {}", snapshot.status.name());
    println!("  Overflow:       {}", snapshot.overflow.name());
    println!("  Capacity:       {}", snapshot.capacity);
    println!("  Head / Tail:    {} / {}", snapshot.head, snapshot.tail);
    println!("  Occupied:       {} ({} ready)", snapshot.count, snapshot.ready());
    println!("  Next Sequence:  {}", snapshot.next_sequence);
    println!(
        "  Pushed / Popped / Evicted: {} / {} / {}",
        snapshot.pushed, snapshot.popped, snapshot.evicted
    );
    println!();
    println!("  Slot  State       Sequence  Frame");
    for slot in &snapshot.slots {
        let state = match slot.state {
            SlotState::Empty => "empty",
            SlotState::Claimed => "claimed",
            SlotState::Committed => "committed",
            SlotState::Abandoned => "abandoned",
        };
        let frame = slot
            .frame_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = match (slot.index == snapshot.head, slot.index == snapshot.tail) {
            (true, true) => " <- head, tail",
            (true, false) => " <- head",
            (false, true) => " <- tail",
            (false, false) => "",
        };
        println!(
            "  {:<5} {:<11} {:<9} {}{}",
            slot.index, state, slot.sequence, frame, marker
        );
    }
}
