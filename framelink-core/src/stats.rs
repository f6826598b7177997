// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Point-in-time statistics for rings and synchronizers.
//!
//! Everything here is serializable so the CLI can print it as JSON.

use serde::{Deserialize, Serialize};

use crate::shm::{OverflowPolicy, RingStatus, SlotState};

/// Copy of a ring header taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSnapshot {
    pub name: String,
    pub status: RingStatus,
    pub overflow: OverflowPolicy,
    pub capacity: u32,
    pub head: u32,
    pub tail: u32,
    pub count: u32,
    pub next_sequence: u64,
    pub pushed: u64,
    pub popped: u64,
    pub evicted: u64,
    /// Raw lock word at the time of the snapshot (the snapshot itself holds
    /// the lock, so this is always the locked value).
    pub lock_word: u32,
    pub slots: Vec<SlotSnapshot>,
}

impl RingSnapshot {
    /// Descriptors committed but not yet consumed.
    pub fn ready(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Committed)
            .count()
    }
}

/// State of one ring slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub index: u32,
    pub state: SlotState,
    pub sequence: u64,
    /// Frame id of the stored descriptor, for committed slots only.
    pub frame_id: Option<u64>,
}

/// Counters kept by a running frame synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Frames taken off input subscriptions.
    pub frames_received: u64,
    /// Frames replaced by a later frame from the same channel in one window.
    pub frames_superseded: u64,
    /// Windows emitted with every channel present.
    pub windows_complete: u64,
    /// Windows emitted with at least one empty slot.
    pub windows_partial: u64,
    /// Windows dropped without emission.
    pub windows_discarded: u64,
    /// Emissions that reached no output subscriber.
    pub undelivered: u64,
}

impl SyncStats {
    pub fn windows_emitted(&self) -> u64 {
        self.windows_complete + self.windows_partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_stats_emitted() {
        let stats = SyncStats {
            windows_complete: 3,
            windows_partial: 2,
            ..Default::default()
        };
        assert_eq!(stats.windows_emitted(), 5);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = RingSnapshot {
            name: "cam0".to_string(),
            status: RingStatus::Initialized,
            overflow: OverflowPolicy::EvictOldest,
            capacity: 2,
            head: 1,
            tail: 0,
            count: 1,
            next_sequence: 1,
            pushed: 1,
            popped: 0,
            evicted: 0,
            lock_word: 1,
            slots: vec![
                SlotSnapshot {
                    index: 0,
                    state: SlotState::Committed,
                    sequence: 0,
                    frame_id: Some(9),
                },
                SlotSnapshot {
                    index: 1,
                    state: SlotState::Empty,
                    sequence: 0,
                    frame_id: None,
                },
            ],
        };
        assert_eq!(snap.ready(), 1);

        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"overflow\":\"evict_oldest\""));
        assert!(json.contains("\"frame_id\":9"));
    }
}
