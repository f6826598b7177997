// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Window alignment of frames from several channels.
//!
//! The aligner is a plain state machine driven by `(channel, frame, now)`
//! events and deadline ticks. It owns no threads or clocks, so the
//! synchronizer thread and the tests drive it the same way.
//!
//! ```text
//!            first frame           all channels in, or now - t0 >= window
//!   (none) ─────────────▶ Open ──────────────────────────────────────▶ Resolving
//!                                                                         │
//!                                            frames present ┌─────────────┴──────────┐ no frames / shutdown
//!                                                           ▼                        ▼
//!                                                        Emitted                 Discarded
//! ```

use std::time::{Duration, Instant};

use crate::stats::SyncStats;
use crate::types::Permutation;

/// Lifecycle of one synchronization window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    Resolving,
    Emitted,
    Discarded,
}

/// Longest window an aligner will wait before resolving.
pub const MAX_WINDOW_SPAN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How frames are grouped into sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentStrategy {
    /// Group frames arriving within `span` of the first one.
    Window { span: Duration },
}

impl AlignmentStrategy {
    pub fn window(span: Duration) -> Self {
        Self::Window { span }
    }

    /// Configuration name of the strategy.
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Window { .. } => "window",
        }
    }

    /// Spans past [`MAX_WINDOW_SPAN`] are clamped to it.
    fn deadline(&self, opened_at: Instant) -> Instant {
        match self {
            Self::Window { span } => opened_at
                .checked_add((*span).min(MAX_WINDOW_SPAN))
                .unwrap_or(opened_at),
        }
    }
}

/// A resolved set of frames, one output slot per channel.
///
/// Slot `permutation[c]` holds channel `c`'s frame, or `None` if that
/// channel sent nothing during the window.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet<F> {
    /// Emission order, starting at 0.
    pub sequence: u64,
    pub opened_at: Instant,
    pub slots: Vec<Option<F>>,
}

impl<F> FrameSet<F> {
    /// Slots that hold a frame.
    pub fn present(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.present() == self.slots.len()
    }
}

/// Frames collected for one window, indexed by channel.
#[derive(Debug)]
pub struct SyncWindow<F> {
    opened_at: Instant,
    deadline: Instant,
    state: WindowState,
    frames: Vec<Option<F>>,
    received: usize,
}

impl<F> SyncWindow<F> {
    fn open(channel_count: usize, opened_at: Instant, deadline: Instant) -> Self {
        Self {
            opened_at,
            deadline,
            state: WindowState::Open,
            frames: std::iter::repeat_with(|| None).take(channel_count).collect(),
            received: 0,
        }
    }

    /// Store a channel's frame. Returns true if it replaced an earlier one.
    fn insert(&mut self, channel: usize, frame: F) -> bool {
        let previous = self.frames[channel].replace(frame);
        if previous.is_none() {
            self.received += 1;
        }
        previous.is_some()
    }

    fn is_full(&self) -> bool {
        self.received == self.frames.len()
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Channels that have contributed so far.
    pub fn received(&self) -> usize {
        self.received
    }
}

/// Groups per-channel frames into [`FrameSet`]s.
pub struct WindowAligner<F> {
    strategy: AlignmentStrategy,
    permutation: Permutation,
    current: Option<SyncWindow<F>>,
    next_sequence: u64,
    stats: SyncStats,
}

impl<F> WindowAligner<F> {
    pub fn new(strategy: AlignmentStrategy, permutation: Permutation) -> Self {
        Self {
            strategy,
            permutation,
            current: None,
            next_sequence: 0,
            stats: SyncStats::default(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.permutation.len()
    }

    pub fn strategy(&self) -> AlignmentStrategy {
        self.strategy
    }

    /// The window being filled, if any.
    pub fn current(&self) -> Option<&SyncWindow<F>> {
        self.current.as_ref()
    }

    /// When the open window must resolve, if one is open.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|w| w.deadline)
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Count an emission that reached no output subscriber.
    pub fn record_undelivered(&mut self) {
        self.stats.undelivered += 1;
    }

    /// Accept a frame from `channel` received at `now`.
    ///
    /// An open window whose deadline has passed is resolved before the frame
    /// is placed, so the frame always lands in a fresh window. Returns the
    /// sets emitted as a result, oldest first.
    pub fn on_frame(&mut self, channel: usize, frame: F, now: Instant) -> Vec<FrameSet<F>> {
        let mut emitted = Vec::new();
        if channel >= self.channel_count() {
            tracing::warn!(
                channel = channel,
                channels = self.channel_count(),
                "Ignoring frame from unknown channel"
            );
            return emitted;
        }
        self.stats.frames_received += 1;

        if let Some(set) = self.on_tick(now) {
            emitted.push(set);
        }

        let channel_count = self.channel_count();
        let strategy = self.strategy;
        let window = self.current.get_or_insert_with(|| {
            tracing::trace!(channel = channel, "Window opened");
            SyncWindow::open(channel_count, now, strategy.deadline(now))
        });

        if window.insert(channel, frame) {
            self.stats.frames_superseded += 1;
            tracing::debug!(channel = channel, "Frame superseded within window");
        }

        if window.is_full() {
            if let Some(set) = self.resolve() {
                emitted.push(set);
            }
        }

        emitted
    }

    /// Resolve the open window if its deadline has passed.
    pub fn on_tick(&mut self, now: Instant) -> Option<FrameSet<F>> {
        match &self.current {
            Some(window) if now >= window.deadline => self.resolve(),
            _ => None,
        }
    }

    /// Drop the open window without emitting it.
    pub fn shutdown(&mut self) {
        if let Some(mut window) = self.current.take() {
            window.state = WindowState::Discarded;
            self.stats.windows_discarded += 1;
            tracing::debug!(
                received = window.received,
                "Discarded open window on shutdown"
            );
        }
    }

    fn resolve(&mut self) -> Option<FrameSet<F>> {
        let mut window = self.current.take()?;
        window.state = WindowState::Resolving;

        if window.received == 0 {
            window.state = WindowState::Discarded;
            self.stats.windows_discarded += 1;
            return None;
        }

        let mut slots: Vec<Option<F>> = std::iter::repeat_with(|| None)
            .take(window.frames.len())
            .collect();
        for (channel, frame) in window.frames.iter_mut().enumerate() {
            slots[self.permutation.slot_for(channel)] = frame.take();
        }

        let complete = window.received == slots.len();
        if complete {
            self.stats.windows_complete += 1;
        } else {
            self.stats.windows_partial += 1;
        }
        window.state = WindowState::Emitted;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        tracing::trace!(
            sequence = sequence,
            received = window.received,
            complete = complete,
            "Window emitted"
        );

        Some(FrameSet {
            sequence,
            opened_at: window.opened_at,
            slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn aligner(span_ms: u64, perm: Vec<u32>) -> WindowAligner<&'static str> {
        let n = perm.len() as u32;
        WindowAligner::new(
            AlignmentStrategy::window(ms(span_ms)),
            Permutation::new(perm, n).unwrap(),
        )
    }

    #[test]
    fn test_partial_window_on_deadline() {
        let t0 = Instant::now();
        let mut sync = aligner(50, vec![2, 0, 1]);

        assert!(sync.on_frame(0, "A", t0).is_empty());
        assert_eq!(sync.current().unwrap().state(), WindowState::Open);
        assert!(sync.on_frame(1, "B", t0 + ms(10)).is_empty());
        assert!(sync.on_tick(t0 + ms(49)).is_none());

        let set = sync.on_tick(t0 + ms(50)).expect("window resolves at deadline");
        assert_eq!(set.sequence, 0);
        assert_eq!(set.slots, vec![Some("B"), None, Some("A")]);
        assert!(!set.is_complete());

        // C arrives after the deadline and opens the next window.
        assert!(sync.on_frame(2, "C", t0 + ms(60)).is_empty());
        let window = sync.current().unwrap();
        assert_eq!(window.opened_at(), t0 + ms(60));
        assert_eq!(window.received(), 1);

        let stats = sync.stats();
        assert_eq!(stats.windows_partial, 1);
        assert_eq!(stats.frames_received, 3);
    }

    #[test]
    fn test_late_frame_resolves_expired_window_first() {
        let t0 = Instant::now();
        let mut sync = aligner(50, vec![2, 0, 1]);

        sync.on_frame(0, "A", t0);
        sync.on_frame(1, "B", t0 + ms(10));
        // No tick happened; the late frame must not join the expired window.
        let emitted = sync.on_frame(2, "C", t0 + ms(60));

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].slots, vec![Some("B"), None, Some("A")]);
        assert_eq!(sync.current().unwrap().received(), 1);
    }

    #[test]
    fn test_full_window_emits_immediately() {
        let t0 = Instant::now();
        let mut sync = aligner(50, vec![2, 0, 1]);

        assert!(sync.on_frame(0, "A", t0).is_empty());
        assert!(sync.on_frame(1, "B", t0 + ms(2)).is_empty());
        let emitted = sync.on_frame(2, "C", t0 + ms(4));

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].slots, vec![Some("B"), Some("C"), Some("A")]);
        assert!(emitted[0].is_complete());
        assert!(sync.current().is_none());
        assert!(sync.next_deadline().is_none());
        assert_eq!(sync.stats().windows_complete, 1);
    }

    #[test]
    fn test_last_writer_wins() {
        let t0 = Instant::now();
        let mut sync = aligner(50, vec![0, 1]);

        sync.on_frame(0, "first", t0);
        sync.on_frame(0, "second", t0 + ms(5));
        let emitted = sync.on_frame(1, "other", t0 + ms(6));

        assert_eq!(emitted[0].slots, vec![Some("second"), Some("other")]);
        assert_eq!(sync.stats().frames_superseded, 1);
    }

    #[test]
    fn test_windows_emit_in_order() {
        let t0 = Instant::now();
        let mut sync = aligner(10, vec![0, 1]);
        let mut sequences = Vec::new();

        for i in 0..5u64 {
            let at = t0 + ms(i * 20);
            sequences.extend(sync.on_frame(0, "x", at).into_iter().map(|s| s.sequence));
            if let Some(set) = sync.on_tick(at + ms(10)) {
                sequences.push(set.sequence);
            }
        }

        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shutdown_discards_open_window() {
        let t0 = Instant::now();
        let mut sync = aligner(50, vec![0, 1]);
        sync.on_frame(0, "A", t0);
        sync.shutdown();

        assert!(sync.current().is_none());
        assert!(sync.on_tick(t0 + ms(100)).is_none());
        let stats = sync.stats();
        assert_eq!(stats.windows_discarded, 1);
        assert_eq!(stats.windows_emitted(), 0);
    }

    #[test]
    fn test_unknown_channel_is_ignored() {
        let mut sync = aligner(50, vec![0, 1]);
        assert!(sync.on_frame(5, "?", Instant::now()).is_empty());
        assert!(sync.current().is_none());
        assert_eq!(sync.stats().frames_received, 0);
    }

    #[test]
    fn test_strategy_mode() {
        assert_eq!(AlignmentStrategy::window(ms(1)).mode(), "window");
    }

    #[test]
    fn test_unbounded_span_is_clamped() {
        let t0 = Instant::now();
        let mut sync = WindowAligner::new(
            AlignmentStrategy::window(Duration::MAX),
            Permutation::identity(2),
        );
        assert!(sync.on_frame(0, "A", t0).is_empty());

        let deadline = sync.next_deadline().unwrap();
        assert!(deadline > t0 + Duration::from_secs(3600));
        assert!(sync.on_tick(t0 + Duration::from_secs(3600)).is_none());

        let sets = sync.on_frame(1, "B", t0 + ms(1));
        assert_eq!(sets.len(), 1);
        assert!(sets[0].is_complete());
    }
}
