// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Multi-stream frame synchronization.
//!
//! Frames arrive per channel on a [`LocalBus`]; a [`FrameSynchronizer`]
//! groups them into windows and publishes one [`FrameSet`] per window.

mod bus;
mod synchronizer;
mod window;

pub use bus::{LocalBus, Subscription, TopicPublisher, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use synchronizer::{FrameSynchronizer, SyncHandle};
pub use window::{
    AlignmentStrategy, FrameSet, SyncWindow, WindowAligner, WindowState, MAX_WINDOW_SPAN,
};
