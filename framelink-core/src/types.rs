// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Longest ring name that fits the name field of a ring header.
pub const MAX_RING_NAME_LEN: usize = 63;

/// Smallest allowed queue depth.
pub const MIN_QUEUE_DEPTH: u32 = 1;
/// Largest allowed queue depth.
pub const MAX_QUEUE_DEPTH: u32 = 1024;
/// Queue depth used when none is configured.
pub const DEFAULT_QUEUE_DEPTH: u32 = 2;

/// Validated shared ring name.
/// Must be non-empty, at most 63 bytes, `[A-Za-z0-9._-]` only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RingName(String);

impl RingName {
    /// Create a new RingName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "ring_name",
                value: name,
                reason: "Ring name cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_RING_NAME_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "ring_name",
                value: name.clone(),
                reason: format!(
                    "Ring name too long: {} bytes (max {})",
                    name.len(),
                    MAX_RING_NAME_LEN
                ),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "ring_name",
                value: name,
                reason: "Ring name must contain only ASCII alphanumerics, '.', '-' and '_'"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Derive a ring name from a topic path such as `/sensor/camera/CAM0/raw`.
    ///
    /// Path separators become underscores so the result is a flat segment name.
    pub fn from_topic(topic: &str) -> Result<Self, HardValidationError> {
        Self::new(topic.replace('/', "_"))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RingName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RingName> for String {
    fn from(name: RingName) -> Self {
        name.0
    }
}

/// Validated ring capacity in slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct QueueDepth(u32);

impl QueueDepth {
    /// Create a new QueueDepth with bounds validation.
    pub fn new(depth: u32) -> Result<Self, HardValidationError> {
        if !(MIN_QUEUE_DEPTH..=MAX_QUEUE_DEPTH).contains(&depth) {
            return Err(HardValidationError::QueueDepthOutOfBounds {
                depth,
                min: MIN_QUEUE_DEPTH,
                max: MAX_QUEUE_DEPTH,
            });
        }
        Ok(Self(depth))
    }

    /// Get the depth value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Default for QueueDepth {
    fn default() -> Self {
        Self(DEFAULT_QUEUE_DEPTH)
    }
}

impl fmt::Display for QueueDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for QueueDepth {
    type Error = HardValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueDepth> for u32 {
    fn from(depth: QueueDepth) -> Self {
        depth.0
    }
}

/// Upper bound on how long a blocking shared-memory call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitTimeout {
    /// Wait until the operation succeeds.
    Infinite,
    /// Give up once the duration has elapsed.
    After(Duration),
}

impl WaitTimeout {
    /// Millisecond value that maps to [`WaitTimeout::Infinite`].
    pub const INFINITE_MS: u32 = u32::MAX;

    /// Build a timeout from milliseconds; `u32::MAX` means infinite.
    pub fn millis(ms: u32) -> Self {
        if ms == Self::INFINITE_MS {
            Self::Infinite
        } else {
            Self::After(Duration::from_millis(u64::from(ms)))
        }
    }

    /// Single attempt, no waiting.
    pub const fn immediate() -> Self {
        Self::After(Duration::ZERO)
    }

    /// Whether this timeout permits no waiting at all.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::After(d) if d.is_zero())
    }

    /// Absolute deadline measured from `start`, `None` when infinite.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::After(d) => Some(start + *d),
        }
    }
}

impl From<Duration> for WaitTimeout {
    fn from(d: Duration) -> Self {
        Self::After(d)
    }
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => write!(f, "infinite"),
            Self::After(d) => write!(f, "{}ms", d.as_millis()),
        }
    }
}

/// Validated channel-to-output-slot mapping.
///
/// Entry `c` is the output slot that receives channel `c`'s frame.
/// Always a bijection over `0..len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation(Vec<u32>);

impl Permutation {
    /// Identity mapping over `channel_count` channels.
    pub fn identity(channel_count: u32) -> Self {
        Self((0..channel_count).collect())
    }

    /// Create a permutation, checking that it is a bijection over `0..channel_count`.
    pub fn new(slots: Vec<u32>, channel_count: u32) -> Result<Self, HardValidationError> {
        if slots.len() != channel_count as usize {
            return Err(HardValidationError::InvalidPermutation {
                reason: format!(
                    "Expected {} entries, got {}",
                    channel_count,
                    slots.len()
                ),
                permutation: slots,
            });
        }

        let mut seen = vec![false; slots.len()];
        for &slot in &slots {
            match seen.get_mut(slot as usize) {
                Some(taken) if !*taken => *taken = true,
                Some(_) => {
                    return Err(HardValidationError::InvalidPermutation {
                        reason: format!("Output slot {} is used more than once", slot),
                        permutation: slots,
                    });
                }
                None => {
                    return Err(HardValidationError::InvalidPermutation {
                        reason: format!(
                            "Output slot {} is out of range for {} channels",
                            slot, channel_count
                        ),
                        permutation: slots,
                    });
                }
            }
        }

        Ok(Self(slots))
    }

    /// Output slot for the given channel.
    pub fn slot_for(&self, channel: usize) -> usize {
        self.0[channel] as usize
    }

    /// Number of channels covered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mapping covers no channels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw mapping.
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}
