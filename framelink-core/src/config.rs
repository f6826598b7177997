// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Declares shared rings and frame synchronizers. Any invalid field results
//! in a HardValidationError before a ring is created or a thread started.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, LinkError, LinkResult};
use crate::shm::OverflowPolicy;
use crate::sync::AlignmentStrategy;
use crate::types::{Permutation, QueueDepth, RingName};

/// Fewest input channels a synchronizer accepts.
pub const MIN_SYNC_CHANNELS: usize = 2;
/// Most input channels a synchronizer accepts.
pub const MAX_SYNC_CHANNELS: usize = 32;
/// Window length used when none is configured.
pub const DEFAULT_WINDOW_MS: u64 = 100;
/// Longest allowed window.
pub const MAX_WINDOW_MS: u64 = 10_000;

/// Raw ring configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRingConfig {
    name: String,
    #[serde(default = "default_queue_depth")]
    queue_depth: u32,
    #[serde(default)]
    overflow: OverflowPolicy,
}

fn default_queue_depth() -> u32 {
    QueueDepth::default().value()
}

/// Raw synchronizer configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSynchronizerConfig {
    name: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_window_ms")]
    window_ms: u64,
    #[serde(default)]
    input_topics: Vec<String>,
    channel_count: Option<usize>,
    #[serde(default)]
    permutation: Vec<u32>,
    #[serde(default)]
    output_topic: String,
}

fn default_mode() -> String {
    "window".to_string()
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    rings: Vec<RawRingConfig>,
    #[serde(default)]
    synchronizers: Vec<RawSynchronizerConfig>,
}

/// Validated ring configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    pub name: RingName,
    pub queue_depth: QueueDepth,
    pub overflow: OverflowPolicy,
}

impl RingConfig {
    /// Ring with default depth and overflow policy.
    pub fn new(name: RingName) -> Self {
        Self {
            name,
            queue_depth: QueueDepth::default(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Validated synchronizer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizerConfig {
    pub name: String,
    pub strategy: AlignmentStrategy,
    /// Channel `c` reads from `input_topics[c]`.
    pub input_topics: Vec<String>,
    pub permutation: Permutation,
    pub output_topic: String,
}

impl SynchronizerConfig {
    /// Build a synchronizer configuration.
    ///
    /// A missing or empty permutation means identity.
    pub fn new(
        name: impl Into<String>,
        strategy: AlignmentStrategy,
        input_topics: Vec<String>,
        permutation: Option<Vec<u32>>,
        output_topic: impl Into<String>,
    ) -> Result<Self, HardValidationError> {
        let name = name.into();
        let output_topic = output_topic.into();
        let context = format!("synchronizer {:?}", name);

        if name.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "name",
                context,
            });
        }

        let channels = input_topics.len();
        if !(MIN_SYNC_CHANNELS..=MAX_SYNC_CHANNELS).contains(&channels) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "input_topics",
                value: channels.to_string(),
                reason: format!(
                    "{} needs between {} and {} input topics",
                    context, MIN_SYNC_CHANNELS, MAX_SYNC_CHANNELS
                ),
            });
        }

        let mut seen = HashSet::new();
        for topic in &input_topics {
            if topic.is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "input_topics",
                    value: String::new(),
                    reason: format!("{} has an empty input topic", context),
                });
            }
            if !seen.insert(topic.as_str()) {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "input_topics",
                    value: topic.clone(),
                    reason: format!("{} lists the topic more than once", context),
                });
            }
        }

        if output_topic.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "output_topic",
                context,
            });
        }
        if seen.contains(output_topic.as_str()) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "output_topic",
                value: output_topic,
                reason: format!("{} would consume its own output", context),
            });
        }

        let permutation = match permutation {
            Some(slots) if !slots.is_empty() => Permutation::new(slots, channels as u32)?,
            _ => Permutation::identity(channels as u32),
        };

        if let AlignmentStrategy::Window { span } = strategy {
            let window_ms = span.as_millis();
            if window_ms == 0 || window_ms > u128::from(MAX_WINDOW_MS) {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "window_ms",
                    value: window_ms.to_string(),
                    reason: format!("Must be between 1 and {}", MAX_WINDOW_MS),
                });
            }
        }

        Ok(Self {
            name,
            strategy,
            input_topics,
            permutation,
            output_topic,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.input_topics.len()
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub rings: Vec<RingConfig>,
    pub synchronizers: Vec<SynchronizerConfig>,
}

impl Config {
    pub fn ring(&self, name: &str) -> Option<&RingConfig> {
        self.rings.iter().find(|r| r.name.as_str() == name)
    }

    pub fn synchronizer(&self, name: &str) -> Option<&SynchronizerConfig> {
        self.synchronizers.iter().find(|s| s.name == name)
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    /// Returns HardValidationError for any invalid fields.
    pub fn load_file(path: impl AsRef<Path>) -> LinkResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LinkError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LinkError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> LinkResult<Config> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| LinkError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Self::validate(raw)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig) -> LinkResult<Config> {
        let mut rings = Vec::with_capacity(raw.rings.len());
        let mut ring_names = HashSet::new();
        for raw_ring in raw.rings {
            let ring = Self::validate_ring(raw_ring)?;
            if !ring_names.insert(ring.name.clone()) {
                return Err(HardValidationError::DuplicateName {
                    name: ring.name.to_string(),
                }
                .into());
            }
            rings.push(ring);
        }

        let mut synchronizers = Vec::with_capacity(raw.synchronizers.len());
        let mut sync_names = HashSet::new();
        for (index, raw_sync) in raw.synchronizers.into_iter().enumerate() {
            let sync = Self::validate_synchronizer(raw_sync, index)?;
            if !sync_names.insert(sync.name.clone()) {
                return Err(HardValidationError::DuplicateName { name: sync.name }.into());
            }
            synchronizers.push(sync);
        }

        if rings.is_empty() && synchronizers.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "At least one ring or synchronizer must be defined".to_string(),
            }
            .into());
        }

        Ok(Config {
            rings,
            synchronizers,
        })
    }

    fn validate_ring(raw: RawRingConfig) -> LinkResult<RingConfig> {
        let name = RingName::new(raw.name)?;
        let queue_depth = QueueDepth::new(raw.queue_depth)?;

        Ok(RingConfig {
            name,
            queue_depth,
            overflow: raw.overflow,
        })
    }

    fn validate_synchronizer(
        raw: RawSynchronizerConfig,
        index: usize,
    ) -> LinkResult<SynchronizerConfig> {
        if raw.name.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "name",
                context: format!("synchronizer at index {}", index),
            }
            .into());
        }

        let strategy = match raw.mode.as_str() {
            "window" => AlignmentStrategy::window(Duration::from_millis(raw.window_ms)),
            other => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "mode",
                    value: other.to_string(),
                    reason: "Supported modes: window".to_string(),
                }
                .into());
            }
        };

        if let Some(count) = raw.channel_count {
            if count != raw.input_topics.len() {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "channel_count",
                    value: count.to_string(),
                    reason: format!(
                        "Synchronizer {:?} lists {} input topics",
                        raw.name,
                        raw.input_topics.len()
                    ),
                }
                .into());
            }
        }

        SynchronizerConfig::new(
            raw.name,
            strategy,
            raw.input_topics,
            Some(raw.permutation),
            raw.output_topic,
        )
        .map_err(Into::into)
    }
}
