// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for framelink.
//!
//! Errors are explicit enums. No `Box<dyn Error>`, no `anyhow::Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for framelink.
#[derive(Debug, Error)]
pub enum LinkError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Shared Memory Errors
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // Synchronizer Errors
    // =========================================================================
    #[error("Synchronizer {name} thread panicked")]
    SynchronizerPanicked { name: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject a configuration before anything starts.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Queue depth out of bounds: {depth} (min: {min}, max: {max})")]
    QueueDepthOutOfBounds { depth: u32, min: u32, max: u32 },

    #[error("Invalid permutation {permutation:?}: {reason}")]
    InvalidPermutation {
        permutation: Vec<u32>,
        reason: String,
    },

    #[error("Duplicate name: {name}")]
    DuplicateName { name: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// Shared memory and ring errors.
///
/// Every blocking operation reports expiry as `Timeout`; transient contention
/// never surfaces as an error.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Failed to create shared memory region: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Shared memory region already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Bad arguments: {reason}")]
    BadArguments { reason: String },

    #[error("Shared ring not found: {name}")]
    NotFound { name: String },

    #[error("Timed out after {waited_ms}ms waiting for {operation}")]
    Timeout {
        operation: &'static str,
        waited_ms: u64,
    },

    #[error("Bad state: {reason}")]
    BadState { reason: String },

    #[error("Ring buffer empty - no data available")]
    RingBufferEmpty,

    #[error("Descriptor checksum mismatch in slot {slot}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { slot: u32, expected: u32, actual: u32 },
}

impl SharedMemoryError {
    /// Whether this error reports an expired deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias using LinkError.
pub type LinkResult<T> = Result<T, LinkError>;
