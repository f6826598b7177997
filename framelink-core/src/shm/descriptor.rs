// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Buffer descriptors carried through shared rings.
//!
//! A descriptor references a payload owned by an external buffer pool; it
//! never contains the payload itself. The layout is fixed-size, padding-free
//! and `Copy`, so it can be written straight into a shared memory slot.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::error::SharedMemoryError;

/// Size of the inline, NUL-padded buffer name.
pub const DESCRIPTOR_NAME_LEN: usize = 64;

/// Pixel or data layout of the referenced payload.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    Raw = 0,
    Nv12 = 1,
    Nv12Ubwc = 2,
    P010 = 3,
    Uyvy = 4,
    Rgb888 = 5,
    Bgr888 = 6,
    Tensor = 7,
}

impl BufferFormat {
    /// Decode a raw tag read from shared memory.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Raw,
            1 => Self::Nv12,
            2 => Self::Nv12Ubwc,
            3 => Self::P010,
            4 => Self::Uyvy,
            5 => Self::Rgb888,
            6 => Self::Bgr888,
            7 => Self::Tensor,
            _ => return None,
        })
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Nv12 => "nv12",
            Self::Nv12Ubwc => "nv12-ubwc",
            Self::P010 => "p010",
            Self::Uyvy => "uyvy",
            Self::Rgb888 => "rgb888",
            Self::Bgr888 => "bgr888",
            Self::Tensor => "tensor",
        }
    }
}

impl fmt::Display for BufferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reference to a payload buffer: name, handle, size and format, plus the
/// frame id and capture timestamp of the frame it holds.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BufferDescriptor {
    name: [u8; DESCRIPTOR_NAME_LEN],
    /// Payload address or buffer-pool handle.
    pub handle: u64,
    pub frame_id: u64,
    /// Capture timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Payload size in bytes.
    pub size: u32,
    format: u32,
}

impl BufferDescriptor {
    /// Create a descriptor.
    ///
    /// # Errors
    /// `BadArguments` if `name` does not fit the inline name field.
    pub fn new(
        name: &str,
        handle: u64,
        size: u32,
        format: BufferFormat,
    ) -> Result<Self, SharedMemoryError> {
        if name.len() >= DESCRIPTOR_NAME_LEN {
            return Err(SharedMemoryError::BadArguments {
                reason: format!(
                    "Descriptor name {:?} is {} bytes (max {})",
                    name,
                    name.len(),
                    DESCRIPTOR_NAME_LEN - 1
                ),
            });
        }

        let mut desc = Self::zeroed();
        desc.name[..name.len()].copy_from_slice(name.as_bytes());
        desc.handle = handle;
        desc.size = size;
        desc.format = format as u32;
        Ok(desc)
    }

    /// Attach frame identity and capture time.
    pub fn with_frame(mut self, frame_id: u64, timestamp_ns: u64) -> Self {
        self.frame_id = frame_id;
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Buffer name up to the first NUL byte.
    pub fn name(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DESCRIPTOR_NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or("<invalid utf-8>")
    }

    /// Typed format, `None` for tags this build does not know.
    pub fn format(&self) -> Option<BufferFormat> {
        BufferFormat::from_raw(self.format)
    }

    /// Format tag exactly as stored.
    pub fn raw_format(&self) -> u32 {
        self.format
    }

    /// CRC-32 over the descriptor bytes.
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(bytemuck::bytes_of(self))
    }
}

impl fmt::Debug for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferDescriptor")
            .field("name", &self.name())
            .field("handle", &format_args!("{:#x}", self.handle))
            .field("frame_id", &self.frame_id)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("size", &self.size)
            .field("format", &self.format())
            .finish()
    }
}

impl fmt::Display for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = self
            .format()
            .map(|fmt| fmt.name().to_string())
            .unwrap_or_else(|| format!("unknown({})", self.format));
        write!(
            f,
            "{} frame={} ts={}ns handle={:#x} size={} format={}",
            self.name(),
            self.frame_id,
            self.timestamp_ns,
            self.handle,
            self.size,
            format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_padding_free() {
        assert_eq!(std::mem::size_of::<BufferDescriptor>(), 96);
        assert_eq!(std::mem::align_of::<BufferDescriptor>(), 8);
    }

    #[test]
    fn test_descriptor_fields() {
        let desc = BufferDescriptor::new("cam0.y", 0xdead_beef, 1920 * 1080, BufferFormat::Nv12)
            .unwrap()
            .with_frame(42, 1_000_000);
        assert_eq!(desc.name(), "cam0.y");
        assert_eq!(desc.handle, 0xdead_beef);
        assert_eq!(desc.size, 1920 * 1080);
        assert_eq!(desc.format(), Some(BufferFormat::Nv12));
        assert_eq!(desc.frame_id, 42);
        assert_eq!(desc.timestamp_ns, 1_000_000);
    }

    #[test]
    fn test_name_too_long() {
        let name = "n".repeat(DESCRIPTOR_NAME_LEN);
        assert!(BufferDescriptor::new(&name, 0, 0, BufferFormat::Raw).is_err());
        let name = "n".repeat(DESCRIPTOR_NAME_LEN - 1);
        assert!(BufferDescriptor::new(&name, 0, 0, BufferFormat::Raw).is_ok());
    }

    #[test]
    fn test_unknown_format_is_preserved() {
        let mut desc = BufferDescriptor::new("x", 1, 2, BufferFormat::Raw).unwrap();
        desc.format = 99;
        assert_eq!(desc.format(), None);
        assert_eq!(desc.raw_format(), 99);
        assert!(desc.to_string().contains("unknown(99)"));
    }

    #[test]
    fn test_checksum_tracks_content() {
        let a = BufferDescriptor::new("x", 1, 2, BufferFormat::Raw).unwrap();
        let b = a.with_frame(1, 0);
        assert_eq!(a.checksum(), a.checksum());
        assert_ne!(a.checksum(), b.checksum());
    }
}
