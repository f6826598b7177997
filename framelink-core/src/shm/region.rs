// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Provides safe abstraction over mmap and shm_open for zero-copy IPC.
//! Dropping a region only unmaps it; the named segment survives until
//! [`SharedMemoryRegion::unlink`] is called.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::SharedMemoryError;

/// Represents a mapped shared memory region.
///
/// This struct owns the local mapping and will unmap it on drop.
/// The memory can be shared between processes using the same name.
pub struct SharedMemoryRegion {
    /// Name of the shared memory object.
    name: String,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
    /// File descriptor for the shared memory object.
    fd: i32,
}

// SAFETY: SharedMemoryRegion can be sent between threads as it owns its mapping.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: Concurrent access to the mapped bytes is coordinated by the ring's
// spin lock and atomics stored inside the region.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Minimum size for a shared memory region.
    pub const MIN_SIZE: usize = 4096;

    /// Maximum size for a shared memory region (1 GB).
    pub const MAX_SIZE: usize = 1024 * 1024 * 1024;

    /// Create a new shared memory region, failing if the name is taken.
    ///
    /// # Arguments
    /// * `name` - Name of the shared memory object (will be prefixed with /)
    /// * `size` - Size in bytes (must be between MIN_SIZE and MAX_SIZE)
    ///
    /// # Errors
    /// `AlreadyExists` if another process created the name first,
    /// `CreateFailed`/`MapFailed` for anything else.
    pub fn create(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        if size < Self::MIN_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("Size {} is below minimum {}", size, Self::MIN_SIZE),
            });
        }
        if size > Self::MAX_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("Size {} exceeds maximum {}", size, Self::MAX_SIZE),
            });
        }

        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };

        if fd < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EEXIST) {
                return Err(SharedMemoryError::AlreadyExists {
                    name: name.to_string(),
                });
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", errno),
            });
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            // SAFETY: fd is valid and c_name names the object we just created
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                // SAFETY: fd is valid and c_name names the object we just created
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(e);
            }
        };

        // ftruncate already zero-fills, but a recycled page must not leak
        // stale ring state into a fresh header.
        // SAFETY: ptr is valid for size bytes
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            fd,
        })
    }

    /// Open an existing shared memory region, mapping its full current size.
    ///
    /// # Errors
    /// `NotFound` if no segment with this name exists or it has not been
    /// sized by its creator yet.
    pub fn open(name: &str) -> Result<Self, SharedMemoryError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };

        if fd < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::ENOENT) {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                });
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", errno),
            });
        }

        // SAFETY: an all-zero stat is a valid out-parameter for fstat
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fd is valid, stat is a valid out pointer
        if unsafe { libc::fstat(fd, &mut stat) } < 0 {
            let errno = std::io::Error::last_os_error();
            // SAFETY: fd is valid
            unsafe { libc::close(fd) };
            return Err(SharedMemoryError::MapFailed {
                reason: format!("fstat failed: {}", errno),
            });
        }

        let size = stat.st_size as usize;
        if size < Self::MIN_SIZE {
            // SAFETY: fd is valid
            unsafe { libc::close(fd) };
            return Err(SharedMemoryError::NotFound {
                name: name.to_string(),
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                // SAFETY: fd is valid
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Opened shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            fd,
        })
    }

    /// Remove the name of a shared memory segment.
    ///
    /// Existing mappings stay valid until they are dropped.
    pub fn unlink(name: &str) -> Result<(), SharedMemoryError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::ENOENT) {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                });
            }
            return Err(SharedMemoryError::BadState {
                reason: format!("shm_unlink({}) failed: {}", name, errno),
            });
        }

        tracing::debug!(name = %name, "Unlinked shared memory region");
        Ok(())
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of this shared memory region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a raw pointer to the shared memory.
    ///
    /// Callers must coordinate access through the structures stored inside.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn c_name(name: &str) -> Result<CString, SharedMemoryError> {
        if name.is_empty() {
            return Err(SharedMemoryError::BadArguments {
                reason: "Shared memory name cannot be empty".to_string(),
            });
        }

        CString::new(format!("/{}", name)).map_err(|e| SharedMemoryError::BadArguments {
            reason: format!("Invalid shared memory name {:?}: {}", name, e),
        })
    }

    fn map(fd: i32, size: usize) -> Result<NonNull<u8>, SharedMemoryError> {
        // SAFETY: fd is valid, size is the object size, offset 0 is valid
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(SharedMemoryError::MapFailed {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| SharedMemoryError::MapFailed {
            reason: "mmap returned a null mapping".to_string(),
        })
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set during creation
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        // SAFETY: fd was opened during creation
        unsafe { libc::close(self.fd) };
        tracing::debug!(name = %self.name, "Unmapped shared memory region");
    }
}
