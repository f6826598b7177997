// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use framelink_core::{BufferDescriptor, BufferFormat, SharedMemoryError};

pub mod destroy;
pub mod inspect;
pub mod publish;
pub mod subscribe;
pub mod sync;
pub mod validate;

/// Run blocking `work` on the blocking pool until it returns or Ctrl-C is
/// pressed. On Ctrl-C the stop flag is raised and the work is awaited.
pub(crate) async fn run_until_ctrl_c<T, F>(work: F) -> Result<T, Box<dyn std::error::Error>>
where
    T: Send + 'static,
    F: FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let mut task = tokio::task::spawn_blocking({
        let stop = Arc::clone(&stop);
        move || work(stop)
    });

    tokio::select! {
        result = &mut task => Ok(result?),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            println!();
            println!("Shutting down...");
            stop.store(true, Ordering::Relaxed);
            Ok(task.await?)
        }
    }
}

/// Descriptor for a synthetic 1080p NV12 frame.
pub(crate) fn synthetic_frame(
    source: &str,
    frame_id: u64,
) -> Result<BufferDescriptor, SharedMemoryError> {
    const WIDTH: u32 = 1920;
    const HEIGHT: u32 = 1080;

    let timestamp_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    Ok(
        BufferDescriptor::new(source, frame_id, WIDTH * HEIGHT * 3 / 2, BufferFormat::Nv12)?
            .with_frame(frame_id, timestamp_ns),
    )
}
