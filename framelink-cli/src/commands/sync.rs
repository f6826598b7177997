// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `framelink sync` command - Run a configured frame synchronizer.
//!
//! Each input topic gets a synthetic producer thread; producers start with
//! staggered offsets so windows fill at different points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use framelink_core::{
    BufferDescriptor, ConfigLoader, FrameSet, FrameSynchronizer, LocalBus, SyncStats,
};

use super::{run_until_ctrl_c, synthetic_frame};

/// How often the printer re-checks the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn execute(
    config_path: &str,
    name: &str,
    interval_ms: u64,
    count: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, synchronizer = %name, "Starting synchronizer");

    let config = ConfigLoader::load_file(config_path)?;
    let sync_config = config
        .synchronizer(name)
        .ok_or_else(|| format!("No synchronizer named {:?} in {}", name, config_path))?
        .clone();

    println!("▶ Synchronizer {}", sync_config.name);
    for (channel, topic) in sync_config.input_topics.iter().enumerate() {
        println!(
            "  [{}] {} -> slot {}",
            channel,
            topic,
            sync_config.permutation.slot_for(channel)
        );
    }
    println!("  output: {}", sync_config.output_topic);
    println!();

    let inputs: Arc<LocalBus<BufferDescriptor>> = Arc::new(LocalBus::new());
    let outputs: Arc<LocalBus<FrameSet<BufferDescriptor>>> = Arc::new(LocalBus::new());
    let sets = outputs.subscribe(&sync_config.output_topic);
    let topics = sync_config.input_topics.clone();
    let handle = FrameSynchronizer::new(sync_config, Arc::clone(&inputs), outputs).start()?;

    let interval = Duration::from_millis(interval_ms.max(1));

    let stats = run_until_ctrl_c(move |stop| -> SyncStats {
        let producers: Vec<_> = topics
            .into_iter()
            .enumerate()
            .map(|(channel, topic)| {
                let inputs = Arc::clone(&inputs);
                let stop = Arc::clone(&stop);
                thread::spawn(move || produce(&inputs, &topic, channel, interval, &stop))
            })
            .collect();

        let mut printed = 0u64;
        while !stop.load(Ordering::Relaxed) && (count == 0 || printed < count) {
            if let Some(set) = sets.try_receive(POLL_INTERVAL) {
                print_set(&set);
                printed += 1;
            }
        }

        stop.store(true, Ordering::Relaxed);
        for producer in producers {
            if producer.join().is_err() {
                tracing::error!("Producer thread panicked");
            }
        }

        match handle.stop() {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Synchronizer did not stop cleanly");
                SyncStats::default()
            }
        }
    })
    .await?;

    println!();
    println!("✓ Synchronizer stopped");
    println!("  Frames received:    {}", stats.frames_received);
    println!("  Frames superseded:  {}", stats.frames_superseded);
    println!("  Sets complete:      {}", stats.windows_complete);
    println!("  Sets partial:       {}", stats.windows_partial);
    println!("  Windows discarded:  {}", stats.windows_discarded);
    Ok(())
}

fn produce(
    inputs: &LocalBus<BufferDescriptor>,
    topic: &str,
    channel: usize,
    interval: Duration,
    stop: &AtomicBool,
) {
    let source = format!("synthetic{}", channel);
    thread::sleep(Duration::from_millis(3 * channel as u64));

    let mut frame_id = 0u64;
    while !stop.load(Ordering::Relaxed) {
        match synthetic_frame(&source, frame_id) {
            Ok(desc) => {
                inputs.publish(topic, desc);
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Cannot build frame");
                return;
            }
        }
        frame_id += 1;
        thread::sleep(interval);
    }
}

fn print_set(set: &FrameSet<BufferDescriptor>) {
    let slots: Vec<String> = set
        .slots
        .iter()
        .map(|slot| match slot {
            Some(desc) => format!("{}#{}", desc.name(), desc.frame_id),
            None => "-".to_string(),
        })
        .collect();
    println!(
        "  set {:<6} {}/{} [{}]",
        set.sequence,
        set.present(),
        set.slots.len(),
        slots.join(" | ")
    );
}
