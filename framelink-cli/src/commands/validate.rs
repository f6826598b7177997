// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `framelink validate` command - Validate configuration file.

use framelink_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Rings ({}):", config.rings.len());
            for ring in &config.rings {
                println!(
                    "  - {} (depth: {}, overflow: {})",
                    ring.name,
                    ring.queue_depth,
                    ring.overflow.name()
                );
            }
            println!();
            println!("Synchronizers ({}):", config.synchronizers.len());
            for sync in &config.synchronizers {
                println!(
                    "  - {} (mode: {}, channels: {}, permutation: {:?})",
                    sync.name,
                    sync.strategy.mode(),
                    sync.channel_count(),
                    sync.permutation.as_slice()
                );
                for (channel, topic) in sync.input_topics.iter().enumerate() {
                    println!(
                        "      [{}] {} -> slot {}",
                        channel,
                        topic,
                        sync.permutation.slot_for(channel)
                    );
                }
                println!("      output: {}", sync.output_topic);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
