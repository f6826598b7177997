// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Framelink CLI
//!
//! Command-line interface for framelink shared rings and frame synchronizers.

use clap::{Parser, Subcommand};

mod commands;

/// Framelink - zero-copy frame rings and multi-stream synchronization
#[derive(Parser)]
#[command(name = "framelink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "framelink.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Push synthetic frame descriptors into a ring
    Publish {
        /// Ring name
        #[arg(short, long)]
        ring: String,

        /// Ring depth in slots (used when creating the ring)
        #[arg(short, long, default_value_t = 2)]
        depth: u32,

        /// Wait for free slots instead of evicting the oldest frame
        #[arg(long)]
        block: bool,

        /// Number of frames to publish (0 = until Ctrl-C)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u64,

        /// Delay between frames
        #[arg(long, default_value_t = 33)]
        interval_ms: u64,

        /// Timeout for each push
        #[arg(long, default_value_t = 100)]
        timeout_ms: u32,
    },

    /// Pop and print frame descriptors from a ring
    Subscribe {
        /// Ring name
        #[arg(short, long)]
        ring: String,

        /// Timeout for each pop
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u32,

        /// Stop after this many frames (0 = until Ctrl-C)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u64,
    },

    /// Dump the header and slot states of a ring
    Inspect {
        /// Ring name
        #[arg(short, long)]
        ring: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a ring destroyed and unlink its segment
    Destroy {
        /// Ring name
        #[arg(short, long)]
        ring: String,
    },

    /// Run a configured synchronizer fed by synthetic producers
    Sync {
        /// Synchronizer name from the configuration file
        #[arg(short, long)]
        name: String,

        /// Frame interval of each synthetic producer
        #[arg(long, default_value_t = 33)]
        interval_ms: u64,

        /// Stop after this many frame sets (0 = until Ctrl-C)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Publish {
            ring,
            depth,
            block,
            count,
            interval_ms,
            timeout_ms,
        } => {
            commands::publish::execute(commands::publish::PublishArgs {
                ring,
                depth,
                block,
                count,
                interval_ms,
                timeout_ms,
            })
            .await
        }
        Commands::Subscribe {
            ring,
            timeout_ms,
            count,
        } => commands::subscribe::execute(&ring, timeout_ms, count).await,
        Commands::Inspect { ring, json } => commands::inspect::execute(&ring, json).await,
        Commands::Destroy { ring } => commands::destroy::execute(&ring).await,
        Commands::Sync {
            name,
            interval_ms,
            count,
        } => commands::sync::execute(&cli.config, &name, interval_ms, count).await,
    }
}
