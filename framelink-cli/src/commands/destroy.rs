// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `framelink destroy` command - Remove a ring segment.

use framelink_core::{RingName, SharedMemoryError, SharedPublisher};

pub async fn execute(ring: &str) -> Result<(), Box<dyn std::error::Error>> {
    let name = RingName::new(ring)?;

    match SharedPublisher::destroy_named(&name) {
        Ok(()) => {
            println!("✓ Ring {} destroyed", name);
            Ok(())
        }
        Err(SharedMemoryError::NotFound { .. }) => {
            eprintln!("✗ Ring {} does not exist", name);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
