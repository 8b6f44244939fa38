// src/system/signals.rs

//! Ctrl+C handling.

use crate::{CancellationToken, constants::EXIT_INTERRUPTED};
use colored::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Creates a cancellation token that is set on the first Ctrl+C.
/// A second Ctrl+C exits the process immediately.
///
/// The listener runs on a dedicated thread with its own single-threaded
/// tokio runtime; the rest of the program stays synchronous.
pub fn install_ctrl_c_handler() -> CancellationToken {
    let token: CancellationToken = Arc::new(AtomicBool::new(false));
    let flag = token.clone();

    let spawned = thread::Builder::new()
        .name("toxide-signals".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::warn!("Could not start the signal listener: {}", e);
                    return;
                }
            };
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::warn!("Failed to listen for Ctrl+C: {}", e);
                        return;
                    }
                    if flag.swap(true, Ordering::SeqCst) {
                        eprintln!("\n{}", "Interrupted twice, exiting.".red());
                        std::process::exit(EXIT_INTERRUPTED);
                    }
                    eprintln!(
                        "\n{}",
                        "Interrupt received, stopping running environments...".yellow()
                    );
                }
            });
        });

    if let Err(e) = spawned {
        log::warn!("Could not spawn the signal listener thread: {}", e);
    }
    token
}
