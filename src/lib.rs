//! # seqfetch
//!
//! Run many downloads at once and deliver their bytes to a single sink in
//! launch order, exactly as if they had run one after another.
//!
//! ## Design
//!
//! - **One task per position** - every identifier gets its own concurrent task
//! - **Ordered handoff** - the sink moves from position *i* to *i+1* through a
//!   single-slot channel, so at most one position ever writes
//! - **Buffer, don't block** - a position whose turn has not come keeps reading
//!   its own source into memory, re-checking its turn at a bounded interval
//! - **Fail fast** - the first failure cancels a shared token and every waiting
//!   position unwinds immediately
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use seqfetch::{Chain, Config, HttpFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
//!
//!     let mut chain = Chain::new(tokio::io::stdout(), fetcher, &config.sequencer);
//!     chain.push("https://example.com/part-1");
//!     chain.push("https://example.com/part-2");
//!
//!     let completed = chain.finish().await?;
//!     eprintln!("wrote {} bytes", completed.bytes_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Chain builder and orchestrator
pub mod chain;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Task runner and HTTP fetching
pub mod fetch;
/// Task identifier input
pub mod input;
/// Ordered sink handoff between positions
pub mod sequencer;
/// Core types
pub mod types;

// Re-export commonly used types
pub use chain::Chain;
pub use config::{Config, HttpConfig, SequencerConfig};
pub use error::{Error, FetchError, Result};
pub use fetch::{ChunkStream, Fetcher, HttpFetcher, run_task};
pub use input::TaskSource;
pub use sequencer::{NodeState, SequencerNode};
pub use types::{Completed, Task};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early, without cancelling, if the token is cancelled by someone else first.
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = wait_for_signal() => {}
    }
    tracing::warn!("termination signal received, cancelling all tasks");
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            tokio::signal::ctrl_c().await.ok();
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
