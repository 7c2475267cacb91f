//! Library part of the `fusiond` daemon.
//!
//! Three pieces, wired together by `main.rs`:
//!
//! - `FusionStore`: merges fetched records into the current fused state and
//!   publishes immutable snapshots
//! - `Poller`: one per source, drives the fetch cycles with backoff
//! - `SnapshotReader`: read-only handle handed to the presentation layer
//!

pub use cli::*;
pub use config::*;
pub use poller::*;
pub use store::*;

mod cli;
mod config;
mod poller;
mod store;

/// Daemon signature
///
pub fn version() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
