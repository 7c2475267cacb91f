//! Common logging initializer
//!

use eyre::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_tree::HierarchicalLayer;

/// Setup the `tracing` subscriber shared by all binaries.
///
/// Filters come from the environment (`RUST_LOG`), output is either the
/// compact single-line format or a hierarchical tree of spans.
///
#[tracing::instrument]
pub fn init_logging(use_tree: bool) -> Result<()> {
    // Load filters from environment
    //
    let filter = EnvFilter::from_default_env();

    // Do we want hierarchical output?
    //
    let tree = if use_tree {
        Some(
            HierarchicalLayer::new(2)
                .with_ansi(true)
                .with_span_retrace(true)
                .with_targets(true)
                .with_bracketed_fields(true),
        )
    } else {
        None
    };

    // Without the tree, use the plain compact format
    //
    let fmt = if use_tree {
        None
    } else {
        Some(
            fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_target(false)
                .compact(),
        )
    };

    // Combine filters & layers
    //
    tracing_subscriber::registry()
        .with(filter)
        .with(tree)
        .with(fmt)
        .init();

    Ok(())
}
