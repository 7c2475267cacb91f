//! This is the `fusiond` daemon launcher.
//!
//! It polls the two upstreams, keeps the fusion store current, and logs a
//! one-line fusion summary on a fixed tick.  The presentation layer gets
//! its data through [`SnapshotReader`]; nothing is ever pushed to it.
//!

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as CDuration, Utc};
use clap::Parser;
use eyre::Result;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use fleetfusion_common::init_logging;
use fleetfusion_sources::{Events, Fetchable, Tracking};
use fusiond::{
    BackoffPolicy, FusionStore, FusiondConfig, Opts, Poller, SnapshotReader, SourceId,
};

/// Summary log cadence in seconds
const SUMMARY_TICK: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    // Default filter from verbosity unless the environment says otherwise
    //
    if std::env::var("RUST_LOG").is_err() {
        let lvl = match opts.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", lvl);
    }
    init_logging(opts.tree)?;

    info!("{} starting", fusiond::version());

    // Tuning knobs, then CLI overrides
    //
    let mut cfg = FusiondConfig::load(opts.config.as_ref())?;
    if let Some(secs) = opts.tracking_interval {
        cfg.tracking_interval = secs;
    }
    if let Some(secs) = opts.events_interval {
        cfg.events_interval = secs;
    }

    // Missing base URLs abort here, before anything is spawned
    //
    let (tracking_site, events_site) = cfg.sites()?;
    info!(
        "tracking = {} ({}), events = {} ({})",
        tracking_site.base_url,
        tracking_site.auth.clone().unwrap_or_default(),
        events_site.base_url,
        events_site.auth.clone().unwrap_or_default(),
    );

    let mut tracking = Tracking::new();
    tracking.load(&tracking_site);

    let mut events = Events::new();
    events.load(&events_site).window(cfg.retention);

    let store = Arc::new(FusionStore::new(
        CDuration::seconds(cfg.retention),
        cfg.degraded_after,
    ));
    let reader = SnapshotReader::new(store.clone());

    let policy = BackoffPolicy {
        base: Duration::from_secs(cfg.backoff_base),
        cap: Duration::from_secs(cfg.backoff_cap),
    };
    let token = CancellationToken::new();

    let t_poller = Poller::new(
        SourceId::Tracking,
        Arc::new(tracking) as Arc<dyn Fetchable>,
        store.clone(),
        Duration::from_secs(cfg.tracking_interval),
        policy,
        token.clone(),
    );
    let e_poller = Poller::new(
        SourceId::Events,
        Arc::new(events) as Arc<dyn Fetchable>,
        store.clone(),
        Duration::from_secs(cfg.events_interval),
        policy,
        token.clone(),
    );

    let t_handle = tokio::spawn(t_poller.run());
    let e_handle = tokio::spawn(e_poller.run());

    // Summary loop, the in-process stand-in for a dashboard refresh
    //
    let sum_token = token.clone();
    let sum_handle = tokio::spawn(async move {
        let stale_after = CDuration::seconds((SUMMARY_TICK * 2) as i64);
        loop {
            tokio::select! {
                _ = sum_token.cancelled() => break,
                _ = sleep(Duration::from_secs(SUMMARY_TICK)) => {}
            }
            let snap = reader.current();
            let now = Utc::now();
            info!(
                "snapshot v{}: {} vehicles, {} events, tracking {}{}, events {}{}",
                snap.version,
                snap.vehicles.len(),
                snap.events.len(),
                if snap.tracking.stale(now, stale_after) { "STALE" } else { "ok" },
                if snap.tracking.degraded { " (degraded)" } else { "" },
                if snap.events_src.stale(now, stale_after) { "STALE" } else { "ok" },
                if snap.events_src.degraded { " (degraded)" } else { "" },
            );
        }
        trace!("summary loop stopped");
    });

    // Teardown: cancel in-flight cycles, stop scheduling, drain the tasks
    //
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    token.cancel();

    t_handle.await?;
    e_handle.await?;
    sum_handle.await?;

    info!("bye");
    Ok(())
}
