//! The fusion store: the single source of truth for the rendering layer.
//!
//! The store owns the mutable working state behind a lock; readers never see
//! it.  Each merge (or recorded failure) rebuilds an immutable
//! [`FusionSnapshot`] and swaps the published `Arc` reference, so a reader
//! either gets the previous snapshot or the new one, never something half
//! merged.
//!
//! Invariants enforced here:
//!
//! - per vehicle, `seen_at` is monotonically non-decreasing; an older update
//!   is a no-op (equal timestamps: later-processed wins)
//! - event ids are unique; a duplicate id overwrites
//! - events older than the retention window are pruned on every merge
//!

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use fleetfusion_formats::{Event, VehicleState};
use fleetfusion_sources::Records;

/// The two upstreams we fuse.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SourceId {
    Tracking,
    Events,
}

/// Per-source staleness bookkeeping, embedded in every snapshot.
///
#[derive(Clone, Debug, Default, Serialize)]
pub struct SourceHealth {
    /// When the last successful fetch was merged
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last fetch error, cleared on success
    pub last_error: Option<String>,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Set once `consecutive_failures` crosses the threshold
    pub degraded: bool,
}

impl SourceHealth {
    /// A source is stale when its last success is older than `max_age`
    /// (or it never succeeded at all).
    ///
    pub fn stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_success_at {
            Some(t) => now - t > max_age,
            None => true,
        }
    }
}

/// Immutable, versioned aggregate of the current fused state.  Never mutated
/// after publication, safe to share across threads as `Arc<FusionSnapshot>`.
///
#[derive(Clone, Debug, Serialize)]
pub struct FusionSnapshot {
    /// Bumped on every publication
    pub version: u64,
    /// When this snapshot was built
    pub taken_at: DateTime<Utc>,
    /// Last known state per vehicle
    pub vehicles: BTreeMap<String, VehicleState>,
    /// Recent events, ascending (`at`, `id`)
    pub events: Vec<Event>,
    /// Tracking source bookkeeping
    pub tracking: SourceHealth,
    /// Events source bookkeeping
    pub events_src: SourceHealth,
}

impl FusionSnapshot {
    pub fn health(&self, source: SourceId) -> &SourceHealth {
        match source {
            SourceId::Tracking => &self.tracking,
            SourceId::Events => &self.events_src,
        }
    }
}

/// Mutable working state, only ever touched under the write lock.
///
#[derive(Debug, Default)]
struct Working {
    version: u64,
    vehicles: BTreeMap<String, VehicleState>,
    events: BTreeMap<String, Event>,
    tracking: SourceHealth,
    events_src: SourceHealth,
}

impl Working {
    fn health_mut(&mut self, source: SourceId) -> &mut SourceHealth {
        match source {
            SourceId::Tracking => &mut self.tracking,
            SourceId::Events => &mut self.events_src,
        }
    }

    /// Build the next snapshot from the current state.
    ///
    fn publish(&mut self, now: DateTime<Utc>) -> Arc<FusionSnapshot> {
        self.version += 1;

        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));

        Arc::new(FusionSnapshot {
            version: self.version,
            taken_at: now,
            vehicles: self.vehicles.clone(),
            events,
            tracking: self.tracking.clone(),
            events_src: self.events_src.clone(),
        })
    }
}

/// Holds the latest reconciled state and publishes snapshots.
///
/// Writer side is the two pollers (`merge`, `record_failure`), reader side
/// is the presentation layer through [`SnapshotReader`].
///
#[derive(Debug)]
pub struct FusionStore {
    /// Event retention window
    retention: Duration,
    /// Consecutive failures before a source is flagged degraded
    degraded_after: u32,
    inner: RwLock<Working>,
    current: RwLock<Arc<FusionSnapshot>>,
}

impl FusionStore {
    #[tracing::instrument]
    pub fn new(retention: Duration, degraded_after: u32) -> Self {
        trace!("store::new");

        let now = Utc::now();
        let empty = Arc::new(FusionSnapshot {
            version: 0,
            taken_at: now,
            vehicles: BTreeMap::new(),
            events: vec![],
            tracking: SourceHealth::default(),
            events_src: SourceHealth::default(),
        });
        FusionStore {
            retention,
            degraded_after,
            inner: RwLock::new(Working::default()),
            current: RwLock::new(empty),
        }
    }

    /// Merge one successful fetch cycle and publish a new snapshot.
    ///
    /// Vehicle records are upserted under the monotonic `seen_at` invariant,
    /// event records by id, then the event window is pruned and the source's
    /// health reset.
    ///
    #[tracing::instrument(skip(self, records))]
    pub fn merge(&self, source: SourceId, records: Records, fetched_at: DateTime<Utc>) {
        trace!("store::merge from {}", source);

        let mut inner = self.inner.write().unwrap();

        match records {
            Records::Vehicles(list) => {
                for v in list {
                    // Out-of-order updates are dropped.  Equal timestamps:
                    // the later-processed record wins.
                    //
                    let fresh = match inner.vehicles.get(&v.id) {
                        Some(held) => held.seen_at <= v.seen_at,
                        None => true,
                    };
                    if fresh {
                        inner.vehicles.insert(v.id.clone(), v);
                    } else {
                        debug!("stale update for {} dropped", v.id);
                    }
                }
            }
            Records::Events(list) => {
                for e in list {
                    inner.events.insert(e.id.clone(), e);
                }
            }
        }

        // Prune the event window on every merge, whichever source drove it
        //
        let cutoff = fetched_at - self.retention;
        inner.events.retain(|_, e| e.at >= cutoff);

        let health = inner.health_mut(source);
        health.last_success_at = Some(fetched_at);
        health.last_error = None;
        health.consecutive_failures = 0;
        health.degraded = false;

        // Swap while still holding the write lock so two concurrent merges
        // can not publish out of order.
        //
        let snap = inner.publish(fetched_at);
        self.swap(snap);
    }

    /// Record a failed fetch cycle.  Data is untouched, but a new snapshot
    /// is published so readers see the updated health immediately.
    ///
    #[tracing::instrument(skip(self))]
    pub fn record_failure(&self, source: SourceId, error: &str, at: DateTime<Utc>) {
        trace!("store::record_failure from {}", source);

        let mut inner = self.inner.write().unwrap();

        let threshold = self.degraded_after;
        let health = inner.health_mut(source);
        health.last_error = Some(error.to_string());
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.degraded = health.consecutive_failures >= threshold;

        let snap = inner.publish(at);
        self.swap(snap);
    }

    /// Latest published snapshot, a cheap `Arc` clone.
    ///
    pub fn snapshot(&self) -> Arc<FusionSnapshot> {
        self.current.read().unwrap().clone()
    }

    /// Atomic reference swap of the published snapshot.
    ///
    fn swap(&self, snap: Arc<FusionSnapshot>) {
        let mut cur = self.current.write().unwrap();
        *cur = snap;
    }
}

/// Read-only accessor handed to the presentation layer.  Never blocks on
/// in-flight merges, never fails: worst case the snapshot is stale, which
/// the caller can see from the health metadata.
///
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    store: Arc<FusionStore>,
}

impl SnapshotReader {
    pub fn new(store: Arc<FusionStore>) -> Self {
        SnapshotReader { store }
    }

    /// Latest published snapshot.
    ///
    #[inline]
    pub fn current(&self) -> Arc<FusionSnapshot> {
        self.store.snapshot()
    }
}
