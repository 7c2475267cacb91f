//! Per-source polling loop.
//!
//! Each source gets its own task; the two cadences are independent and the
//! tasks share nothing but the store.  A failed cycle advances the backoff
//! state and never stops future scheduling; a success resets it and the
//! loop falls back to its regular cadence.
//!

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use fleetfusion_sources::{FetchError, Fetchable};

use crate::{FusionStore, SourceId};

/// Backoff parameters, shared by both pollers.
///
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// First retry delay
    pub base: Duration,
    /// Upper bound for the exponential growth
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

/// Explicit retry state: attempt count advanced on failure, reset on
/// success.  Delays grow as `base * 2^attempt` up to `cap`, with up to
/// +50% jitter so several instances do not hammer a recovering upstream
/// in lockstep.  The delay never goes below `base`.
///
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Backoff { policy, attempt: 0 }
    }

    /// Delay before the next retry, advancing the attempt counter.
    ///
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .policy
            .base
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.policy.cap);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::thread_rng().gen_range(1.0..1.5);
        exp.mul_f64(jitter).min(self.policy.cap)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Drives one adapter on its own cadence and feeds the store.
///
pub struct Poller {
    source: SourceId,
    adapter: Arc<dyn Fetchable>,
    store: Arc<FusionStore>,
    /// Regular cadence between successful cycles
    every: Duration,
    backoff: Backoff,
    token: CancellationToken,
}

impl Poller {
    pub fn new(
        source: SourceId,
        adapter: Arc<dyn Fetchable>,
        store: Arc<FusionStore>,
        every: Duration,
        policy: BackoffPolicy,
        token: CancellationToken,
    ) -> Self {
        Poller {
            source,
            adapter,
            store,
            every,
            backoff: Backoff::new(policy),
            token,
        }
    }

    /// Main loop.  First fetch fires immediately, then the cadence (or the
    /// backoff delay after a failure) takes over.  Cancellation is honoured
    /// both while sleeping and while a fetch is in flight.
    ///
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub async fn run(mut self) {
        trace!("poller::run");

        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = sleep(delay) => {}
            }

            let outcome = tokio::select! {
                _ = self.token.cancelled() => break,
                res = self.adapter.fetch() => res,
            };

            match outcome {
                Ok(records) => {
                    trace!("{}: {} records", self.source, records.len());

                    self.store.merge(self.source, records, Utc::now());
                    self.backoff.reset();
                    delay = self.every;
                }
                Err(e) => {
                    // Distinct causes get distinct log lines, the backoff
                    // treatment is the same for all three.
                    //
                    match &e {
                        FetchError::Unreachable(msg) => {
                            warn!("{}: unreachable: {}", self.source, msg)
                        }
                        FetchError::Rejected { status, .. } => {
                            warn!("{}: rejected with HTTP {}", self.source, status)
                        }
                        FetchError::Malformed(msg) => {
                            error!("{}: malformed answer: {}", self.source, msg)
                        }
                    }

                    self.store.record_failure(self.source, &e.to_string(), Utc::now());
                    delay = self.backoff.next_delay();
                    trace!("{}: retry in {:?}", self.source, delay);
                }
            }
        }

        info!("poller {} stopped", self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as CDuration;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fleetfusion_sources::Records;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        };
        let mut b = Backoff::new(policy);

        for _ in 0..10 {
            let d = b.next_delay();
            // Never below base, never above the cap
            //
            assert!(d >= policy.base);
            assert!(d <= policy.cap);
        }
        assert_eq!(10, b.attempt());

        b.reset();
        assert_eq!(0, b.attempt());
        assert!(b.next_delay() <= policy.base.mul_f64(1.5));
    }

    #[rstest]
    #[case(Duration::from_secs(1), Duration::from_secs(30), Duration::from_secs(1), Duration::from_millis(1500))]
    #[case(Duration::from_millis(200), Duration::from_secs(5), Duration::from_millis(200), Duration::from_millis(300))]
    fn test_backoff_first_retry_within_jitter_band(
        #[case] base: Duration,
        #[case] cap: Duration,
        #[case] lo: Duration,
        #[case] hi: Duration,
    ) {
        let mut b = Backoff::new(BackoffPolicy { base, cap });
        let d = b.next_delay();
        assert!(d >= lo);
        assert!(d <= hi);
    }

    /// Fails `fail_first` times, then returns empty vehicle batches.
    ///
    #[derive(Debug)]
    struct Flaky {
        fail_first: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetchable for Flaky {
        fn name(&self) -> String {
            "flaky".to_string()
        }

        async fn fetch(&self) -> Result<Records, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(FetchError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(Records::Vehicles(vec![]))
            }
        }
    }

    #[tokio::test]
    async fn test_poller_recovers_after_failures() {
        let store = Arc::new(FusionStore::new(CDuration::seconds(3600), 5));
        let adapter = Arc::new(Flaky {
            fail_first: 2,
            calls: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();

        let poller = Poller::new(
            SourceId::Tracking,
            adapter,
            store.clone(),
            Duration::from_millis(5),
            BackoffPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(5),
            },
            token.clone(),
        );
        let handle = tokio::spawn(poller.run());

        // Plenty of time for two failures and at least one success
        //
        sleep(Duration::from_millis(300)).await;
        token.cancel();
        handle.await.unwrap();

        let snap = store.snapshot();
        assert!(snap.tracking.last_success_at.is_some());
        assert_eq!(0, snap.tracking.consecutive_failures);
        assert!(snap.tracking.last_error.is_none());
    }

    #[tokio::test]
    async fn test_poller_keeps_retrying_on_permanent_failure() {
        let store = Arc::new(FusionStore::new(CDuration::seconds(3600), 2));
        let adapter = Arc::new(Flaky {
            fail_first: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();

        let poller = Poller::new(
            SourceId::Events,
            adapter,
            store.clone(),
            Duration::from_millis(5),
            BackoffPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(5),
            },
            token.clone(),
        );
        let handle = tokio::spawn(poller.run());

        sleep(Duration::from_millis(300)).await;
        token.cancel();
        handle.await.unwrap();

        let snap = store.snapshot();
        let h = snap.health(SourceId::Events);
        assert!(h.last_error.is_some());
        assert!(h.consecutive_failures >= 2);
        assert!(h.degraded);
        assert!(h.last_success_at.is_none());
    }
}
