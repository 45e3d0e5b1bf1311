//! Refresh coordination.
//!
//! All coordination state lives in the cache service under a handful of fixed
//! ledger keys, so any number of processes can share one refresh schedule
//! without in-process locks. The pending marker is a lease, not a lock with a
//! release: it expires on its own, so a crashed leader delays the next
//! refresh by at most the pending TTL.

use crate::error::Result;
use crate::feed::FeedTransport;
use crate::loader::BulkLoader;
use crate::store::{CacheStore, StoreOutcome};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Sentinel marking a freshness check in flight or recently completed.
pub const KEY_HEAD_REQUEST_RECENTLY: &str = "head-request-recently";
/// ETag confirmed by the most recent successful probe or reload.
pub const KEY_LAST_USED_ETAG: &str = "last-used-etag";
/// Freshness generation stamped at the end of the most recent full reload.
pub const KEY_LAST_USED_UTC: &str = "last-used-utc";

/// Lease TTL while a check/reload is presumed in flight.
pub const HEAD_PENDING_TTL: Duration = Duration::from_secs(15);
/// Marker TTL after a probe confirmed the feed is unchanged.
pub const HEAD_CHECKED_TTL: Duration = Duration::from_secs(60);
/// Retention of the ledger validators; roughly 23 days.
pub const LEDGER_RETENTION_TTL: Duration = Duration::from_secs(2_000_000);

const FOLLOWER_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Wall-clock budget for the follower wait; one poll interval longer than the
/// pending lease so a silent leader death still releases followers.
const FOLLOWER_WAIT_BUDGET: Duration = Duration::from_secs(16);

/// Decides whether the cached feed copy needs refreshing and elects who does
/// it. Shares no in-process state; clones are independent handles onto the
/// same ledger.
#[derive(Clone)]
pub struct RefreshCoordinator {
    store: Arc<dyn CacheStore>,
    feed: Arc<dyn FeedTransport>,
    loader: BulkLoader,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        feed: Arc<dyn FeedTransport>,
        loader: BulkLoader,
    ) -> Self {
        Self {
            store,
            feed,
            loader,
        }
    }

    /// Ensures the cached feed copy is acceptably fresh before a lookup.
    ///
    /// Best-effort: remote-feed failures are logged and swallowed so lookups
    /// keep serving whatever is cached. Only a `CacheFault` propagates.
    pub async fn ensure_fresh(&self) -> Result<()> {
        // Fast path: a check is in flight or happened recently.
        if self.store.get(KEY_HEAD_REQUEST_RECENTLY).await?.is_some() {
            return Ok(());
        }

        match self
            .store
            .add(KEY_HEAD_REQUEST_RECENTLY, "updating", HEAD_PENDING_TTL)
            .await?
        {
            StoreOutcome::Stored => {}
            _ => {
                // Lost the race: another caller holds the lease. Wait for it
                // to publish an ETag in case the cache is being filled for
                // the first time, then serve from whatever is there.
                self.follow().await?;
                return Ok(());
            }
        }

        // Probe failures are always Transport/Ingestion, never fatal: the
        // lease is left to expire naturally and the next caller after the
        // pending TTL retries from scratch.
        let probed = match self.feed.probe().await {
            Ok(validators) => validators,
            Err(e) => {
                warn!("Freshness probe failed, serving cached data: {}", e);
                return Ok(());
            }
        };

        let cached_etag = self.store.get(KEY_LAST_USED_ETAG).await?;
        if cached_etag.as_deref() == Some(probed.etag.as_str()) {
            debug!("Feed unchanged (etag {}), extending ledger TTLs", probed.etag);
            self.store
                .touch(KEY_HEAD_REQUEST_RECENTLY, HEAD_CHECKED_TTL)
                .await?;
            self.store
                .touch(KEY_LAST_USED_ETAG, LEDGER_RETENTION_TTL)
                .await?;
            return Ok(());
        }

        info!(
            "Feed changed (etag {:?} -> {}), starting reload",
            cached_etag, probed.etag
        );
        match self.loader.reload(Some(&probed.etag)).await {
            Ok(stats) => info!(
                "Reload finished: {} inserted, {} refreshed, {} skipped",
                stats.inserted, stats.refreshed, stats.skipped
            ),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Reload failed, serving cached data: {}", e),
        }

        Ok(())
    }

    /// Follower wait: poll for the leader's ETag under a fixed elapsed-time
    /// budget, then give up silently. Followers never probe the feed.
    pub(crate) async fn follow(&self) -> Result<()> {
        let deadline = Instant::now() + FOLLOWER_WAIT_BUDGET;
        loop {
            if Instant::now() >= deadline {
                debug!("Follower wait budget expired");
                return Ok(());
            }
            sleep(FOLLOWER_POLL_INTERVAL).await;
            if self.store.get(KEY_LAST_USED_ETAG).await?.is_some() {
                return Ok(());
            }
        }
    }
}
