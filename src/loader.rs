//! Streaming feed ingestion.
//!
//! The feed is one CSV document with a header row; each data row carries the
//! publisher's record id and the phishing URL. Ingestion streams the body row
//! by row into the cache, stamping every record with the snapshot's freshness
//! generation. Stale records are never deleted: advancing `last-used-utc`
//! past their generation makes them invisible to lookups.

use crate::error::{PhishError, Result};
use crate::feed::FeedTransport;
use crate::normalize::normalize_url;
use crate::refresh::{KEY_LAST_USED_ETAG, KEY_LAST_USED_UTC, LEDGER_RETENTION_TTL};
use crate::store::{url_hash_key, CacheStore, StoreOutcome};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;

/// Cache value stored per normalized URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhishRecord {
    /// Feed-assigned record identifier.
    pub id: String,
    pub url: String,
    /// Freshness generation at which this record was last confirmed present.
    #[serde(rename = "observed-utc")]
    pub observed_utc: i64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReloadStats {
    pub inserted: u64,
    pub refreshed: u64,
    pub skipped: u64,
}

/// Write phase of one ingestion pass. Feed rows are emitted append-like, new
/// entries first, so the cheap insert path is tried until it reports a known
/// key, after which the pass stays on the update path. A performance policy
/// only: both modes are idempotent, so correctness holds for any row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePhase {
    Insert,
    Replace,
}

#[derive(Clone)]
pub struct BulkLoader {
    store: Arc<dyn CacheStore>,
    feed: Arc<dyn FeedTransport>,
    record_ttl: Duration,
}

impl BulkLoader {
    pub fn new(
        store: Arc<dyn CacheStore>,
        feed: Arc<dyn FeedTransport>,
        record_ttl: Duration,
    ) -> Self {
        Self {
            store,
            feed,
            record_ttl,
        }
    }

    /// Streams the feed body into the cache and advances the freshness
    /// generation.
    ///
    /// The response's own validators are re-extracted by the transport; on
    /// any validator problem the reload aborts with the ledger untouched, so
    /// the next `ensure_fresh` retries from the probe step. A malformed
    /// single row is logged and skipped, never fatal. Partial completion is
    /// acceptable: rows not reached simply stay at their old generation.
    pub async fn reload(&self, expected_etag: Option<&str>) -> Result<ReloadStats> {
        let body = self.feed.open_stream(expected_etag).await?;
        let generation = body.validators.utc;

        // Published early so late-arriving followers stop waiting; lookups
        // still compare against the old generation until it is committed.
        self.store
            .set(
                KEY_LAST_USED_ETAG,
                &body.validators.etag,
                LEDGER_RETENTION_TTL,
            )
            .await?;

        let reader = StreamReader::new(body.stream);
        let mut csv = csv_async::AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .create_reader(reader);

        let mut stats = ReloadStats::default();
        let mut phase = WritePhase::Insert;
        let mut records = csv.records();

        while let Some(row) = records.next().await {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable feed row: {}", e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let (feed_id, raw_url) = match (row.get(0), row.get(1)) {
                (Some(id), Some(url)) => (id, url),
                _ => {
                    warn!("Skipping short feed row: {:?}", row);
                    stats.skipped += 1;
                    continue;
                }
            };

            let normalized = match normalize_url(raw_url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping feed row {}: {}", feed_id, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let key = url_hash_key(&normalized);
            let record = PhishRecord {
                id: feed_id.to_string(),
                url: normalized,
                observed_utc: generation,
            };
            let value = serde_json::to_string(&record).map_err(|e| {
                PhishError::CacheFault(format!("record encoding failed: {}", e))
            })?;

            if phase == WritePhase::Insert {
                match self.store.add(&key, &value, self.record_ttl).await? {
                    StoreOutcome::Stored => {
                        stats.inserted += 1;
                        continue;
                    }
                    _ => {
                        // First already-known row: the rest of this pass is
                        // re-confirmation of existing records.
                        debug!("Switching to update phase at feed row {}", feed_id);
                        phase = WritePhase::Replace;
                    }
                }
            }

            match self.store.replace(&key, &value, self.record_ttl).await? {
                StoreOutcome::Stored => stats.refreshed += 1,
                _ => {
                    debug!("Feed row {} absent during update phase", feed_id);
                    stats.skipped += 1;
                }
            }
        }

        // Committing the new generation is what retires every record the
        // stream did not re-confirm.
        self.store
            .set(
                KEY_LAST_USED_UTC,
                &generation.to_string(),
                LEDGER_RETENTION_TTL,
            )
            .await?;

        info!(
            "Ingested feed generation {} under etag {}",
            generation, body.validators.etag
        );
        Ok(stats)
    }
}
