//! Public lookup operation.

use crate::error::{PhishError, Result};
use crate::loader::PhishRecord;
use crate::normalize::normalize_url;
use crate::refresh::{RefreshCoordinator, KEY_LAST_USED_UTC};
use crate::store::{url_hash_key, CacheStore};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// Lookup verdict returned to the caller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckInfo {
    pub url: String,
    #[serde(rename = "normalizedUrl")]
    pub normalized_url: String,
    pub phish: bool,
    /// Feed record id, reported whenever a record was found, even one
    /// retired by a newer generation.
    #[serde(rename = "phishTankID", skip_serializing_if = "Option::is_none")]
    pub phish_tank_id: Option<String>,
}

/// Answers "is this a known phishing URL?" against the cached feed copy.
#[derive(Clone)]
pub struct PhishChecker {
    store: Arc<dyn CacheStore>,
    refresh: RefreshCoordinator,
}

impl PhishChecker {
    pub fn new(store: Arc<dyn CacheStore>, refresh: RefreshCoordinator) -> Self {
        Self { store, refresh }
    }

    /// Normalizes, refreshes the cache if stale, and applies the lazy
    /// invalidation rule: a record observed before the latest reload was not
    /// re-confirmed by it and no longer counts as a phish.
    pub async fn check(&self, raw_url: &str) -> Result<CheckInfo> {
        // Normalization failures surface before any cache traffic.
        let normalized_url = normalize_url(raw_url)?;

        self.refresh.ensure_fresh().await?;

        let mut info = CheckInfo {
            url: raw_url.to_string(),
            normalized_url,
            phish: false,
            phish_tank_id: None,
        };

        let key = url_hash_key(&info.normalized_url);
        let Some(raw_record) = self.store.get(&key).await? else {
            return Ok(info);
        };
        let record: PhishRecord = serde_json::from_str(&raw_record).map_err(|e| {
            PhishError::CacheFault(format!("corrupt cache record under {}: {}", key, e))
        })?;

        let last_used_utc = self
            .store
            .get(KEY_LAST_USED_UTC)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());

        let retired = matches!(last_used_utc, Some(utc) if utc > record.observed_utc);
        if retired {
            debug!(
                "Record {} predates generation {:?}, treating as retired",
                record.id, last_used_utc
            );
        } else {
            info.phish = true;
        }
        info.phish_tank_id = Some(record.id);

        Ok(info)
    }

    /// Administrative full flush of the cache service.
    pub async fn reset(&self) -> Result<()> {
        self.store.flush_all().await
    }
}
