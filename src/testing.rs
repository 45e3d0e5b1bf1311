//! Test doubles for the external collaborators.
//!
//! `MemoryStore` mimics the cache service's conditional-write semantics with
//! TTLs measured on the tokio clock, so paused-clock tests can expire leases
//! by advancing time. `ScriptedFeed` serves canned snapshots and counts how
//! often it is probed.

use crate::error::{PhishError, Result};
use crate::feed::{FeedBody, FeedTransport, FeedValidators};
use crate::store::{CacheStore, StoreOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory `CacheStore` with real TTL semantics on the tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    ops: AtomicUsize,
    poisoned: AtomicBool,
    add_poisoned: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total cache operations issued, for asserting a code path never
    /// touched the store.
    pub fn op_count(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    /// Makes every subsequent operation fail as a `CacheFault`.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    /// Makes only `add` fail as a `CacheFault`, so a pass can get past the
    /// ledger writes and die on its first conditional row write.
    pub fn poison_adds(&self) {
        self.add_poisoned.store(true, Ordering::SeqCst);
    }

    fn check_health(&self) -> Result<()> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(PhishError::CacheFault("memory store poisoned".to_string()));
        }
        Ok(())
    }

    fn live_value(entries: &mut HashMap<String, Entry>, key: &str) -> Option<String> {
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_health()?;
        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_health()?;
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome> {
        self.check_health()?;
        if self.add_poisoned.load(Ordering::SeqCst) {
            return Err(PhishError::CacheFault(
                "memory store add poisoned".to_string(),
            ));
        }
        let mut entries = self.entries.lock().unwrap();
        if Self::live_value(&mut entries, key).is_some() {
            return Ok(StoreOutcome::AlreadyExists);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(StoreOutcome::Stored)
    }

    async fn replace(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome> {
        self.check_health()?;
        let mut entries = self.entries.lock().unwrap();
        if Self::live_value(&mut entries, key).is_none() {
            return Ok(StoreOutcome::Absent);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(StoreOutcome::Stored)
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        self.check_health()?;
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            if entry.expires_at > Instant::now() {
                entry.expires_at = Instant::now() + ttl;
            }
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.check_health()?;
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

struct FeedSnapshot {
    etag: String,
    utc: i64,
    body: String,
    fail: bool,
}

/// Scripted `FeedTransport` serving a replaceable snapshot.
pub struct ScriptedFeed {
    snapshot: Mutex<FeedSnapshot>,
    probes: AtomicUsize,
    downloads: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(etag: &str, utc: i64, body: &str) -> Self {
        Self {
            snapshot: Mutex::new(FeedSnapshot {
                etag: etag.to_string(),
                utc,
                body: body.to_string(),
                fail: false,
            }),
            probes: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Replaces the served snapshot, as the publisher would between reloads.
    pub fn publish(&self, etag: &str, utc: i64, body: &str) {
        let mut snapshot = self.snapshot.lock().unwrap();
        snapshot.etag = etag.to_string();
        snapshot.utc = utc;
        snapshot.body = body.to_string();
    }

    /// Makes probe and download fail with a transport error.
    pub fn go_offline(&self) {
        self.snapshot.lock().unwrap().fail = true;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn validators(snapshot: &FeedSnapshot) -> FeedValidators {
        let last_modified = DateTime::from_timestamp(snapshot.utc, 0)
            .map(|t| t.to_rfc2822())
            .unwrap_or_default();
        FeedValidators {
            etag: snapshot.etag.clone(),
            last_modified,
            utc: snapshot.utc,
        }
    }
}

#[async_trait]
impl FeedTransport for ScriptedFeed {
    async fn probe(&self) -> Result<FeedValidators> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.snapshot.lock().unwrap();
        if snapshot.fail {
            return Err(PhishError::Transport("feed offline".to_string()));
        }
        Ok(Self::validators(&snapshot))
    }

    async fn open_stream(&self, _if_none_match: Option<&str>) -> Result<FeedBody> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.snapshot.lock().unwrap();
        if snapshot.fail {
            return Err(PhishError::Transport("feed offline".to_string()));
        }
        let chunks: Vec<std::io::Result<Bytes>> = vec![Ok(Bytes::from(snapshot.body.clone()))];
        Ok(FeedBody {
            validators: Self::validators(&snapshot),
            stream: futures::stream::iter(chunks).boxed(),
        })
    }
}
