//! Integration tests wiring the checker, coordinator and loader against the
//! in-memory store and the scripted feed.

mod checker_test;

use crate::checker::PhishChecker;
use crate::loader::BulkLoader;
use crate::refresh::RefreshCoordinator;
use crate::testing::{MemoryStore, ScriptedFeed};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const RECORD_TTL: Duration = Duration::from_secs(2_000_000);

pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub feed: Arc<ScriptedFeed>,
    pub loader: BulkLoader,
    pub coordinator: RefreshCoordinator,
    pub checker: PhishChecker,
}

pub(crate) fn harness(feed: ScriptedFeed) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(feed);
    let loader = BulkLoader::new(store.clone(), feed.clone(), RECORD_TTL);
    let coordinator = RefreshCoordinator::new(store.clone(), feed.clone(), loader.clone());
    let checker = PhishChecker::new(store.clone(), coordinator.clone());
    Harness {
        store,
        feed,
        loader,
        coordinator,
        checker,
    }
}

pub(crate) const FEED_HEADER: &str = "phish_id,url,phish_detail_url\n";

pub(crate) fn feed_body(rows: &[(&str, &str)]) -> String {
    let mut body = FEED_HEADER.to_string();
    for (id, url) in rows {
        body.push_str(&format!(
            "{},{},http://phishtank.example/detail/{}\n",
            id, url, id
        ));
    }
    body
}
