use super::{feed_body, harness, RECORD_TTL};
use crate::error::PhishError;
use crate::refresh::{KEY_LAST_USED_ETAG, KEY_LAST_USED_UTC};
use crate::store::{url_hash_key, CacheStore};
use crate::testing::ScriptedFeed;
use pretty_assertions::assert_eq;
use std::time::Duration;

const T0: i64 = 1406876400;
const T1: i64 = T0 + 86_400;

#[tokio::test(start_paused = true)]
async fn two_generation_scenario_retires_unconfirmed_records() {
    let h = harness(ScriptedFeed::new(
        "\"gen-0\"",
        T0,
        &feed_body(&[("1", "http://evil.example/a"), ("2", "http://evil.example/b")]),
    ));

    // First lookup leads the initial load.
    let info = h.checker.check("http://evil.example/a").await.unwrap();
    assert!(info.phish);
    assert_eq!(info.phish_tank_id.as_deref(), Some("1"));
    assert_eq!(info.normalized_url, "http://evil.example/a");

    let info = h.checker.check("http://evil.example/b").await.unwrap();
    assert!(info.phish);
    assert_eq!(info.phish_tank_id.as_deref(), Some("2"));

    assert_eq!(h.feed.probe_count(), 1);
    assert_eq!(h.feed.download_count(), 1);

    // A newer snapshot no longer lists row 1.
    h.feed.publish(
        "\"gen-1\"",
        T1,
        &feed_body(&[("2", "http://evil.example/b")]),
    );
    // Let the pending lease from the first reload expire.
    tokio::time::advance(Duration::from_secs(16)).await;

    let info = h.checker.check("http://evil.example/b").await.unwrap();
    assert!(info.phish);
    assert_eq!(info.phish_tank_id.as_deref(), Some("2"));
    assert_eq!(h.feed.download_count(), 2);

    // Row 1 was not re-confirmed: lazily invalidated, never deleted.
    let info = h.checker.check("http://evil.example/a").await.unwrap();
    assert!(!info.phish);
    assert_eq!(info.phish_tank_id.as_deref(), Some("1"));
    assert!(h
        .store
        .get(&url_hash_key("http://evil.example/a"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn record_predating_last_reload_is_not_a_phish() {
    let h = harness(ScriptedFeed::new("\"e1\"", T0, super::FEED_HEADER));

    let key = url_hash_key("http://old.example/p");
    h.store
        .set(
            &key,
            r#"{"id":"77","url":"http://old.example/p","observed-utc":100}"#,
            RECORD_TTL,
        )
        .await
        .unwrap();
    h.store
        .set(KEY_LAST_USED_UTC, "200", RECORD_TTL)
        .await
        .unwrap();
    // Matching ledger ETag keeps ensure_fresh on the touch path.
    h.store
        .set(KEY_LAST_USED_ETAG, "\"e1\"", RECORD_TTL)
        .await
        .unwrap();

    let info = h.checker.check("http://old.example/p").await.unwrap();
    assert!(!info.phish);
    assert_eq!(info.phish_tank_id.as_deref(), Some("77"));
    assert_eq!(h.feed.download_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn record_at_current_generation_is_a_phish() {
    let h = harness(ScriptedFeed::new("\"e1\"", T0, super::FEED_HEADER));

    let key = url_hash_key("http://fresh.example/p");
    h.store
        .set(
            &key,
            r#"{"id":"88","url":"http://fresh.example/p","observed-utc":200}"#,
            RECORD_TTL,
        )
        .await
        .unwrap();
    h.store
        .set(KEY_LAST_USED_UTC, "200", RECORD_TTL)
        .await
        .unwrap();
    h.store
        .set(KEY_LAST_USED_ETAG, "\"e1\"", RECORD_TTL)
        .await
        .unwrap();

    let info = h.checker.check("http://fresh.example/p").await.unwrap();
    assert!(info.phish);
    assert_eq!(info.phish_tank_id.as_deref(), Some("88"));
}

#[tokio::test(start_paused = true)]
async fn missing_generation_marker_keeps_found_records_phishy() {
    let h = harness(ScriptedFeed::new("\"e1\"", T0, super::FEED_HEADER));

    let key = url_hash_key("http://limbo.example/p");
    h.store
        .set(
            &key,
            r#"{"id":"99","url":"http://limbo.example/p","observed-utc":100}"#,
            RECORD_TTL,
        )
        .await
        .unwrap();
    h.store
        .set(KEY_LAST_USED_ETAG, "\"e1\"", RECORD_TTL)
        .await
        .unwrap();

    let info = h.checker.check("http://limbo.example/p").await.unwrap();
    assert!(info.phish);
}

#[tokio::test(start_paused = true)]
async fn invalid_url_never_touches_the_store() {
    let h = harness(ScriptedFeed::new("\"e1\"", T0, super::FEED_HEADER));

    let err = h.checker.check("not a url").await.unwrap_err();
    assert!(matches!(err, PhishError::InvalidUrl(_)));
    assert_eq!(h.store.op_count(), 0);
    assert_eq!(h.feed.probe_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_url_is_not_a_phish() {
    let h = harness(ScriptedFeed::new(
        "\"e1\"",
        T0,
        &feed_body(&[("1", "http://evil.example/a")]),
    ));

    let info = h.checker.check("http://benign.example/x").await.unwrap();
    assert!(!info.phish);
    assert_eq!(info.phish_tank_id, None);
}

#[tokio::test(start_paused = true)]
async fn cache_fault_propagates_to_the_caller() {
    let h = harness(ScriptedFeed::new("\"e1\"", T0, super::FEED_HEADER));

    h.store.poison();
    let err = h.checker.check("http://evil.example/a").await.unwrap_err();
    assert!(matches!(err, PhishError::CacheFault(_)));
}

#[tokio::test(start_paused = true)]
async fn reset_flushes_records_and_ledger() {
    let h = harness(ScriptedFeed::new(
        "\"e1\"",
        T0,
        &feed_body(&[("1", "http://evil.example/a")]),
    ));

    let info = h.checker.check("http://evil.example/a").await.unwrap();
    assert!(info.phish);

    h.checker.reset().await.unwrap();
    assert!(h
        .store
        .get(&url_hash_key("http://evil.example/a"))
        .await
        .unwrap()
        .is_none());
    assert!(h.store.get(KEY_LAST_USED_ETAG).await.unwrap().is_none());
}
