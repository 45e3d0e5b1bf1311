//! Remote feed client boundary.
//!
//! The feed publisher exposes the current database as one large CSV document
//! behind plain HTTP, versioned by `ETag` and `Last-Modified`. Consumers are
//! expected to probe with HEAD and only download when the validators moved.

use crate::config::Config;
use crate::error::{PhishError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use log::debug;
use reqwest::header::{HeaderMap, ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use std::time::Duration;

/// Probe timeout, deliberately shorter than the pending-lease TTL so a hung
/// probe cannot outlive the lease that authorized it.
const PROBE_TIMEOUT: Duration = Duration::from_secs(7);

/// Validator headers of one published feed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedValidators {
    pub etag: String,
    pub last_modified: String,
    /// `last_modified` parsed into a UTC unix timestamp; this becomes the
    /// freshness generation stamped on every record of a reload.
    pub utc: i64,
}

/// An open streaming download of the feed body plus its own validators.
pub struct FeedBody {
    pub validators: FeedValidators,
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
}

/// Operations consumed from the remote feed transport.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Metadata-only freshness probe (HEAD-equivalent).
    async fn probe(&self) -> Result<FeedValidators>;

    /// Streaming download of the feed body. The response's own validators are
    /// re-extracted rather than trusting an earlier probe.
    async fn open_stream(&self, if_none_match: Option<&str>) -> Result<FeedBody>;
}

/// HTTP implementation over reqwest. Decompression is delegated to the
/// transport (gzip content negotiation) instead of picking a compressed
/// artifact suffix by hand.
pub struct HttpFeedClient {
    http: reqwest::Client,
    data_url: String,
}

impl HttpFeedClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PhishError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            data_url: cfg.feed_data_url(),
        })
    }
}

#[async_trait]
impl FeedTransport for HttpFeedClient {
    async fn probe(&self) -> Result<FeedValidators> {
        debug!("HEAD probe of {}", self.data_url);
        let resp = self
            .http
            .head(&self.data_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PhishError::Transport(format!(
                "unexpected feed response code {}",
                status.as_u16()
            )));
        }
        extract_validators(resp.headers())
    }

    async fn open_stream(&self, if_none_match: Option<&str>) -> Result<FeedBody> {
        debug!("GET stream of {}", self.data_url);
        let mut req = self.http.get(&self.data_url);
        if let Some(etag) = if_none_match {
            req = req.header(IF_NONE_MATCH, etag);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PhishError::Transport(format!(
                "unexpected feed response code {}",
                status.as_u16()
            )));
        }
        let validators = extract_validators(resp.headers())?;
        let stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();
        Ok(FeedBody { validators, stream })
    }
}

/// Extracts `ETag` and `Last-Modified`, requiring exactly one non-empty value
/// of each. A duplicated or empty validator means the publisher's response is
/// not trustworthy enough to ingest from.
pub fn extract_validators(headers: &HeaderMap) -> Result<FeedValidators> {
    let etag = single_header(headers, &ETAG)?;
    let last_modified = single_header(headers, &LAST_MODIFIED)?;

    let utc = DateTime::parse_from_rfc2822(&last_modified)
        .map_err(|e| {
            PhishError::Ingestion(format!("unable to get time from Last-Modified: {}", e))
        })?
        .timestamp();

    Ok(FeedValidators {
        etag,
        last_modified,
        utc,
    })
}

fn single_header(headers: &HeaderMap, name: &reqwest::header::HeaderName) -> Result<String> {
    let mut values = headers.get_all(name).iter();
    let first = values
        .next()
        .ok_or_else(|| PhishError::Ingestion(format!("header {} is absent", name)))?;
    if values.next().is_some() {
        return Err(PhishError::Ingestion(format!("ambiguous header {}", name)));
    }
    let value = first
        .to_str()
        .map_err(|_| PhishError::Ingestion(format!("header {} is not valid text", name)))?
        .trim()
        .to_string();
    if value.is_empty() {
        return Err(PhishError::Ingestion(format!(
            "missed value for header {}",
            name
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn extracts_both_validators() {
        let map = headers(&[
            ("etag", "\"Fri, 01 Aug 2014 07:00:00\""),
            ("last-modified", "Fri, 01 Aug 2014 07:00:00 GMT"),
        ]);
        let v = extract_validators(&map).unwrap();
        assert_eq!(v.etag, "\"Fri, 01 Aug 2014 07:00:00\"");
        assert_eq!(v.utc, 1406876400);
    }

    #[test]
    fn missing_validator_is_an_ingestion_error() {
        let map = headers(&[("etag", "\"x\"")]);
        assert!(matches!(
            extract_validators(&map),
            Err(PhishError::Ingestion(_))
        ));
    }

    #[test]
    fn duplicated_validator_is_ambiguous() {
        let map = headers(&[
            ("etag", "\"a\""),
            ("etag", "\"b\""),
            ("last-modified", "Fri, 01 Aug 2014 07:00:00 GMT"),
        ]);
        assert!(matches!(
            extract_validators(&map),
            Err(PhishError::Ingestion(_))
        ));
    }

    #[test]
    fn empty_validator_value_is_rejected() {
        let map = headers(&[
            ("etag", " "),
            ("last-modified", "Fri, 01 Aug 2014 07:00:00 GMT"),
        ]);
        assert!(matches!(
            extract_validators(&map),
            Err(PhishError::Ingestion(_))
        ));
    }

    #[test]
    fn unparseable_last_modified_is_rejected() {
        let map = headers(&[("etag", "\"x\""), ("last-modified", "yesterday-ish")]);
        assert!(matches!(
            extract_validators(&map),
            Err(PhishError::Ingestion(_))
        ));
    }
}
