use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub redis_url: String,
    /// TTL for individual phish records; defaults to the ledger retention
    /// window (~23 days) so records outlive several reload cycles.
    pub record_ttl_secs: u64,
    pub feed_base_url: String,
    /// Application token granted by the feed publisher; inserted as a path
    /// segment of the data URL when present.
    pub feed_token: Option<String>,
    pub listen_port: u16,
    pub log_level: Option<String>,
}

impl Config {
    /// Loads configuration from the specified TOML file using the `config`
    /// crate.
    pub fn load(config_path: &Path) -> Result<Self, ::config::ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(config_path))
            .build()?;
        settings.try_deserialize()
    }

    /// Loads configuration from environment variables, reading a `.env` file
    /// first when one exists. Unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, crate::error::PhishError> {
        dotenv::dotenv().ok();

        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let parse_u64 = |name: &str, default: u64| -> Result<u64, crate::error::PhishError> {
            match var(name) {
                Some(raw) => raw.parse().map_err(|_| {
                    crate::error::PhishError::Config(format!("{} is not a number: {}", name, raw))
                }),
                None => Ok(default),
            }
        };

        Ok(Self {
            redis_url: var("PHISHGUARD_REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1/".to_string()),
            record_ttl_secs: parse_u64("PHISHGUARD_RECORD_TTL_SECS", 2_000_000)?,
            feed_base_url: var("PHISHGUARD_FEED_BASE_URL")
                .unwrap_or_else(|| "http://data.phishtank.com/data/".to_string()),
            feed_token: var("PHISHGUARD_FEED_TOKEN"),
            listen_port: parse_u64("PHISHGUARD_LISTEN_PORT", 8080)? as u16,
            log_level: var("PHISHGUARD_LOG_LEVEL"),
        })
    }

    /// Full URL of the published feed document.
    pub fn feed_data_url(&self) -> String {
        let mut url = self.feed_base_url.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        if let Some(token) = &self.feed_token {
            url.push_str(token);
            url.push('/');
        }
        url.push_str("online-valid.csv");
        url
    }

    pub fn test_default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".to_string(),
            record_ttl_secs: 2_000_000,
            feed_base_url: "http://data.phishtank.com/data/".to_string(),
            feed_token: None,
            listen_port: 8080,
            log_level: Some("info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_url_without_token() {
        let cfg = Config::test_default();
        assert_eq!(
            cfg.feed_data_url(),
            "http://data.phishtank.com/data/online-valid.csv"
        );
    }

    #[test]
    fn data_url_with_token() {
        let cfg = Config {
            feed_token: Some("abc123".to_string()),
            ..Config::test_default()
        };
        assert_eq!(
            cfg.feed_data_url(),
            "http://data.phishtank.com/data/abc123/online-valid.csv"
        );
    }
}
