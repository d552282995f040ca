use chrono::Duration;
use serde::Deserialize;

const DEFAULT_STALE_AFTER_SECS: u64 = 5 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for every request path. Empty means paths are used as-is.
    pub api_url: String,
    pub stale_after_secs: u64,
    pub access_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            access_token: None,
        }
    }
}

impl ClientConfig {
    /// Read `EVENTS_API_URL`, `EVENTS_STALE_AFTER_SECS` and
    /// `EVENTS_ACCESS_TOKEN`, loading a `.env` file first if there is one.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let stale_after_secs = match var("EVENTS_STALE_AFTER_SECS") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("Invalid EVENTS_STALE_AFTER_SECS `{raw}`, using default");
                defaults.stale_after_secs
            }),
            None => defaults.stale_after_secs,
        };

        Self {
            api_url: var("EVENTS_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            stale_after_secs,
            access_token: var("EVENTS_ACCESS_TOKEN").filter(|t| !t.is_empty()),
        }
    }

    pub fn stale_after(&self) -> Duration {
        i64::try_from(self.stale_after_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.stale_after(), Duration::minutes(5));
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = from_map(&[
            ("EVENTS_API_URL", "http://localhost:1488/"),
            ("EVENTS_STALE_AFTER_SECS", "30"),
            ("EVENTS_ACCESS_TOKEN", "abc"),
        ]);
        assert_eq!(config.api_url, "http://localhost:1488");
        assert_eq!(config.stale_after(), Duration::seconds(30));
        assert_eq!(config.access_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_bad_staleness_falls_back() {
        let config = from_map(&[("EVENTS_STALE_AFTER_SECS", "soon"), ("EVENTS_ACCESS_TOKEN", "")]);
        assert_eq!(config.stale_after_secs, DEFAULT_STALE_AFTER_SECS);
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig = serde_json::from_str(r#"{"stale_after_secs": 60}"#).unwrap();
        assert_eq!(config.stale_after_secs, 60);
        assert_eq!(config.api_url, "");
    }
}
