use crate::error::{AnnotatorError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_CACHE_TTL_SECS: &str = "METRICS_CACHE_TTL_SECS";
pub const ENV_HISTORY_LIMIT: &str = "CHAT_HISTORY_LIMIT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnnotatorConfig {
    #[schemars(description = "Seconds a firm's metric listing stays cached before it is refetched")]
    pub metrics_cache_ttl_secs: u64,

    #[schemars(description = "Most recent chat messages kept as model context")]
    pub chat_history_limit: usize,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            metrics_cache_ttl_secs: 300,
            chat_history_limit: 20,
        }
    }
}

impl AnnotatorConfig {
    pub fn metrics_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_cache_ttl_secs)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any of the `METRICS_CACHE_TTL_SECS` / `CHAT_HISTORY_LIMIT`
    /// variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ttl) = parse_var(&lookup, ENV_CACHE_TTL_SECS)? {
            config.metrics_cache_ttl_secs = ttl;
        }
        if let Some(limit) = parse_var(&lookup, ENV_HISTORY_LIMIT)? {
            config.chat_history_limit = limit;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat_history_limit == 0 {
            return Err(AnnotatorError::Config {
                key: "chat_history_limit".to_string(),
                details: "must keep at least one message".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AnnotatorError::Config {
                key: key.to_string(),
                details: format!("{:?}: {}", raw, e),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.metrics_cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.chat_history_limit, 20);
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENV_CACHE_TTL_SECS, " 60 "), (ENV_HISTORY_LIMIT, "8")]);
        let config =
            AnnotatorConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.metrics_cache_ttl_secs, 60);
        assert_eq!(config.chat_history_limit, 8);
    }

    #[test]
    fn test_bad_value_is_rejected() {
        let result = AnnotatorConfig::from_lookup(|key| {
            (key == ENV_CACHE_TTL_SECS).then(|| "five minutes".to_string())
        });

        match result {
            Err(AnnotatorError::Config { key, .. }) => assert_eq!(key, ENV_CACHE_TTL_SECS),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_json_partial_document() {
        let config = AnnotatorConfig::from_json(r#"{"chat_history_limit": 4}"#).unwrap();
        assert_eq!(config.chat_history_limit, 4);
        assert_eq!(config.metrics_cache_ttl_secs, 300);

        assert!(AnnotatorConfig::from_json(r#"{"chat_history_limit": 0}"#).is_err());
    }
}
