//! Engine configuration.

use std::env;

use thiserror::Error;

use supplyline_inventory::DEFAULT_EXPIRATION_WINDOW_DAYS;

pub const ENV_EXPIRATION_WINDOW_DAYS: &str = "SUPPLYLINE_EXPIRATION_WINDOW_DAYS";
pub const ENV_MAX_CONCURRENCY_RETRIES: &str = "SUPPLYLINE_MAX_CONCURRENCY_RETRIES";
pub const ENV_DASHBOARD_TOP_N: &str = "SUPPLYLINE_DASHBOARD_TOP_N";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}' as a number")]
    NotANumber { var: &'static str, value: String },

    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: &'static str },
}

/// Tunables for `FulfillmentEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Look-ahead, in days, for near-expiration alerts.
    pub expiration_window_days: i64,
    /// How many times a ledger mutation is re-decided after losing a version race.
    pub max_concurrency_retries: u32,
    /// Length of the dashboard's top-N lists.
    pub dashboard_top_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiration_window_days: DEFAULT_EXPIRATION_WINDOW_DAYS,
            max_concurrency_retries: 16,
            dashboard_top_n: 5,
        }
    }
}

impl EngineConfig {
    pub fn with_expiration_window_days(mut self, days: i64) -> Self {
        self.expiration_window_days = days;
        self
    }

    pub fn with_max_concurrency_retries(mut self, retries: u32) -> Self {
        self.max_concurrency_retries = retries;
        self
    }

    pub fn with_dashboard_top_n(mut self, n: usize) -> Self {
        self.dashboard_top_n = n;
        self
    }

    /// Defaults overridden by `SUPPLYLINE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(days) = parse::<i64>(&lookup, ENV_EXPIRATION_WINDOW_DAYS)? {
            if days < 0 {
                return Err(ConfigError::OutOfRange {
                    var: ENV_EXPIRATION_WINDOW_DAYS,
                    reason: "must not be negative",
                });
            }
            config.expiration_window_days = days;
        }
        if let Some(retries) = parse::<u32>(&lookup, ENV_MAX_CONCURRENCY_RETRIES)? {
            config.max_concurrency_retries = retries;
        }
        if let Some(n) = parse::<usize>(&lookup, ENV_DASHBOARD_TOP_N)? {
            if n == 0 {
                return Err(ConfigError::OutOfRange {
                    var: ENV_DASHBOARD_TOP_N,
                    reason: "must be at least 1",
                });
            }
            config.dashboard_top_n = n;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::NotANumber { var, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.expiration_window_days, 30);
    }

    #[test]
    fn variables_override_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_EXPIRATION_WINDOW_DAYS, "14"),
            (ENV_MAX_CONCURRENCY_RETRIES, " 3 "),
            (ENV_DASHBOARD_TOP_N, "10"),
        ]))
        .unwrap();

        assert_eq!(
            config,
            EngineConfig::default()
                .with_expiration_window_days(14)
                .with_max_concurrency_retries(3)
                .with_dashboard_top_n(10)
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_MAX_CONCURRENCY_RETRIES, "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotANumber {
                var: ENV_MAX_CONCURRENCY_RETRIES,
                value: "many".to_string()
            }
        );

        let err = EngineConfig::from_lookup(lookup(&[(ENV_DASHBOARD_TOP_N, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }
}
