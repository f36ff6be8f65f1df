//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use ambassador_core::ThresholdConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the ledger lives in memory and only the default thresholds apply.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub point_api_url: String,
    pub point_api_timeout: Duration,
    pub cors_origin: String,
    /// Shared secret for the admin endpoints. Admin routes are refused when unset.
    pub admin_token: Option<String>,
    /// Used whenever the stored threshold config cannot be read.
    pub default_thresholds: ThresholdConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address: SocketAddr = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000")?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        let admin_token = lookup("ADMIN_TOKEN").filter(|token| !token.trim().is_empty());

        // --- Remote Point API ---
        let point_api_url = lookup("POINT_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| ConfigError::MissingVar("POINT_API_URL".to_string()))?;
        let timeout_secs: u64 = parse_or(&lookup, "POINT_API_TIMEOUT_SECS", "10")?;

        // --- Default Viewing Thresholds ---
        let default_thresholds = ThresholdConfig {
            duration50: parse_or(&lookup, "MIN_VIEWING_TIME_50", "30")?,
            duration100: parse_or(&lookup, "MIN_VIEWING_TIME_100", "60")?,
            milestone50_enabled: parse_or(&lookup, "MILESTONE_50_ENABLED", "true")?,
            cooldown_secs: parse_or(&lookup, "VIEW_COOLDOWN_SECS", "86400")?,
        };
        default_thresholds
            .validate()
            .map_err(|e| ConfigError::InvalidValue("MIN_VIEWING_TIME_*".to_string(), e))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            point_api_url,
            point_api_timeout: Duration::from_secs(timeout_secs),
            cors_origin,
            admin_token,
            default_thresholds,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = Config::from_lookup(lookup(&[("POINT_API_URL", "https://points.example/")]))
            .unwrap();
        assert_eq!(config.point_api_url, "https://points.example");
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.point_api_timeout, Duration::from_secs(10));
        assert_eq!(
            config.default_thresholds,
            ThresholdConfig {
                duration50: 30,
                duration100: 60,
                milestone50_enabled: true,
                cooldown_secs: 86_400,
            }
        );
    }

    #[test]
    fn missing_point_api_url_is_an_error() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "POINT_API_URL"));
    }

    #[test]
    fn invalid_numbers_are_reported_with_their_variable() {
        let err = Config::from_lookup(lookup(&[
            ("POINT_API_URL", "https://points.example"),
            ("MIN_VIEWING_TIME_100", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "MIN_VIEWING_TIME_100"));
    }

    #[test]
    fn inverted_default_thresholds_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("POINT_API_URL", "https://points.example"),
            ("MIN_VIEWING_TIME_50", "90"),
            ("MIN_VIEWING_TIME_100", "60"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_, _)));
    }

    #[test]
    fn empty_database_url_means_in_memory() {
        let config = Config::from_lookup(lookup(&[
            ("POINT_API_URL", "https://points.example"),
            ("DATABASE_URL", ""),
        ]))
        .unwrap();
        assert!(config.database_url.is_none());
    }
}
