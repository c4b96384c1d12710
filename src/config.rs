// Application configuration read from the environment

use std::time::Duration;
use thiserror::Error;

use crate::coupons::engine::EngineSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub lookup_timeout: Duration,
    pub redeem_max_attempts: u32,
}

impl AppConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// if it is set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;
        let lookup_timeout_ms = parse_or(&lookup, "LOOKUP_TIMEOUT_MS", 3000u64)?;
        let redeem_max_attempts = parse_or(&lookup, "REDEEM_MAX_ATTEMPTS", 3u32)?;

        if redeem_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "REDEEM_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required",
            });
        }
        if lookup_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "LOOKUP_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "timeout must be positive",
            });
        }

        Ok(Self {
            database_url,
            host,
            port,
            db_max_connections,
            lookup_timeout: Duration::from_millis(lookup_timeout_ms),
            redeem_max_attempts,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            lookup_timeout: self.lookup_timeout,
            max_attempts: self.redeem_max_attempts,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            reason: "not a valid number",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/coupons")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.lookup_timeout, Duration::from_secs(3));
        assert_eq!(config.redeem_max_attempts, 3);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn test_database_url_is_required() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://db/coupons"),
            ("HOST", "127.0.0.1"),
            ("PORT", "3000"),
            ("LOOKUP_TIMEOUT_MS", "750"),
            ("REDEEM_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert_eq!(config.lookup_timeout, Duration::from_millis(750));
        assert_eq!(config.engine_settings().max_attempts, 5);
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = config(&[("DATABASE_URL", "x"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
        assert_eq!(
            err.to_string(),
            "PORT has invalid value 'eighty': not a valid number"
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = config(&[("DATABASE_URL", "x"), ("REDEEM_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REDEEM_MAX_ATTEMPTS", .. }));
    }
}
