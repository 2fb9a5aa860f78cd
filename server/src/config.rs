//! Server configuration loaded from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::http::HeaderValue;

use crate::sync::SyncServerConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Origins allowed to open cross-origin connections
#[derive(Debug, Clone, PartialEq)]
pub enum AllowedOrigin {
    Any,
    Exact(HeaderValue),
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: AllowedOrigin,
    pub sync: SyncServerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            cors_origin: AllowedOrigin::Any,
            sync: SyncServerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from process environment variables.
    ///
    /// Expects `.env` to have been loaded already if one is used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = parse_or(&lookup, "HOST", defaults.host)?;
        let port = parse_or(&lookup, "PORT", defaults.port)?;
        let initial_pages = parse_or(&lookup, "INITIAL_PAGES", defaults.sync.initial_pages)?;
        let max_pages = parse_or(&lookup, "MAX_PAGES", defaults.sync.max_pages)?;

        if max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_PAGES",
                value: max_pages.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if initial_pages > max_pages {
            return Err(ConfigError::InvalidValue {
                key: "INITIAL_PAGES",
                value: initial_pages.to_string(),
                reason: format!("exceeds MAX_PAGES ({})", max_pages),
            });
        }

        let cors_origin = match lookup("CORS_ORIGIN") {
            None => AllowedOrigin::Any,
            Some(origin) if origin.trim() == "*" || origin.trim().is_empty() => AllowedOrigin::Any,
            Some(origin) => {
                let value =
                    HeaderValue::from_str(origin.trim()).map_err(|e| ConfigError::InvalidValue {
                        key: "CORS_ORIGIN",
                        value: origin.clone(),
                        reason: e.to_string(),
                    })?;
                AllowedOrigin::Exact(value)
            }
        };

        Ok(Self {
            host,
            port,
            cors_origin,
            sync: SyncServerConfig {
                initial_pages,
                max_pages,
            },
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
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
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.addr().to_string(), "0.0.0.0:5000");
        assert_eq!(config.cors_origin, AllowedOrigin::Any);
        assert_eq!(config.sync.initial_pages, 1);
        assert_eq!(config.sync.max_pages, 1000);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("HOST", "127.0.0.1"),
            ("CORS_ORIGIN", "http://localhost:3000"),
            ("MAX_PAGES", "50"),
        ]))
        .unwrap();
        assert_eq!(config.addr().to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.cors_origin,
            AllowedOrigin::Exact(HeaderValue::from_static("http://localhost:3000"))
        );
        assert_eq!(config.sync.max_pages, 50);
    }

    #[test]
    fn test_wildcard_origin() {
        let config = ServerConfig::from_lookup(lookup(&[("CORS_ORIGIN", "*")])).unwrap();
        assert_eq!(config.cors_origin, AllowedOrigin::Any);
    }

    #[test]
    fn test_bad_port_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_initial_pages_bounded() {
        let result = ServerConfig::from_lookup(lookup(&[("INITIAL_PAGES", "20"), ("MAX_PAGES", "10")]));
        assert!(result.is_err());
    }
}
