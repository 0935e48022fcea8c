//! Server Configuration
//!
//! Runtime settings for the envelope server. Every value has a default and
//! can be overridden from the environment with [`ServerConfig::from_env`].

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// What to do with envelopes from an authenticated session whose email
/// address has not been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnverifiedEmailPolicy {
    /// Produce no response at all. The caller sees no failure signal.
    #[default]
    Stall,
    /// Fail the call with a reported error. Still nothing is sent.
    Reject,
}

/// How the handshake treats providers other than "google".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPolicy {
    /// Mark the session authenticated without deriving an identity.
    #[default]
    Permissive,
    /// Refuse authentication; the session stays unauthenticated.
    Strict,
}

/// Authentication policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthPolicy {
    /// Unsupported provider handling.
    pub provider: ProviderPolicy,
    /// Unverified email handling.
    pub unverified_email: UnverifiedEmailPolicy,
}

/// Static game data versions reported to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Settings hash returned by DOWNLOAD_SETTINGS.
    pub settings_hash: String,
    /// Item templates version (ms since epoch).
    pub item_templates_timestamp_ms: u64,
    /// Asset digest version (ms since epoch).
    pub asset_digest_timestamp_ms: u64,
    /// Inventory delta timestamp (ms since epoch).
    pub inventory_timestamp_ms: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            settings_hash: "54b359c97e46900f87211ef6e6dd0b7f2a3ea1f5".to_string(),
            item_templates_timestamp_ms: 1_468_540_960_537,
            asset_digest_timestamp_ms: 1_467_338_276_561,
            inventory_timestamp_ms: 1_468_540_960_537,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close connections with no traffic for this long.
    pub idle_timeout: Duration,
    /// API endpoint announced in the auth envelope.
    pub api_url: String,
    /// Lifetime of issued auth tickets.
    pub ticket_ttl: Duration,
    /// Authentication policies.
    pub auth: AuthPolicy,
    /// Game data versions.
    pub catalog: CatalogConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            api_url: "pgorelease.nianticlabs.com/custom".to_string(),
            ticket_ttl: Duration::from_secs(1800),
            auth: AuthPolicy::default(),
            catalog: CatalogConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parsed(&lookup, "POGO_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = parsed(&lookup, "POGO_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(secs) = parsed(&lookup, "POGO_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed(&lookup, "POGO_TICKET_TTL_SECS")? {
            config.ticket_ttl = Duration::from_secs(secs);
        }
        if let Some(url) = lookup("POGO_API_URL") {
            config.api_url = url;
        }
        if flag(&lookup, "POGO_STRICT_AUTH")? {
            config.auth.provider = ProviderPolicy::Strict;
        }
        if flag(&lookup, "POGO_REJECT_UNVERIFIED")? {
            config.auth.unverified_email = UnverifiedEmailPolicy::Reject;
        }

        Ok(config)
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.auth.provider, ProviderPolicy::Permissive);
        assert_eq!(config.auth.unverified_email, UnverifiedEmailPolicy::Stall);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("POGO_BIND_ADDR", "127.0.0.1:9000"),
            ("POGO_MAX_CONNECTIONS", "12"),
            ("POGO_TICKET_TTL_SECS", "60"),
            ("POGO_API_URL", "localhost/rpc"),
            ("POGO_STRICT_AUTH", "true"),
            ("POGO_REJECT_UNVERIFIED", "1"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.ticket_ttl, Duration::from_secs(60));
        assert_eq!(config.api_url, "localhost/rpc");
        assert_eq!(config.auth.provider, ProviderPolicy::Strict);
        assert_eq!(config.auth.unverified_email, UnverifiedEmailPolicy::Reject);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[("POGO_MAX_CONNECTIONS", "lots")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "POGO_MAX_CONNECTIONS", .. })
        ));

        let result = ServerConfig::from_lookup(lookup_from(&[("POGO_STRICT_AUTH", "maybe")]));
        assert!(result.is_err());
    }
}
