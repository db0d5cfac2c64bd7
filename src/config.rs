//! Client configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`) and are read once at startup. Numeric values that fail to
//! parse fall back to their defaults; unknown policy names are rejected.

use std::time::Duration;

use crate::error::ConfigError;
use crate::session::{ConcurrentConnect, ConnectionDropPolicy, SessionOptions};

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Broker host and port (e.g. `localhost:8080`), without scheme or path.
    pub websocket_host: String,

    /// WebSocket scheme, `wss` or `ws`.
    pub websocket_scheme: String,

    /// Base URL of the REST API.
    pub base_api: String,

    /// Base URL used by the test data endpoint.
    pub base_test: String,

    /// Token store key holding the bearer token.
    pub token_key: String,

    /// Handling of overlapping `connect()` calls.
    pub concurrent_connect: ConcurrentConnect,

    /// Handling of unsolicited connection drops.
    pub on_connection_drop: ConnectionDropPolicy,

    /// Timeout in seconds for REST requests.
    pub http_timeout_secs: u64,

    /// Destinations the binary subscribes to after connecting.
    pub subscribe_destinations: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            websocket_host: "localhost:8080".to_string(),
            websocket_scheme: "wss".to_string(),
            base_api: "https://dogu-in.com/api/v1".to_string(),
            base_test: "https://dogu-in.com".to_string(),
            token_key: "jwt".to_string(),
            concurrent_connect: ConcurrentConnect::default(),
            on_connection_drop: ConnectionDropPolicy::default(),
            http_timeout_secs: 10,
            subscribe_destinations: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `CONCURRENT_CONNECT` or
    /// `ON_CONNECTION_DROP` holds an unknown policy name.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let concurrent_connect = parse_policy(
            &lookup,
            "CONCURRENT_CONNECT",
            defaults.concurrent_connect,
            "share or reject",
        )?;
        let on_connection_drop = parse_policy(
            &lookup,
            "ON_CONNECTION_DROP",
            defaults.on_connection_drop,
            "stay_active or reset_to_idle",
        )?;

        let subscribe_destinations = lookup("SUBSCRIBE_DESTINATIONS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            websocket_host: string("BASE_WEBSOCKET_URL", defaults.websocket_host),
            websocket_scheme: string("WEBSOCKET_SCHEME", defaults.websocket_scheme),
            base_api: string("BASE_API", defaults.base_api),
            base_test: string("BASE_TEST", defaults.base_test),
            token_key: string("TOKEN_KEY", defaults.token_key),
            concurrent_connect,
            on_connection_drop,
            http_timeout_secs: parse_env(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            subscribe_destinations,
        })
    }

    /// Full broker endpoint, `<scheme>://<host>/ws`.
    #[must_use]
    pub fn broker_url(&self) -> String {
        format!("{}://{}/ws", self.websocket_scheme, self.websocket_host)
    }

    /// REST request timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Session options derived from this configuration.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            token_key: self.token_key.clone(),
            concurrent_connect: self.concurrent_connect,
            on_connection_drop: self.on_connection_drop,
        }
    }
}

/// Parses a value as `T`, returning `default` on missing or invalid values.
fn parse_env<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a policy name. Missing means `default`; unknown is an error.
fn parse_policy<T, F>(
    lookup: &F,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String>,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|value| ConfigError::Invalid {
                key,
                value,
                expected,
            }),
    }
}
