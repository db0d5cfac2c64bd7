//! Behavioural switches for a [`super::Session`].

use std::str::FromStr;

use serde::Serialize;

/// What `connect()` does while another connect is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrentConnect {
    /// Join the in-flight attempt and settle with it.
    #[default]
    Share,
    /// Fail fast with [`crate::error::SessionError::Busy`]; callers must
    /// serialize their connect calls.
    Reject,
}

impl FromStr for ConcurrentConnect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "share" => Ok(Self::Share),
            "reject" => Ok(Self::Reject),
            other => Err(other.to_string()),
        }
    }
}

/// What happens when an established connection drops without a
/// `disconnect()` call. No variant reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionDropPolicy {
    /// Stay `Connected` with the ready flag cleared; `connect()` keeps
    /// resolving immediately until `disconnect()` is called.
    #[default]
    StayActive,
    /// Return to `Idle` so the next `connect()` activates again.
    ResetToIdle,
}

impl FromStr for ConnectionDropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stay_active" => Ok(Self::StayActive),
            "reset_to_idle" => Ok(Self::ResetToIdle),
            other => Err(other.to_string()),
        }
    }
}

/// Session options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOptions {
    /// Token store key holding the bearer token.
    pub token_key: String,
    /// Handling of overlapping `connect()` calls.
    pub concurrent_connect: ConcurrentConnect,
    /// Handling of unsolicited connection drops.
    pub on_connection_drop: ConnectionDropPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            token_key: "jwt".to_string(),
            concurrent_connect: ConcurrentConnect::default(),
            on_connection_drop: ConnectionDropPolicy::default(),
        }
    }
}
