//! Session lifecycle states.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a [`super::Session`].
///
/// ```text
/// Idle ──connect──▶ Connecting ──Connected──▶ Connected
///  ▲                 │      │                    │
///  │      Closed ────┘      └─disconnect─┐       │ disconnect
///  │                                     ▼       ▼
///  └──────────Disconnected──────────── Disconnecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection requested.
    #[default]
    Idle,
    /// Activation requested, broker confirmation pending.
    Connecting,
    /// Broker confirmed the session.
    Connected,
    /// Deactivation requested, completion pending.
    Disconnecting,
}

impl SessionState {
    /// Returns `true` in every state except [`SessionState::Idle`]: the
    /// caller's connect intent is in force.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Returns the state as a snake_case string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status of a session: lifecycle state plus the confirmed-ready
/// flag. Published on every change through [`super::Session::watch_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    /// Lifecycle state (intent).
    pub state: SessionState,
    /// Whether the broker has confirmed the connection and it has not
    /// dropped since.
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_is_inactive() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Connecting.is_active());
        assert!(SessionState::Connected.is_active());
        assert!(SessionState::Disconnecting.is_active());
    }

    #[test]
    fn display_matches_serde() {
        let json = serde_json::to_string(&SessionState::Disconnecting).unwrap_or_default();
        assert_eq!(json, format!("\"{}\"", SessionState::Disconnecting));
    }
}
