//! Lifecycle events reported by a broker transport.
//!
//! Every transport pushes a [`TransportEvent`] into its event channel when
//! the underlying connection changes. The session consumes them in arrival
//! order and maps them onto state transitions.

use serde::Serialize;

/// Lifecycle event emitted by a [`crate::transport::BrokerTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// The broker confirmed the session (STOMP CONNECTED).
    Connected,

    /// A requested deactivation completed.
    Disconnected,

    /// The underlying connection closed or could not be opened.
    Closed {
        /// Close reason, when the transport knows one.
        reason: Option<String>,
    },

    /// The broker reported an error (STOMP ERROR frame).
    BrokerError {
        /// Value of the `message` header.
        message: String,
        /// Frame body, often a longer description.
        body: String,
    },
}

impl TransportEvent {
    /// Returns the event type as a snake_case string.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed { .. } => "closed",
            Self::BrokerError { .. } => "broker_error",
        }
    }
}
