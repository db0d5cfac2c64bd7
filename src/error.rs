//! Client error types.
//!
//! [`SessionError`] is the central error type returned by every session
//! operation. Transports, the STOMP codec, the REST helper and the
//! configuration loader each have their own narrower enum.

use crate::session::SessionState;

/// Errors returned by [`crate::session::Session`] operations.
///
/// # Taxonomy
///
/// | Variant              | Raised by                  | Effect                         |
/// |----------------------|----------------------------|--------------------------------|
/// | `ConnectionFailure`  | `connect`                  | session back to `Idle`         |
/// | `NotConnected`       | `send_message`, `subscribe`| logged, no transport call      |
/// | `Busy`               | `connect`                  | no state change                |
/// | `InvalidDestination` | `send_message`, `subscribe`| no transport call              |
/// | `Serialization`      | `send_message`             | no transport call              |
/// | `Transport`          | any                        | see [`TransportError`]         |
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport closed before the broker confirmed the connection.
    #[error("connection failed: {reason}")]
    ConnectionFailure {
        /// Why the connection attempt ended.
        reason: String,
    },

    /// Publish or subscribe attempted without a confirmed connection.
    #[error("not connected: {operation} skipped")]
    NotConnected {
        /// Operation that was skipped.
        operation: &'static str,
    },

    /// The session cannot accept the request in its current state.
    #[error("session busy while {state}")]
    Busy {
        /// State the session was in.
        state: SessionState,
    },

    /// Destination was empty.
    #[error("invalid destination: {0:?}")]
    InvalidDestination(String),

    /// The outbound body could not be serialized.
    #[error("failed to serialize message body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error propagated from the broker transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session's event pump stopped before the operation settled.
    #[error("session event loop stopped")]
    Closed,
}

/// Errors raised by a [`crate::transport::BrokerTransport`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No link is active; the transport must be activated first.
    #[error("transport is not active")]
    NotActive,

    /// The broker URL could not be turned into a WebSocket request.
    #[error("invalid broker url {url}: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The link task is gone and can no longer accept commands.
    #[error("transport link closed")]
    LinkClosed,
}

/// Errors produced while decoding a STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The first line is not a known STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// No blank line separates headers from body.
    #[error("missing header terminator")]
    MissingHeaderTerminator,

    /// A header line has no `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// A header contains an escape sequence outside `\\ \n \r \c`.
    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    /// `content-length` is not a number or does not match the body.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),
}

/// Errors returned by [`crate::api::ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed, returned a non-success status, or had an invalid body.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised while loading [`crate::config::ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value outside its allowed set.
    #[error("invalid value {value:?} for {key}: expected one of {expected}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Value found.
        value: String,
        /// Accepted values.
        expected: &'static str,
    },
}
