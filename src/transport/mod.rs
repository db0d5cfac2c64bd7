//! Broker transports.
//!
//! A [`BrokerTransport`] is the capability a [`crate::session::Session`]
//! drives: lifecycle requests go in as method calls, lifecycle outcomes come
//! back as [`TransportEvent`]s on the channel created alongside the
//! transport. Message delivery bypasses the channel: each subscription
//! registers a [`MessageHandler`] that the transport invokes directly.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

use crate::domain::{Headers, MessageHandler, OutboundMessage, SubscriptionId, TransportEvent};
use crate::error::TransportError;

pub mod mock;
pub mod stomp;

pub use mock::{MockTransport, OnActivate, OnDeactivate};
pub use stomp::StompTransport;

/// Sending half of a transport's event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a transport's event channel, consumed by the session.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates a transport event channel.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Broker-client capability consumed by the session.
///
/// Implementations report lifecycle changes exclusively through their event
/// channel: `activate` and `deactivate` only *request* a transition.
pub trait BrokerTransport: fmt::Debug + Send + Sync + 'static {
    /// Requests activation. `connect_headers` are sent with the broker
    /// handshake. Activating an already active transport is a no-op.
    ///
    /// Eventually emits [`TransportEvent::Connected`] or
    /// [`TransportEvent::Closed`].
    fn activate(
        &self,
        connect_headers: Headers,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Requests deactivation. Eventually emits
    /// [`TransportEvent::Disconnected`], immediately if nothing is active.
    fn deactivate(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns `true` while the broker has confirmed the connection.
    fn is_connected(&self) -> bool;

    /// Hands a message to the broker, at most once.
    fn publish(
        &self,
        message: OutboundMessage,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Registers `handler` for messages on `destination` under `id`.
    fn subscribe(
        &self,
        id: SubscriptionId,
        destination: &str,
        headers: Headers,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Removes the subscription registered under `id`.
    fn unsubscribe(&self, id: SubscriptionId)
    -> impl Future<Output = Result<(), TransportError>> + Send;
}
