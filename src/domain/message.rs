//! Outbound and inbound broker messages.

use std::sync::Arc;

use super::SubscriptionId;

/// Ordered header list. STOMP allows repeated names; the first one wins on
/// lookup.
pub type Headers = Vec<(String, String)>;

/// Handler invoked by a transport for every inbound message on one
/// subscription.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Returns the value of the first header named `name`.
#[must_use]
pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// A message submitted for publishing.
///
/// The body is already serialized text; the session serializes the caller's
/// value to JSON before building one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Broker routing key, e.g. `/app/chat`.
    pub destination: String,
    /// Serialized body.
    pub body: String,
    /// Extra headers, including `Authorization`.
    pub headers: Headers,
}

impl OutboundMessage {
    /// Creates a new outbound message.
    #[must_use]
    pub fn new(destination: impl Into<String>, body: impl Into<String>, headers: Headers) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
            headers,
        }
    }

    /// Returns the value of the first header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

/// A message delivered by the broker to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Destination the message was published to.
    pub destination: String,
    /// Subscription the broker routed the message through, when known.
    pub subscription: Option<SubscriptionId>,
    /// Broker-assigned message id, when present.
    pub message_id: Option<String>,
    /// All frame headers as received.
    pub headers: Headers,
    /// Raw body text.
    pub body: String,
}

impl InboundMessage {
    /// Creates an inbound message with no broker metadata.
    #[must_use]
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            subscription: None,
            message_id: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns the value of the first header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}
