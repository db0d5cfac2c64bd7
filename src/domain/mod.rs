//! Domain layer: identifiers, messages, and transport events.
//!
//! These types are shared by the session, the transports, and the STOMP
//! codec. They carry no behaviour beyond construction and formatting.

pub mod message;
pub mod subscription_id;
pub mod transport_event;

pub use message::{Headers, InboundMessage, MessageHandler, OutboundMessage};
pub use subscription_id::SubscriptionId;
pub use transport_event::TransportEvent;
