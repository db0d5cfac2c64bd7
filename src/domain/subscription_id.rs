//! Type-safe subscription identifier.
//!
//! [`SubscriptionId`] is a newtype wrapper around [`uuid::Uuid`] (v4). It is
//! sent as the STOMP `id` header on SUBSCRIBE and echoed back by the broker
//! in the `subscription` header of every MESSAGE frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a broker subscription.
///
/// Generated once per `subscribe` call and immutable thereafter. Used as
/// the key under which a transport stores the message handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// Creates a new random `SubscriptionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `SubscriptionId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<uuid::Uuid> for SubscriptionId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}
