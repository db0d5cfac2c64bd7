//! Per-session subscription bookkeeping.
//!
//! Tracks which destinations the session is subscribed to. Entries live
//! only as long as the connection: the registry is cleared whenever the
//! session returns to `Idle`.

use std::collections::HashMap;

use crate::domain::SubscriptionId;

/// Set of live subscriptions for one session.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    destinations: HashMap<SubscriptionId, String>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription.
    pub fn insert(&mut self, id: SubscriptionId, destination: impl Into<String>) {
        self.destinations.insert(id, destination.into());
    }

    /// Forgets a subscription, returning its destination if it was known.
    pub fn remove(&mut self, id: SubscriptionId) -> Option<String> {
        self.destinations.remove(&id)
    }

    /// Total number of live subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.destinations.len()
    }

    /// Forgets every subscription.
    pub fn clear(&mut self) {
        self.destinations.clear();
    }
}
