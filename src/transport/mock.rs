//! Scriptable in-memory transport.
//!
//! [`MockTransport`] never touches the network. Its reaction to
//! `activate`/`deactivate` is chosen with [`OnActivate`]/[`OnDeactivate`],
//! events can be injected with [`MockTransport::emit`], and inbound messages
//! are fed to registered handlers with [`MockTransport::deliver`]. Every
//! call is recorded for later assertions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{BrokerTransport, EventReceiver, EventSender, event_channel};
use crate::domain::{
    Headers, InboundMessage, MessageHandler, OutboundMessage, SubscriptionId, TransportEvent,
};
use crate::error::TransportError;

/// Reaction to an activation request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OnActivate {
    /// Emit [`TransportEvent::Connected`] right away.
    #[default]
    Connect,
    /// Emit [`TransportEvent::Closed`] with the given reason.
    Close(String),
    /// Emit nothing; the test drives the outcome with `emit`.
    Hold,
}

/// Reaction to a deactivation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDeactivate {
    /// Emit [`TransportEvent::Disconnected`] right away.
    #[default]
    Disconnect,
    /// Emit nothing; the test drives the outcome with `emit`.
    Hold,
}

#[derive(Default)]
struct Recorded {
    on_activate: OnActivate,
    on_deactivate: OnDeactivate,
    activations: usize,
    deactivations: usize,
    connect_headers: Vec<Headers>,
    published: Vec<OutboundMessage>,
    subscriptions: HashMap<SubscriptionId, (String, Headers, MessageHandler)>,
}

/// In-memory [`BrokerTransport`] for tests and examples.
pub struct MockTransport {
    events: EventSender,
    connected: AtomicBool,
    recorded: Mutex<Recorded>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recorded = self.lock();
        f.debug_struct("MockTransport")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("activations", &recorded.activations)
            .field("deactivations", &recorded.deactivations)
            .field("subscriptions", &recorded.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Creates a mock that connects on activation and disconnects on
    /// deactivation, together with its event receiver.
    #[must_use]
    pub fn new() -> (Self, EventReceiver) {
        Self::with_behavior(OnActivate::default(), OnDeactivate::default())
    }

    /// Creates a mock with explicit reactions.
    #[must_use]
    pub fn with_behavior(
        on_activate: OnActivate,
        on_deactivate: OnDeactivate,
    ) -> (Self, EventReceiver) {
        let (events, rx) = event_channel();
        let transport = Self {
            events,
            connected: AtomicBool::new(false),
            recorded: Mutex::new(Recorded {
                on_activate,
                on_deactivate,
                ..Recorded::default()
            }),
        };
        (transport, rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the reaction to future activation requests.
    pub fn set_on_activate(&self, on_activate: OnActivate) {
        self.lock().on_activate = on_activate;
    }

    /// Changes the reaction to future deactivation requests.
    pub fn set_on_deactivate(&self, on_deactivate: OnDeactivate) {
        self.lock().on_deactivate = on_deactivate;
    }

    /// Injects an event as if the connection produced it. The connected flag
    /// follows the event.
    pub fn emit(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.connected.store(true, Ordering::SeqCst),
            TransportEvent::Disconnected | TransportEvent::Closed { .. } => {
                self.connected.store(false, Ordering::SeqCst);
            }
            TransportEvent::BrokerError { .. } => {}
        }
        if self.events.send(event).is_err() {
            tracing::debug!("mock transport event dropped; receiver gone");
        }
    }

    /// Delivers `body` to every handler subscribed to `destination`.
    ///
    /// Returns the number of handlers invoked. Handlers run on the caller's
    /// task, outside the mock's lock.
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        let targets: Vec<(SubscriptionId, MessageHandler)> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, (dest, _, _))| dest == destination)
            .map(|(id, (_, _, handler))| (*id, Arc::clone(handler)))
            .collect();
        for (id, handler) in &targets {
            let mut message = InboundMessage::new(destination, body);
            message.subscription = Some(*id);
            handler(message);
        }
        targets.len()
    }

    /// Number of activation requests received.
    #[must_use]
    pub fn activations(&self) -> usize {
        self.lock().activations
    }

    /// Number of deactivation requests received.
    #[must_use]
    pub fn deactivations(&self) -> usize {
        self.lock().deactivations
    }

    /// Connect headers passed to each activation, oldest first.
    #[must_use]
    pub fn connect_headers(&self) -> Vec<Headers> {
        self.lock().connect_headers.clone()
    }

    /// Messages handed to `publish`, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.lock().published.clone()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Headers sent with the subscription registered under `id`.
    #[must_use]
    pub fn subscription_headers(&self, id: SubscriptionId) -> Option<Headers> {
        self.lock()
            .subscriptions
            .get(&id)
            .map(|(_, headers, _)| headers.clone())
    }
}

impl BrokerTransport for MockTransport {
    async fn activate(&self, connect_headers: Headers) -> Result<(), TransportError> {
        let on_activate = {
            let mut recorded = self.lock();
            recorded.activations += 1;
            recorded.connect_headers.push(connect_headers);
            recorded.on_activate.clone()
        };
        match on_activate {
            OnActivate::Connect => self.emit(TransportEvent::Connected),
            OnActivate::Close(reason) => self.emit(TransportEvent::Closed {
                reason: Some(reason),
            }),
            OnActivate::Hold => {}
        }
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), TransportError> {
        let on_deactivate = {
            let mut recorded = self.lock();
            recorded.deactivations += 1;
            recorded.subscriptions.clear();
            recorded.on_deactivate
        };
        if on_deactivate == OnDeactivate::Disconnect {
            self.emit(TransportEvent::Disconnected);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotActive);
        }
        self.lock().published.push(message);
        Ok(())
    }

    async fn subscribe(
        &self,
        id: SubscriptionId,
        destination: &str,
        headers: Headers,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotActive);
        }
        self.lock()
            .subscriptions
            .insert(id, (destination.to_string(), headers, handler));
        Ok(())
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.lock().subscriptions.remove(&id);
        Ok(())
    }
}
