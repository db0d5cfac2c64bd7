//! Session state machine.
//!
//! [`Lifecycle`] owns the session state, the confirmed-ready flag and the
//! waiters of pending `connect`/`disconnect` calls. Every waiter is a
//! oneshot sender, so each call settles at most once; waiters are settled
//! only from a state transition.

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};

use super::options::{ConcurrentConnect, ConnectionDropPolicy};
use super::state::{SessionState, SessionStatus};
use super::subscriptions::SubscriptionRegistry;
use crate::domain::TransportEvent;

/// Outcome delivered to a connect waiter; `Err` carries the failure reason.
pub(crate) type ConnectOutcome = Result<(), String>;

/// What a `connect()` call has to do after consulting the state machine.
#[derive(Debug)]
pub(crate) enum ConnectStep {
    /// Already connected.
    Ready,
    /// Request activation, then wait.
    Activate(oneshot::Receiver<ConnectOutcome>),
    /// Another call is activating; wait for it.
    Join(oneshot::Receiver<ConnectOutcome>),
    /// Not allowed in this state.
    Busy(SessionState),
}

/// What a `disconnect()` call has to do after consulting the state machine.
#[derive(Debug)]
pub(crate) enum DisconnectStep {
    /// Already idle.
    Ready,
    /// Request deactivation, then wait.
    Deactivate(oneshot::Receiver<()>),
    /// Another call is deactivating; wait for it.
    Join(oneshot::Receiver<()>),
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: SessionState,
    connected: bool,
    connected_since: Option<DateTime<Utc>>,
    connect_waiters: Vec<oneshot::Sender<ConnectOutcome>>,
    disconnect_waiters: Vec<oneshot::Sender<()>>,
    pub(crate) subscriptions: SubscriptionRegistry,
    status_tx: watch::Sender<SessionStatus>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            state: SessionState::Idle,
            connected: false,
            connected_since: None,
            connect_waiters: Vec::new(),
            disconnect_waiters: Vec::new(),
            subscriptions: SubscriptionRegistry::new(),
            status_tx,
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) const fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) const fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) const fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.connected_since
    }

    pub(crate) fn begin_connect(&mut self, policy: ConcurrentConnect) -> ConnectStep {
        match (self.state, policy) {
            (SessionState::Idle, _) => {
                let (tx, rx) = oneshot::channel();
                self.connect_waiters.push(tx);
                self.update(SessionState::Connecting, false);
                ConnectStep::Activate(rx)
            }
            (SessionState::Connected, _) => ConnectStep::Ready,
            (SessionState::Connecting, ConcurrentConnect::Share) => {
                let (tx, rx) = oneshot::channel();
                self.connect_waiters.push(tx);
                ConnectStep::Join(rx)
            }
            (state, _) => ConnectStep::Busy(state),
        }
    }

    /// Activation could not even be requested.
    pub(crate) fn abort_connect(&mut self, reason: &str) {
        if self.state == SessionState::Connecting {
            self.reset_to_idle();
            self.settle_connect(&Err(reason.to_string()));
        }
    }

    pub(crate) fn begin_disconnect(&mut self) -> DisconnectStep {
        match self.state {
            SessionState::Idle => DisconnectStep::Ready,
            SessionState::Disconnecting => {
                let (tx, rx) = oneshot::channel();
                self.disconnect_waiters.push(tx);
                DisconnectStep::Join(rx)
            }
            SessionState::Connecting | SessionState::Connected => {
                self.settle_connect(&Err(
                    "disconnect requested before the broker confirmed the connection".to_string(),
                ));
                let (tx, rx) = oneshot::channel();
                self.disconnect_waiters.push(tx);
                self.update(SessionState::Disconnecting, false);
                DisconnectStep::Deactivate(rx)
            }
        }
    }

    /// Deactivation could not even be requested; the session is abandoned.
    pub(crate) fn abort_disconnect(&mut self) {
        if self.state == SessionState::Disconnecting {
            self.reset_to_idle();
            self.settle_disconnect();
        }
    }

    /// Applies one transport event.
    pub(crate) fn apply(&mut self, event: TransportEvent, on_drop: ConnectionDropPolicy) {
        match event {
            TransportEvent::Connected => match self.state {
                SessionState::Connecting => {
                    tracing::info!("session connected");
                    self.connected_since = Some(Utc::now());
                    self.update(SessionState::Connected, true);
                    self.settle_connect(&Ok(()));
                }
                state => tracing::debug!(%state, "ignoring connected event"),
            },
            TransportEvent::Closed { reason } => {
                let reason = reason.unwrap_or_else(|| "websocket connection closed".to_string());
                self.on_connection_end(&reason, on_drop);
            }
            TransportEvent::Disconnected => match self.state {
                SessionState::Disconnecting => {
                    tracing::info!("session disconnected");
                    self.reset_to_idle();
                    self.settle_disconnect();
                }
                _ => self.on_connection_end("transport disconnected", on_drop),
            },
            TransportEvent::BrokerError { message, body } => {
                tracing::error!(%message, %body, "broker reported an error");
            }
        }
    }

    /// The transport went away without a pending deactivation.
    fn on_connection_end(&mut self, reason: &str, on_drop: ConnectionDropPolicy) {
        match self.state {
            SessionState::Connecting => {
                tracing::error!(reason, "connection closed before confirmation");
                self.reset_to_idle();
                self.settle_connect(&Err(reason.to_string()));
            }
            SessionState::Connected => {
                tracing::warn!(reason, policy = ?on_drop, "connection lost; not reconnecting");
                self.connected_since = None;
                self.subscriptions.clear();
                match on_drop {
                    ConnectionDropPolicy::StayActive => self.update(SessionState::Connected, false),
                    ConnectionDropPolicy::ResetToIdle => self.reset_to_idle(),
                }
            }
            state => tracing::debug!(%state, reason, "connection end while not connected"),
        }
    }

    fn reset_to_idle(&mut self) {
        self.connected_since = None;
        self.subscriptions.clear();
        self.update(SessionState::Idle, false);
    }

    fn update(&mut self, state: SessionState, connected: bool) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "session state changed");
        }
        self.state = state;
        self.connected = connected;
        self.status_tx.send_replace(SessionStatus { state, connected });
    }

    fn settle_connect(&mut self, outcome: &ConnectOutcome) {
        for waiter in self.connect_waiters.drain(..) {
            // receiver dropped: caller gave up waiting
            let _ = waiter.send(outcome.clone());
        }
    }

    fn settle_disconnect(&mut self) {
        for waiter in self.disconnect_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
