//! Connection session: async facade over a broker transport.
//!
//! A [`Session`] owns one [`BrokerTransport`] for its whole life and turns
//! the transport's lifecycle events into settled futures. Connect and
//! disconnect are idempotent; publish and subscribe are gated on the
//! broker-confirmed ready flag and return [`SessionError::NotConnected`]
//! instead of silently doing nothing.
//!
//! ```text
//! caller ──connect()──▶ Lifecycle ──activate()──▶ transport
//!    ▲                      ▲                          │
//!    └──── oneshot ─────────┴──── pump task ◀── TransportEvent
//! ```
//!
//! Known limitations: no reconnection after an unsolicited drop (observe
//! [`Session::watch_state`] to add one), no timeout on `disconnect()`, no
//! way to cancel an in-flight request other than dropping its future.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::domain::{Headers, InboundMessage, MessageHandler, OutboundMessage, SubscriptionId};
use crate::error::SessionError;
use crate::token::TokenStore;
use crate::transport::{BrokerTransport, EventReceiver, StompTransport};

mod lifecycle;
pub mod options;
pub mod state;
pub mod subscriptions;

use lifecycle::{ConnectOutcome, ConnectStep, DisconnectStep, Lifecycle};
pub use options::{ConcurrentConnect, ConnectionDropPolicy, SessionOptions};
pub use state::{SessionState, SessionStatus};
pub use subscriptions::SubscriptionRegistry;

/// Header carrying the bearer token on CONNECT, SEND and SUBSCRIBE.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Handle returned by [`Session::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    destination: String,
}

impl SubscriptionHandle {
    /// Subscription identifier sent to the broker.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Destination the subscription listens on.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// Session-level confirmed-ready flag.
    pub connected: bool,
    /// Transport-level connected flag.
    pub transport_connected: bool,
    /// When the current connection was confirmed.
    pub connected_since: Option<DateTime<Utc>>,
    /// Number of live subscriptions.
    pub subscriptions: usize,
}

struct SessionInner<T> {
    transport: T,
    tokens: Arc<dyn TokenStore>,
    options: SessionOptions,
    lifecycle: Arc<Mutex<Lifecycle>>,
    status: watch::Receiver<SessionStatus>,
    pump: JoinHandle<()>,
}

impl<T> Drop for SessionInner<T> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// One logical real-time messaging session.
///
/// Cloning is cheap and every clone drives the same session. The
/// transport handle is created once and reused across connect/disconnect
/// cycles. Dropping the last clone stops event processing; pending calls
/// then fail with [`SessionError::Closed`].
pub struct Session<T: BrokerTransport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: BrokerTransport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BrokerTransport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &*self.inner.status.borrow())
            .field("options", &self.inner.options)
            .field("transport", &self.inner.transport)
            .finish_non_exhaustive()
    }
}

impl Session<StompTransport> {
    /// Builds a session on a [`StompTransport`] pointed at the configured
    /// broker URL.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn from_config(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let (transport, events) = StompTransport::new(config.broker_url());
        Self::new(transport, events, tokens, config.session_options())
    }
}

impl<T: BrokerTransport> Session<T> {
    /// Creates an idle session over `transport`. `events` must be the
    /// receiver created together with the transport.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        transport: T,
        events: EventReceiver,
        tokens: Arc<dyn TokenStore>,
        options: SessionOptions,
    ) -> Self {
        let lifecycle = Lifecycle::new();
        let status = lifecycle.watch();
        let lifecycle = Arc::new(Mutex::new(lifecycle));
        let pump = tokio::spawn(pump_events(
            Arc::clone(&lifecycle),
            events,
            options.on_connection_drop,
        ));
        Self {
            inner: Arc::new(SessionInner {
                transport,
                tokens,
                options,
                lifecycle,
                status,
                pump,
            }),
        }
    }

    /// Connects to the broker.
    ///
    /// Resolves immediately when already connected. Otherwise requests
    /// activation with an `Authorization` header read from the token store
    /// now, and resolves once the broker confirms.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectionFailure`] if the connection closes before
    ///   the broker confirms it, or `disconnect()` is called meanwhile.
    /// - [`SessionError::Busy`] while disconnecting, or while connecting
    ///   under [`ConcurrentConnect::Reject`].
    /// - [`SessionError::Transport`] if activation cannot be requested.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let step = self
            .inner
            .lifecycle
            .lock()
            .await
            .begin_connect(self.inner.options.concurrent_connect);

        match step {
            ConnectStep::Ready => {
                tracing::debug!("session already active");
                Ok(())
            }
            ConnectStep::Busy(state) => Err(SessionError::Busy { state }),
            ConnectStep::Join(rx) => settle_connect(rx).await,
            ConnectStep::Activate(rx) => {
                tracing::info!("connecting session");
                if let Err(e) = self.inner.transport.activate(self.auth_headers()).await {
                    tracing::error!(error = %e, "activation failed");
                    self.inner.lifecycle.lock().await.abort_connect(&e.to_string());
                    return Err(e.into());
                }
                settle_connect(rx).await
            }
        }
    }

    /// Disconnects from the broker.
    ///
    /// Resolves immediately when idle. Otherwise requests deactivation and
    /// resolves once the transport reports it complete. There is no
    /// timeout: a deactivation that never completes never resolves.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if deactivation cannot be
    /// requested, or [`SessionError::Closed`] if the session is torn down
    /// while waiting.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let step = self.inner.lifecycle.lock().await.begin_disconnect();

        let rx = match step {
            DisconnectStep::Ready => {
                tracing::debug!("session already inactive");
                return Ok(());
            }
            DisconnectStep::Join(rx) => rx,
            DisconnectStep::Deactivate(rx) => {
                tracing::info!("disconnecting session");
                if let Err(e) = self.inner.transport.deactivate().await {
                    tracing::error!(error = %e, "deactivation failed");
                    self.inner.lifecycle.lock().await.abort_disconnect();
                    return Err(e.into());
                }
                rx
            }
        };
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Publishes `body`, serialized as JSON, to `destination`.
    ///
    /// Delivery is attempted once; there is no acknowledgement or retry.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidDestination`] for an empty destination.
    /// - [`SessionError::NotConnected`] unless the broker has confirmed the
    ///   connection. Nothing is queued.
    /// - [`SessionError::Serialization`] if `body` cannot be serialized.
    /// - [`SessionError::Transport`] if the transport refuses the message.
    pub async fn send_message<B>(&self, destination: &str, body: &B) -> Result<(), SessionError>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(destination, "publishing message");
        check_destination(destination)?;
        if !self.is_connected() {
            tracing::error!(destination, "session is not connected; message not sent");
            return Err(SessionError::NotConnected {
                operation: "send_message",
            });
        }

        let body = serde_json::to_string(body)?;
        let message = OutboundMessage::new(destination, body, self.auth_headers());
        self.inner.transport.publish(message).await?;
        Ok(())
    }

    /// Subscribes `callback` to `destination`.
    ///
    /// Every inbound body is parsed as JSON into `M`; the callback runs once
    /// per message that parses. Messages that do not parse are logged and
    /// dropped, and the subscription stays active.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidDestination`] for an empty destination.
    /// - [`SessionError::NotConnected`] unless the broker has confirmed the
    ///   connection. Nothing is registered.
    /// - [`SessionError::Transport`] if the transport refuses the request.
    pub async fn subscribe<M, F>(
        &self,
        destination: &str,
        callback: F,
    ) -> Result<SubscriptionHandle, SessionError>
    where
        M: DeserializeOwned + 'static,
        F: Fn(M) + Send + Sync + 'static,
    {
        check_destination(destination)?;
        if !self.is_connected() {
            tracing::error!(destination, "session is not connected; subscription skipped");
            return Err(SessionError::NotConnected {
                operation: "subscribe",
            });
        }

        tracing::info!(destination, "subscribing");
        let id = SubscriptionId::new();
        let handler: MessageHandler = Arc::new(move |message: InboundMessage| {
            match serde_json::from_str::<M>(&message.body) {
                Ok(parsed) => {
                    tracing::trace!(destination = %message.destination, "message parsed");
                    callback(parsed);
                }
                Err(error) => tracing::warn!(
                    destination = %message.destination,
                    %error,
                    "failed to parse message; dropped"
                ),
            }
        });
        self.inner
            .transport
            .subscribe(id, destination, self.auth_headers(), handler)
            .await?;

        let mut lifecycle = self.inner.lifecycle.lock().await;
        // the connection may have dropped while the transport was subscribing
        if !lifecycle.is_connected() {
            tracing::error!(destination, "connection lost while subscribing");
            return Err(SessionError::NotConnected {
                operation: "subscribe",
            });
        }
        lifecycle.subscriptions.insert(id, destination);
        drop(lifecycle);

        Ok(SubscriptionHandle {
            id,
            destination: destination.to_string(),
        })
    }

    /// Cancels a subscription. Unknown or already-forgotten handles are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the transport fails to send
    /// the cancellation.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), SessionError> {
        let known = self
            .inner
            .lifecycle
            .lock()
            .await
            .subscriptions
            .remove(handle.id)
            .is_some();
        if !known {
            tracing::debug!(subscription = %handle.id, "unknown subscription");
            return Ok(());
        }
        tracing::info!(destination = %handle.destination, "unsubscribing");
        if self.is_connected() {
            self.inner.transport.unsubscribe(handle.id).await?;
        }
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.status.borrow().state
    }

    /// `true` unless the session is [`SessionState::Idle`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// `true` while the broker-confirmed connection is up. Publish and
    /// subscribe are gated on this flag.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.status.borrow().connected
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.clone()
    }

    /// Point-in-time view of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let lifecycle = self.inner.lifecycle.lock().await;
        SessionSnapshot {
            state: lifecycle.state(),
            connected: self.is_connected(),
            transport_connected: self.inner.transport.is_connected(),
            connected_since: lifecycle.connected_since(),
            subscriptions: lifecycle.subscriptions.count(),
        }
    }

    /// The transport this session drives.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    fn auth_headers(&self) -> Headers {
        let token = self.inner.tokens.token(&self.inner.options.token_key);
        vec![(AUTHORIZATION_HEADER.to_string(), token)]
    }
}

async fn settle_connect(rx: oneshot::Receiver<ConnectOutcome>) -> Result<(), SessionError> {
    match rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(SessionError::ConnectionFailure { reason }),
        Err(_) => Err(SessionError::Closed),
    }
}

fn check_destination(destination: &str) -> Result<(), SessionError> {
    if destination.trim().is_empty() {
        return Err(SessionError::InvalidDestination(destination.to_string()));
    }
    Ok(())
}

/// Applies transport events to the lifecycle in arrival order.
async fn pump_events(
    lifecycle: Arc<Mutex<Lifecycle>>,
    mut events: EventReceiver,
    on_drop: ConnectionDropPolicy,
) {
    while let Some(event) = events.recv().await {
        tracing::debug!(event = event.event_type_str(), "transport event");
        lifecycle.lock().await.apply(event, on_drop);
    }
    tracing::debug!("transport event channel closed");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::domain::TransportEvent;
    use crate::error::TransportError;
    use crate::token::MemoryTokenStore;
    use crate::transport::{MockTransport, OnActivate, OnDeactivate};

    struct Fixture {
        session: Session<MockTransport>,
        tokens: Arc<MemoryTokenStore>,
    }

    fn fixture_with(
        on_activate: OnActivate,
        on_deactivate: OnDeactivate,
        options: SessionOptions,
    ) -> Fixture {
        let (transport, events) = MockTransport::with_behavior(on_activate, on_deactivate);
        let tokens = Arc::new(MemoryTokenStore::new());
        tokens.set("jwt", "token-1");
        let store: Arc<dyn TokenStore> = Arc::clone(&tokens) as Arc<dyn TokenStore>;
        Fixture {
            session: Session::new(transport, events, store, options),
            tokens,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            OnActivate::Connect,
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        )
    }

    async fn wait_for_state(session: &Session<MockTransport>, state: SessionState) {
        let mut rx = session.watch_state();
        let waited = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.state == state));
        if !matches!(waited.await, Ok(Ok(_))) {
            panic!("session never reached {state}");
        }
    }

    fn spawn_connect(
        session: &Session<MockTransport>,
    ) -> JoinHandle<Result<(), SessionError>> {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    }

    fn authorization(headers: &Headers) -> Option<&str> {
        crate::domain::message::header(headers, AUTHORIZATION_HEADER)
    }

    #[tokio::test]
    async fn connect_when_connected_does_not_reactivate() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        assert!(fx.session.connect().await.is_ok());
        assert_eq!(fx.session.transport().activations(), 1);
        assert_eq!(fx.session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn disconnect_when_idle_does_not_deactivate() {
        let fx = fixture();
        assert!(fx.session.disconnect().await.is_ok());
        assert!(fx.session.disconnect().await.is_ok());
        assert_eq!(fx.session.transport().deactivations(), 0);
        assert_eq!(fx.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn reconnect_reuses_transport() {
        let fx = fixture();
        let transport: *const MockTransport = fx.session.transport();
        assert!(fx.session.connect().await.is_ok());
        assert!(fx.session.disconnect().await.is_ok());
        assert!(fx.session.connect().await.is_ok());

        assert!(std::ptr::eq(transport, fx.session.transport()));
        assert_eq!(fx.session.transport().activations(), 2);
        assert_eq!(fx.session.transport().deactivations(), 1);
        assert_eq!(fx.session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn publish_while_not_connected_is_reported_not_sent() {
        let fx = fixture();
        let result = fx.session.send_message("/app/chat", &json!({"a": 1})).await;
        assert!(matches!(
            result,
            Err(SessionError::NotConnected {
                operation: "send_message"
            })
        ));
        assert!(fx.session.transport().published().is_empty());
    }

    #[tokio::test]
    async fn malformed_inbound_body_is_dropped() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        let received = Arc::new(StdMutex::new(Vec::<Value>::new()));
        let sink = Arc::clone(&received);
        let subscribed = fx
            .session
            .subscribe("/topic/x", move |msg: Value| {
                if let Ok(mut seen) = sink.lock() {
                    seen.push(msg);
                }
            })
            .await;
        assert!(subscribed.is_ok());

        assert_eq!(fx.session.transport().deliver("/topic/x", r#"{"a":1}"#), 1);
        assert_eq!(fx.session.transport().deliver("/topic/x", "{bad"), 1);
        // subscription survives the bad frame
        assert_eq!(fx.session.transport().deliver("/topic/x", r#"{"a":2}"#), 1);

        let Ok(seen) = received.lock() else {
            panic!("callback mutex poisoned");
        };
        assert_eq!(*seen, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn manual_connect_and_disconnect_follow_events() {
        let fx = fixture_with(
            OnActivate::Hold,
            OnDeactivate::Hold,
            SessionOptions::default(),
        );
        let connecting = spawn_connect(&fx.session);
        wait_for_state(&fx.session, SessionState::Connecting).await;
        assert!(!fx.session.is_connected());

        fx.session.transport().emit(TransportEvent::Connected);
        let Ok(result) = connecting.await else {
            panic!("connect task failed");
        };
        assert!(result.is_ok());
        assert_eq!(fx.session.state(), SessionState::Connected);
        assert!(fx.session.is_connected());

        let disconnecting = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.disconnect().await })
        };
        wait_for_state(&fx.session, SessionState::Disconnecting).await;
        fx.session.transport().emit(TransportEvent::Disconnected);
        let Ok(result) = disconnecting.await else {
            panic!("disconnect task failed");
        };
        assert!(result.is_ok());
        assert_eq!(fx.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn connect_stays_pending_until_confirmed() {
        let fx = fixture_with(
            OnActivate::Hold,
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        );
        let mut connecting = tokio_test::task::spawn(fx.session.connect());
        tokio_test::assert_pending!(connecting.poll());
        assert_eq!(fx.session.state(), SessionState::Connecting);

        fx.session.transport().emit(TransportEvent::Connected);
        wait_for_state(&fx.session, SessionState::Connected).await;
        tokio_test::assert_ready_ok!(connecting.poll());
    }

    #[tokio::test]
    async fn close_before_confirmation_rejects_connect() {
        let fx = fixture_with(
            OnActivate::Close("handshake refused".to_string()),
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        );
        let result = fx.session.connect().await;
        let Err(SessionError::ConnectionFailure { reason }) = result else {
            panic!("expected connection failure, got {result:?}");
        };
        assert_eq!(reason, "handshake refused");
        assert_eq!(fx.session.state(), SessionState::Idle);
        assert!(!fx.session.is_active());
    }

    #[tokio::test]
    async fn subscribe_receives_parsed_messages_once() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        let calls = Arc::new(StdMutex::new(Vec::<Value>::new()));
        let sink = Arc::clone(&calls);
        let Ok(handle) = fx
            .session
            .subscribe("/topic/x", move |msg: Value| {
                if let Ok(mut seen) = sink.lock() {
                    seen.push(msg);
                }
            })
            .await
        else {
            panic!("subscribe failed");
        };
        assert_eq!(handle.destination(), "/topic/x");

        fx.session.transport().deliver("/topic/x", r#"{"a":1}"#);
        assert_eq!(calls.lock().map(|c| c.clone()).unwrap_or_default(), vec![json!({"a": 1})]);

        fx.session.transport().deliver("/topic/x", "{bad");
        assert_eq!(calls.lock().map(|c| c.len()).unwrap_or_default(), 1);
    }

    #[tokio::test]
    async fn subscribe_before_connect_registers_nothing() {
        let fx = fixture();
        let result = fx.session.subscribe("/topic/x", |_: Value| {}).await;
        assert!(matches!(result, Err(SessionError::NotConnected { .. })));
        assert_eq!(fx.session.transport().subscription_count(), 0);
    }

    #[tokio::test]
    async fn typed_subscription_parses_into_struct() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Chat {
            sender: String,
            text: String,
        }

        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        let got = Arc::new(StdMutex::new(None));
        let sink = Arc::clone(&got);
        let subscribed = fx
            .session
            .subscribe("/topic/chat", move |chat: Chat| {
                if let Ok(mut slot) = sink.lock() {
                    *slot = Some(chat);
                }
            })
            .await;
        assert!(subscribed.is_ok());

        // wrong shape is a parse failure too
        fx.session.transport().deliver("/topic/chat", r#"{"a":1}"#);
        assert!(got.lock().map(|g| g.is_none()).unwrap_or(false));

        fx.session
            .transport()
            .deliver("/topic/chat", r#"{"sender":"kim","text":"hi"}"#);
        let Ok(slot) = got.lock() else {
            panic!("mutex poisoned");
        };
        assert_eq!(
            *slot,
            Some(Chat {
                sender: "kim".to_string(),
                text: "hi".to_string()
            })
        );
    }

    #[tokio::test]
    async fn token_is_read_per_operation() {
        let fx = fixture();
        fx.tokens.set("jwt", "token-2");
        assert!(fx.session.connect().await.is_ok());

        fx.tokens.set("jwt", "token-3");
        let sent = fx.session.send_message("/app/chat", &json!({"text": "hi"})).await;
        assert!(sent.is_ok());

        fx.tokens.remove("jwt");
        let Ok(handle) = fx.session.subscribe("/topic/x", |_: Value| {}).await else {
            panic!("subscribe failed");
        };

        let transport = fx.session.transport();
        let connect_headers = transport.connect_headers();
        assert_eq!(connect_headers.first().and_then(authorization), Some("token-2"));

        let published = transport.published();
        let Some(message) = published.first() else {
            panic!("nothing published");
        };
        assert_eq!(message.header(AUTHORIZATION_HEADER), Some("token-3"));
        assert_eq!(message.body, r#"{"text":"hi"}"#);
        assert_eq!(message.destination, "/app/chat");

        let headers = transport.subscription_headers(handle.id()).unwrap_or_default();
        assert_eq!(authorization(&headers), Some(""));
    }

    #[tokio::test]
    async fn reject_policy_refuses_overlapping_connect() {
        let options = SessionOptions {
            concurrent_connect: ConcurrentConnect::Reject,
            ..SessionOptions::default()
        };
        let fx = fixture_with(OnActivate::Hold, OnDeactivate::Disconnect, options);
        let first = spawn_connect(&fx.session);
        wait_for_state(&fx.session, SessionState::Connecting).await;

        let second = fx.session.connect().await;
        assert!(matches!(
            second,
            Err(SessionError::Busy {
                state: SessionState::Connecting
            })
        ));

        fx.session.transport().emit(TransportEvent::Connected);
        assert!(matches!(first.await, Ok(Ok(()))));
        assert_eq!(fx.session.transport().activations(), 1);
    }

    #[tokio::test]
    async fn share_policy_joins_overlapping_connect() {
        let fx = fixture_with(
            OnActivate::Hold,
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        );
        let first = spawn_connect(&fx.session);
        wait_for_state(&fx.session, SessionState::Connecting).await;
        let second = spawn_connect(&fx.session);
        tokio::task::yield_now().await;

        fx.session.transport().emit(TransportEvent::Connected);
        assert!(matches!(first.await, Ok(Ok(()))));
        assert!(matches!(second.await, Ok(Ok(()))));
        assert_eq!(fx.session.transport().activations(), 1);
    }

    #[tokio::test]
    async fn disconnect_during_connect_rejects_pending_connect() {
        let fx = fixture_with(
            OnActivate::Hold,
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        );
        let connecting = spawn_connect(&fx.session);
        wait_for_state(&fx.session, SessionState::Connecting).await;

        assert!(fx.session.disconnect().await.is_ok());
        assert!(matches!(
            connecting.await,
            Ok(Err(SessionError::ConnectionFailure { .. }))
        ));
        assert_eq!(fx.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn connect_while_disconnecting_is_busy() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        fx.session.transport().set_on_deactivate(OnDeactivate::Hold);
        let disconnecting = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.disconnect().await })
        };
        wait_for_state(&fx.session, SessionState::Disconnecting).await;

        assert!(matches!(
            fx.session.connect().await,
            Err(SessionError::Busy {
                state: SessionState::Disconnecting
            })
        ));

        fx.session.transport().emit(TransportEvent::Disconnected);
        assert!(matches!(disconnecting.await, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn unsolicited_drop_stays_active_by_default() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        fx.session.transport().emit(TransportEvent::Closed {
            reason: Some("1006".to_string()),
        });

        let mut rx = fx.session.watch_state();
        let dropped = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| !s.connected));
        assert!(matches!(dropped.await, Ok(Ok(_))));
        assert_eq!(fx.session.state(), SessionState::Connected);

        // still "active": connect resolves without reactivating
        assert!(fx.session.connect().await.is_ok());
        assert_eq!(fx.session.transport().activations(), 1);
        assert!(matches!(
            fx.session.send_message("/app/x", &1).await,
            Err(SessionError::NotConnected { .. })
        ));

        // disconnect then connect recovers
        assert!(fx.session.disconnect().await.is_ok());
        assert!(fx.session.connect().await.is_ok());
        assert!(fx.session.is_connected());
    }

    #[tokio::test]
    async fn unsolicited_drop_resets_to_idle_when_configured() {
        let options = SessionOptions {
            on_connection_drop: ConnectionDropPolicy::ResetToIdle,
            ..SessionOptions::default()
        };
        let fx = fixture_with(OnActivate::Connect, OnDeactivate::Disconnect, options);
        assert!(fx.session.connect().await.is_ok());
        fx.session
            .transport()
            .emit(TransportEvent::Closed { reason: None });
        wait_for_state(&fx.session, SessionState::Idle).await;

        assert!(fx.session.connect().await.is_ok());
        assert_eq!(fx.session.transport().activations(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_forgets_subscription() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        let Ok(handle) = fx.session.subscribe("/topic/x", |_: Value| {}).await else {
            panic!("subscribe failed");
        };
        assert_eq!(fx.session.snapshot().await.subscriptions, 1);

        assert!(fx.session.unsubscribe(&handle).await.is_ok());
        assert_eq!(fx.session.transport().subscription_count(), 0);
        assert_eq!(fx.session.snapshot().await.subscriptions, 0);
        // second call is a no-op
        assert!(fx.session.unsubscribe(&handle).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_destination_and_body_fail_fast() {
        let fx = fixture();
        assert!(fx.session.connect().await.is_ok());
        assert!(matches!(
            fx.session.send_message("  ", &1).await,
            Err(SessionError::InvalidDestination(_))
        ));

        let mut unsupported = std::collections::HashMap::new();
        unsupported.insert((1, 2), "tuple keys are not valid json");
        assert!(matches!(
            fx.session.send_message("/app/x", &unsupported).await,
            Err(SessionError::Serialization(_))
        ));
        assert!(fx.session.transport().published().is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_connection() {
        let fx = fixture();
        let idle = fx.session.snapshot().await;
        assert_eq!(idle.state, SessionState::Idle);
        assert!(idle.connected_since.is_none());

        assert!(fx.session.connect().await.is_ok());
        let connected = fx.session.snapshot().await;
        assert!(connected.connected);
        assert!(connected.transport_connected);
        assert!(connected.connected_since.is_some());
    }

    #[tokio::test]
    async fn failed_connect_can_be_retried_on_same_transport() {
        let fx = fixture_with(
            OnActivate::Close("broker restarting".to_string()),
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        );
        assert!(matches!(
            fx.session.connect().await,
            Err(SessionError::ConnectionFailure { .. })
        ));
        assert_eq!(fx.session.state(), SessionState::Idle);

        fx.session.transport().set_on_activate(OnActivate::Connect);
        assert!(fx.session.connect().await.is_ok());
        assert!(fx.session.is_connected());
        assert_eq!(fx.session.transport().activations(), 2);
    }

    /// Transport whose connection drops while a subscription is in flight.
    #[derive(Debug)]
    struct DropWhileSubscribing(MockTransport);

    impl BrokerTransport for DropWhileSubscribing {
        async fn activate(&self, connect_headers: Headers) -> Result<(), TransportError> {
            self.0.activate(connect_headers).await
        }

        async fn deactivate(&self) -> Result<(), TransportError> {
            self.0.deactivate().await
        }

        fn is_connected(&self) -> bool {
            self.0.is_connected()
        }

        async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
            self.0.publish(message).await
        }

        async fn subscribe(
            &self,
            id: SubscriptionId,
            destination: &str,
            headers: Headers,
            handler: MessageHandler,
        ) -> Result<(), TransportError> {
            self.0.subscribe(id, destination, headers, handler).await?;
            self.0.emit(TransportEvent::Closed {
                reason: Some("reset by peer".to_string()),
            });
            // let the pump apply the close before returning
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
            Ok(())
        }

        async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
            self.0.unsubscribe(id).await
        }
    }

    #[tokio::test]
    async fn drop_during_subscribe_leaves_no_stale_subscription() {
        let (mock, events) = MockTransport::new();
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let session = Session::new(
            DropWhileSubscribing(mock),
            events,
            tokens,
            SessionOptions::default(),
        );
        assert!(session.connect().await.is_ok());

        let result = session.subscribe("/topic/x", |_: Value| {}).await;
        assert!(matches!(
            result,
            Err(SessionError::NotConnected {
                operation: "subscribe"
            })
        ));
        let snapshot = session.snapshot().await;
        assert!(!snapshot.connected);
        assert_eq!(snapshot.subscriptions, 0);
    }

    #[tokio::test]
    async fn dropping_session_fails_pending_connect() {
        let fx = fixture_with(
            OnActivate::Hold,
            OnDeactivate::Disconnect,
            SessionOptions::default(),
        );
        let rx = {
            let mut lifecycle = fx.session.inner.lifecycle.lock().await;
            let ConnectStep::Activate(rx) = lifecycle.begin_connect(ConcurrentConnect::Share)
            else {
                panic!("idle session should activate");
            };
            rx
        };
        drop(fx);
        assert!(matches!(settle_connect(rx).await, Err(SessionError::Closed)));
    }
}
