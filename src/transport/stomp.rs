//! STOMP 1.2 over WebSocket.
//!
//! [`StompTransport`] is created once and reused across activations. Each
//! activation spawns a *link* task owning one WebSocket connection; the
//! task handles the STOMP handshake, writes outbound frames, dispatches
//! MESSAGE frames to subscription handlers and reports lifecycle changes on
//! the event channel. Deactivation sends DISCONNECT with a receipt and ends
//! the link once the broker acknowledges it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::{BrokerTransport, EventReceiver, EventSender, event_channel};
use crate::domain::{
    Headers, InboundMessage, MessageHandler, OutboundMessage, SubscriptionId, TransportEvent,
};
use crate::error::TransportError;
use crate::stomp::{Command, Frame, FrameDecoder};

/// Sub-protocols offered during the WebSocket handshake.
const STOMP_SUBPROTOCOLS: &str = "v12.stomp, v11.stomp, v10.stomp";

/// Commands from the transport handle to its link task.
enum LinkCommand {
    Send(Frame),
    Subscribe {
        id: SubscriptionId,
        frame: Frame,
        handler: MessageHandler,
    },
    Unsubscribe {
        id: SubscriptionId,
        frame: Frame,
    },
    Disconnect,
}

/// A running link task and its command queue.
#[derive(Debug)]
struct Link {
    commands: mpsc::UnboundedSender<LinkCommand>,
    task: JoinHandle<()>,
}

impl Link {
    fn is_alive(&self) -> bool {
        !self.task.is_finished() && !self.commands.is_closed()
    }
}

/// How a link ended.
enum LinkEnd {
    /// Deactivation requested and completed.
    Deactivated,
    /// Connection lost or never established.
    Closed(Option<String>),
}

/// STOMP broker client over `tokio-tungstenite`.
#[derive(Debug)]
pub struct StompTransport {
    broker_url: String,
    events: EventSender,
    connected: Arc<AtomicBool>,
    link: Mutex<Option<Link>>,
}

impl StompTransport {
    /// Creates an inactive transport for `broker_url` (e.g.
    /// `wss://host/ws`) together with its event receiver.
    #[must_use]
    pub fn new(broker_url: impl Into<String>) -> (Self, EventReceiver) {
        let (events, rx) = event_channel();
        let transport = Self {
            broker_url: broker_url.into(),
            events,
            connected: Arc::new(AtomicBool::new(false)),
            link: Mutex::new(None),
        };
        (transport, rx)
    }

    /// Returns the broker URL this transport connects to.
    #[must_use]
    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    async fn send_command(&self, command: LinkCommand) -> Result<(), TransportError> {
        let link = self.link.lock().await;
        let Some(link) = link.as_ref() else {
            return Err(TransportError::NotActive);
        };
        link.commands
            .send(command)
            .map_err(|_| TransportError::LinkClosed)
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("transport event dropped; session gone");
        }
    }
}

impl BrokerTransport for StompTransport {
    async fn activate(&self, connect_headers: Headers) -> Result<(), TransportError> {
        let mut link = self.link.lock().await;
        if link.as_ref().is_some_and(Link::is_alive) {
            tracing::debug!(url = %self.broker_url, "transport already active");
            return Ok(());
        }

        let mut request = self
            .broker_url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl {
                url: self.broker_url.clone(),
                reason: e.to_string(),
            })?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(STOMP_SUBPROTOCOLS),
        );
        let host = request.uri().host().unwrap_or_default().to_string();

        let (commands, command_rx) = mpsc::unbounded_channel();
        let connect = Frame::connect(&host, connect_headers);
        let task = tokio::spawn(run_link(
            request,
            connect,
            command_rx,
            self.events.clone(),
            Arc::clone(&self.connected),
        ));
        tracing::debug!(url = %self.broker_url, "transport activated");
        *link = Some(Link { commands, task });
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), TransportError> {
        let link = self.link.lock().await.take();
        match link {
            Some(link) if link.is_alive() => {
                if link.commands.send(LinkCommand::Disconnect).is_err() {
                    self.emit(TransportEvent::Disconnected);
                }
            }
            _ => {
                self.connected.store(false, Ordering::SeqCst);
                self.emit(TransportEvent::Disconnected);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.send_command(LinkCommand::Send(Frame::send(message)))
            .await
    }

    async fn subscribe(
        &self,
        id: SubscriptionId,
        destination: &str,
        headers: Headers,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        let frame = Frame::new(Command::Subscribe)
            .with_header("id", id.to_string())
            .with_header("destination", destination)
            .with_header("ack", "auto")
            .with_headers(headers);
        self.send_command(LinkCommand::Subscribe { id, frame, handler })
            .await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        let frame = Frame::new(Command::Unsubscribe).with_header("id", id.to_string());
        self.send_command(LinkCommand::Unsubscribe { id, frame })
            .await
    }
}

/// Owns one WebSocket connection from handshake to close.
async fn run_link(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    connect: Frame,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSender,
    connected: Arc<AtomicBool>,
) {
    // a panic inside the link must still clear the flag and report the close
    let mut end = AssertUnwindSafe(drive_link(
        request,
        connect,
        &mut commands,
        &events,
        &connected,
    ))
    .catch_unwind()
    .await
    .unwrap_or_else(|_| {
        tracing::error!("link task panicked");
        LinkEnd::Closed(Some("link task panicked".to_string()))
    });
    connected.store(false, Ordering::SeqCst);

    // A deactivation queued while the socket was dying still counts.
    if matches!(end, LinkEnd::Closed(_)) {
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if matches!(command, LinkCommand::Disconnect) {
                end = LinkEnd::Deactivated;
            }
        }
    }

    let event = match end {
        LinkEnd::Deactivated => TransportEvent::Disconnected,
        LinkEnd::Closed(reason) => TransportEvent::Closed { reason },
    };
    tracing::debug!(event = event.event_type_str(), "link ended");
    let _ = events.send(event);
}

async fn drive_link(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    connect: Frame,
    commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    events: &EventSender,
    connected: &AtomicBool,
) -> LinkEnd {
    let (socket, _) = match connect_async(request).await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "websocket connect failed");
            return LinkEnd::Closed(Some(e.to_string()));
        }
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    tracing::trace!(command = %connect.command, ">>> frame");
    if let Err(e) = ws_tx.send(Message::text(connect.encode())).await {
        return LinkEnd::Closed(Some(e.to_string()));
    }

    let mut decoder = FrameDecoder::new();
    let mut handlers: HashMap<SubscriptionId, MessageHandler> = HashMap::new();
    let mut pending_receipt: Option<String> = None;

    loop {
        tokio::select! {
            // Outbound command from the transport handle
            command = commands.recv(), if pending_receipt.is_none() => {
                let frame = match command {
                    Some(LinkCommand::Send(frame)) => frame,
                    Some(LinkCommand::Subscribe { id, frame, handler }) => {
                        handlers.insert(id, handler);
                        frame
                    }
                    Some(LinkCommand::Unsubscribe { id, frame }) => {
                        handlers.remove(&id);
                        frame
                    }
                    Some(LinkCommand::Disconnect) | None => {
                        if !connected.load(Ordering::SeqCst) {
                            let _ = ws_tx.close().await;
                            return LinkEnd::Deactivated;
                        }
                        let receipt = format!("disconnect-{}", uuid::Uuid::new_v4());
                        pending_receipt = Some(receipt.clone());
                        Frame::new(Command::Disconnect).with_header("receipt", receipt)
                    }
                };
                tracing::trace!(command = %frame.command, ">>> frame");
                if let Err(e) = ws_tx.send(Message::text(frame.encode())).await {
                    return closed(pending_receipt.as_deref(), Some(e.to_string()));
                }
            }
            // Inbound data from the broker
            message = ws_rx.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                    Some(Ok(Message::Binary(bytes))) => {
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                tracing::warn!("dropping non-utf8 binary frame");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        let reason = close.map(|c| format!("{} {}", u16::from(c.code), c.reason.as_str()));
                        return closed(pending_receipt.as_deref(), reason);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return closed(pending_receipt.as_deref(), Some(e.to_string())),
                    None => return closed(pending_receipt.as_deref(), None),
                };

                for decoded in decoder.push(&text) {
                    let frame = match decoded {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed frame");
                            continue;
                        }
                    };
                    tracing::trace!(command = %frame.command, "<<< frame");
                    if on_frame(frame, &handlers, events, connected, pending_receipt.as_deref()) {
                        let _ = ws_tx.close().await;
                        return LinkEnd::Deactivated;
                    }
                }
            }
        }
    }
}

fn closed(pending_receipt: Option<&str>, reason: Option<String>) -> LinkEnd {
    if pending_receipt.is_some() {
        LinkEnd::Deactivated
    } else {
        LinkEnd::Closed(reason)
    }
}

/// Handles one inbound frame. Returns `true` when it completes a pending
/// deactivation.
fn on_frame(
    frame: Frame,
    handlers: &HashMap<SubscriptionId, MessageHandler>,
    events: &EventSender,
    connected: &AtomicBool,
    pending_receipt: Option<&str>,
) -> bool {
    match frame.command {
        Command::Connected => {
            tracing::debug!(version = frame.header("version"), "broker accepted session");
            connected.store(true, Ordering::SeqCst);
            let _ = events.send(TransportEvent::Connected);
        }
        Command::Message => {
            let subscription = frame
                .header("subscription")
                .and_then(|raw| raw.parse::<SubscriptionId>().ok());
            let Some(handler) = subscription.and_then(|id| handlers.get(&id)) else {
                tracing::debug!(
                    subscription = frame.header("subscription"),
                    "message for unknown subscription"
                );
                return false;
            };
            let message = InboundMessage {
                destination: frame.header("destination").unwrap_or_default().to_string(),
                subscription,
                message_id: frame.header("message-id").map(str::to_string),
                body: frame.body,
                headers: frame.headers,
            };
            handler(message);
        }
        Command::Receipt => {
            if pending_receipt.is_some() && frame.header("receipt-id") == pending_receipt {
                return true;
            }
        }
        Command::Error => {
            let message = frame.header("message").unwrap_or_default().to_string();
            tracing::error!(message = %message, "broker error frame");
            let _ = events.send(TransportEvent::BrokerError {
                message,
                body: frame.body,
            });
        }
        other => tracing::debug!(command = %other, "ignoring unexpected frame"),
    }
    false
}
