//! STOMP frame model, encoder and parser.

use std::fmt;
use std::str::FromStr;

use crate::domain::{Headers, OutboundMessage, message};
use crate::error::FrameError;

/// STOMP commands used by a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client → broker: open a session (1.0 style).
    Connect,
    /// Client → broker: open a session (1.2 style).
    Stomp,
    /// Broker → client: session accepted.
    Connected,
    /// Client → broker: publish to a destination.
    Send,
    /// Client → broker: register a subscription.
    Subscribe,
    /// Client → broker: remove a subscription.
    Unsubscribe,
    /// Client → broker: graceful shutdown.
    Disconnect,
    /// Broker → client: message for a subscription.
    Message,
    /// Broker → client: acknowledgement of a `receipt` header.
    Receipt,
    /// Broker → client: protocol or application error.
    Error,
}

impl Command {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "STOMP" => Ok(Self::Stomp),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(FrameError::UnknownCommand(other.to_string())),
        }
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order.
    pub headers: Headers,
    /// Body text; empty for most control frames.
    pub body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends several headers in order.
    #[must_use]
    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of the first header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        message::header(&self.headers, name)
    }

    /// Builds the CONNECT frame opening a session on `host`.
    #[must_use]
    pub fn connect(host: &str, connect_headers: Headers) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", "1.2,1.1,1.0")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
            .with_headers(connect_headers)
    }

    /// Builds a SEND frame from an outbound message.
    #[must_use]
    pub fn send(message: OutboundMessage) -> Self {
        Self::new(Command::Send)
            .with_header("destination", message.destination)
            .with_headers(message.headers)
            .with_body(message.body)
    }

    /// Encodes the frame, including the trailing NUL octet.
    ///
    /// A `content-length` header is added when the body is non-empty and
    /// the caller did not set one.
    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            push_header(&mut out, name, value, escape);
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            push_header(&mut out, "content-length", &self.body.len().to_string(), false);
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parses one frame. `text` must not contain the trailing NUL octet.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the command is unknown, the header
    /// block is unterminated or malformed, or `content-length` disagrees
    /// with the body.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let (head, body_start) = split_head(text).ok_or(FrameError::MissingHeaderTerminator)?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
        let command: Command = lines.next().unwrap_or_default().parse()?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let body = text.get(body_start..).unwrap_or_default();
        if let Some(raw) = message::header(&headers, "content-length") {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            if len != body.len() {
                return Err(FrameError::InvalidContentLength(raw.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

/// Splits off the header block. Returns the block (without the blank line)
/// and the byte offset where the body starts.
pub(crate) fn split_head(text: &str) -> Option<(&str, usize)> {
    let lf = text.find("\n\n").map(|pos| (pos, pos + 2));
    let crlf = text.find("\n\r\n").map(|pos| (pos, pos + 3));
    let (end, body_start) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    text.get(..end).map(|head| (head, body_start))
}

fn push_header(out: &mut String, name: &str, value: &str, escape: bool) {
    if escape {
        push_escaped(out, name);
        out.push(':');
        push_escaped(out, value);
    } else {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
    }
    out.push('\n');
}

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
