//! # doguin-client
//!
//! Real-time messaging client for the doguin backend.
//!
//! The core is a [`session::Session`]: one logical STOMP-over-WebSocket
//! session exposing `connect`, `disconnect`, `send_message` and `subscribe`
//! as async operations. The session drives a [`transport::BrokerTransport`]
//! and settles every pending operation from an explicit state machine
//! instead of ad-hoc event callbacks.
//!
//! ## Architecture
//!
//! ```text
//! Application
//!     │
//!     ├── Session (session/)          connect / disconnect / publish / subscribe
//!     │     ├── Lifecycle             Idle → Connecting → Connected → Disconnecting
//!     │     └── TokenStore (token/)   bearer token, re-read per operation
//!     │
//!     ├── BrokerTransport (transport/)
//!     │     ├── StompTransport        STOMP 1.2 over tokio-tungstenite
//!     │     └── MockTransport         scriptable in-memory transport
//!     │
//!     ├── STOMP codec (stomp/)
//!     └── ApiClient (api/)            REST helper
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod session;
pub mod stomp;
pub mod token;
pub mod transport;
