//! STOMP 1.2 text framing.
//!
//! [`Frame`] models a single frame and knows how to encode and parse
//! itself. [`FrameDecoder`] turns a stream of WebSocket text chunks into
//! frames, tolerating heart-beat EOLs and frames split across chunks.

pub mod decoder;
pub mod frame;

pub use decoder::FrameDecoder;
pub use frame::{Command, Frame};
