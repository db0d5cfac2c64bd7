//! Streaming STOMP frame decoder.

use super::Frame;
use super::frame::split_head;
use crate::error::FrameError;

/// Accumulates WebSocket text chunks and yields complete frames.
///
/// Brokers may batch several frames into one WebSocket message or split a
/// frame across several; both are handled. Bare EOLs between frames are
/// heart-beats and are discarded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every frame it completes, in order.
    ///
    /// A frame that fails to parse is returned as an error and consumed, so
    /// one bad frame never blocks the ones behind it.
    pub fn push(&mut self, chunk: &str) -> Vec<Result<Frame, FrameError>> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();
        loop {
            let skip = self.buffer.len() - self.buffer.trim_start_matches(['\r', '\n']).len();
            self.buffer.drain(..skip);
            let Some(len) = self.next_frame_len() else {
                break;
            };
            let raw: String = self.buffer.drain(..len).collect();
            let text = raw.strip_suffix('\0').unwrap_or(&raw);
            frames.push(Frame::parse(text));
        }
        frames
    }

    /// Number of bytes buffered but not yet part of a complete frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Length of the next complete frame including its NUL, if buffered.
    fn next_frame_len(&self) -> Option<usize> {
        if let Some((head, body_start)) = split_head(&self.buffer) {
            let declared = head
                .split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line))
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| *name == "content-length")
                .and_then(|(_, value)| value.trim().parse::<usize>().ok());
            if let Some(declared) = declared {
                // a length past usize::MAX can never match; parse reports it
                let Some(end) = body_start.checked_add(declared) else {
                    return self.buffer.find('\0').map(|pos| pos + 1);
                };
                return match self.buffer.as_bytes().get(end) {
                    Some(0) => Some(end + 1),
                    // declared length is wrong; fall back to the first NUL
                    Some(_) => self.buffer.find('\0').map(|pos| pos + 1),
                    None => None,
                };
            }
        }
        self.buffer.find('\0').map(|pos| pos + 1)
    }
}
