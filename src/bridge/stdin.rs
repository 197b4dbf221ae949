// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Outbound side: frames queued for the program, pulled one byte at a time.

use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, trace};

use super::server::RunContext;
use crate::lsp::protocol::Frame;

/// Outcome of a single pull from the program's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinByte {
    /// The next byte of input.
    Byte(u8),
    /// Nothing queued right now; poll again later.
    WouldBlock,
    /// Input was closed and fully consumed.
    Eof,
}

/// FIFO of byte buffers consumed one byte at a time.
#[derive(Debug, Default)]
pub struct StdinQueue {
    pending: VecDeque<Bytes>,
    offset: usize,
    // Bytes not yet dequeued across every pending buffer.
    len: usize,
    closed: bool,
}

impl StdinQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames `message` and appends its header and payload buffers.
    pub fn enqueue(&mut self, message: &str) {
        self.push_frame(Frame::encode(message));
    }

    /// Appends an already encoded frame.
    pub fn push_frame(&mut self, frame: Frame) {
        trace!(
            "Queued frame: {} header + {} payload bytes",
            frame.header.len(),
            frame.payload.len()
        );
        self.len += frame.header.len() + frame.payload.len();
        self.pending.push_back(frame.header);
        self.pending.push_back(frame.payload);
    }

    /// Marks the input as closed. Bytes already queued are still delivered;
    /// `Eof` is reported once they are gone.
    pub const fn close(&mut self) {
        self.closed = true;
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of bytes not yet dequeued.
    #[must_use]
    pub const fn pending_bytes(&self) -> usize {
        self.len
    }

    /// Returns true if no byte is waiting.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pulls the next byte.
    ///
    /// Exhausted (and empty) buffers are skipped within the same call, so
    /// `WouldBlock` is only returned when no byte is queued at all.
    pub fn dequeue_byte(&mut self) -> StdinByte {
        loop {
            let Some(buffer) = self.pending.front() else {
                return if self.closed {
                    StdinByte::Eof
                } else {
                    StdinByte::WouldBlock
                };
            };

            if let Some(&byte) = buffer.get(self.offset) {
                self.offset += 1;
                self.len -= 1;
                return StdinByte::Byte(byte);
            }

            self.pending.pop_front();
            self.offset = 0;
        }
    }
}

/// Input-byte source handed to the program.
///
/// Owns the receiving end of the bridge's outbound channel and its own
/// [`StdinQueue`]; nothing else touches either.
pub struct StdinSource {
    queue: StdinQueue,
    frames: UnboundedReceiver<Frame>,
    context: RunContext,
    settled: bool,
}

impl StdinSource {
    pub(crate) fn new(frames: UnboundedReceiver<Frame>, context: RunContext) -> Self {
        Self {
            queue: StdinQueue::new(),
            frames,
            context,
            settled: false,
        }
    }

    /// Pulls the next input byte without blocking.
    pub fn read_byte(&mut self) -> StdinByte {
        if self.queue.is_empty() {
            self.refill();
        }

        let byte = self.queue.dequeue_byte();
        if !self.settled && matches!(byte, StdinByte::Byte(_)) {
            self.settled = self.context.mark_running();
        }
        byte
    }

    /// Moves every frame sent so far into the local queue.
    fn refill(&mut self) {
        if self.queue.is_closed() {
            return;
        }
        loop {
            match self.frames.try_recv() {
                Ok(frame) => self.queue.push_frame(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Language server input closed");
                    self.queue.close();
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for StdinSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinSource")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut StdinQueue) -> Vec<u8> {
        let mut out = Vec::new();
        while let StdinByte::Byte(b) = queue.dequeue_byte() {
            out.push(b);
        }
        out
    }

    #[test]
    fn test_enqueue_initialize_bytes() {
        let mut queue = StdinQueue::new();
        queue.enqueue(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);

        assert_eq!(
            drain(&mut queue),
            b"Content-Length: 47\r\n\r\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}"
        );
    }

    #[test]
    fn test_empty_queue_would_block_repeatedly() {
        let mut queue = StdinQueue::new();
        assert_eq!(queue.dequeue_byte(), StdinByte::WouldBlock);
        assert_eq!(queue.dequeue_byte(), StdinByte::WouldBlock);
    }

    #[test]
    fn test_no_would_block_across_buffer_boundaries() {
        let mut queue = StdinQueue::new();
        // Empty payload buffer sits between two headers.
        queue.enqueue("");
        queue.enqueue("x");
        let expected = b"Content-Length: 0\r\n\r\nContent-Length: 1\r\n\r\nx";

        let pulled: Vec<StdinByte> = (0..expected.len()).map(|_| queue.dequeue_byte()).collect();
        let wanted: Vec<StdinByte> = expected.iter().map(|&b| StdinByte::Byte(b)).collect();
        assert_eq!(pulled, wanted);
        assert_eq!(queue.dequeue_byte(), StdinByte::WouldBlock);
    }

    #[test]
    fn test_concatenates_in_call_order() {
        let messages = ["first", "", "café 🎉", r#"{"id":2}"#];
        let mut queue = StdinQueue::new();
        let mut expected = Vec::new();
        for message in messages {
            queue.enqueue(message);
            expected.extend_from_slice(format!("Content-Length: {}\r\n\r\n", message.len()).as_bytes());
            expected.extend_from_slice(message.as_bytes());
        }

        assert_eq!(queue.pending_bytes(), expected.len());
        assert_eq!(drain(&mut queue), expected);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_drains_then_reports_eof() {
        let mut queue = StdinQueue::new();
        queue.enqueue("ab");
        queue.close();

        let bytes = drain(&mut queue);
        assert_eq!(bytes, b"Content-Length: 2\r\n\r\nab");
        assert_eq!(queue.dequeue_byte(), StdinByte::Eof);
        // End of stream is sticky, like a closed descriptor.
        assert_eq!(queue.dequeue_byte(), StdinByte::Eof);
    }

    #[test]
    fn test_interleaved_enqueue_and_dequeue() {
        let mut queue = StdinQueue::new();
        queue.enqueue("a");
        for _ in 0.."Content-Length: 1\r\n\r\n".len() {
            assert!(matches!(queue.dequeue_byte(), StdinByte::Byte(_)));
        }
        queue.enqueue("b");
        assert_eq!(queue.dequeue_byte(), StdinByte::Byte(b'a'));
        assert_eq!(queue.dequeue_byte(), StdinByte::Byte(b'C'));
        assert_eq!(queue.pending_bytes(), "ontent-Length: 1\r\n\r\nb".len());
    }

    #[test]
    fn test_pending_count_tracks_a_long_drain() {
        const FRAMES: usize = 5000;
        let frame_len = "Content-Length: 2\r\n\r\n{}".len();
        let mut queue = StdinQueue::new();
        for _ in 0..FRAMES {
            queue.enqueue("{}");
        }
        assert_eq!(queue.pending_bytes(), FRAMES * frame_len);

        let mut pulled = 0;
        while let StdinByte::Byte(_) = queue.dequeue_byte() {
            pulled += 1;
            assert_eq!(queue.pending_bytes(), FRAMES * frame_len - pulled);
            assert_eq!(queue.is_empty(), pulled == FRAMES * frame_len);
        }
        assert_eq!(pulled, FRAMES * frame_len);
        assert!(queue.is_empty());

        // Enqueueing after a full drain starts the count again.
        queue.enqueue("");
        assert_eq!(queue.pending_bytes(), "Content-Length: 0\r\n\r\n".len());
        assert!(!queue.is_empty());
    }
}
