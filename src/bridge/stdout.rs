// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Inbound side: incremental Content-Length frame decoding, one byte at a time.
//!
//! Content is counted in raw bytes and only decoded as UTF-8 once the whole
//! declared span has arrived, so multi-byte characters split across calls
//! never skew the count.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{trace, warn};

use super::events::ServerEvent;
use super::server::RunContext;

/// `name: value` header line, terminated by CRLF.
#[allow(clippy::expect_used, reason = "pattern is a literal checked by tests")]
static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w-]+):\s?(.*)\r\n$").expect("valid header pattern"));

/// Upper bound on the buffer reserved up front for a frame's content.
const MAX_PREALLOC: usize = 64 * 1024;

#[derive(Debug)]
enum ParserState {
    Header {
        raw: Vec<u8>,
        headers: HashMap<String, String>,
    },
    Content {
        raw: Vec<u8>,
        remaining: usize,
    },
}

impl Default for ParserState {
    fn default() -> Self {
        Self::Header {
            raw: Vec::new(),
            headers: HashMap::new(),
        }
    }
}

/// Incremental decoder for the program's output stream.
#[derive(Debug, Default)]
pub struct StdoutDecoder {
    state: ParserState,
}

impl StdoutDecoder {
    /// Creates a decoder waiting for the first header line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one byte. Returns the payload when it completes a frame.
    pub fn write_byte(&mut self, byte: u8) -> Option<String> {
        let content_length = match &mut self.state {
            ParserState::Header { raw, headers } => {
                raw.push(byte);
                if byte != b'\n' {
                    return None;
                }
                if let Some((name, value)) = parse_header_line(raw) {
                    trace!("Frame header {name}: {value}");
                    headers.insert(name, value);
                    raw.clear();
                    return None;
                }
                // Anything that is not a header line ends the header block.
                headers
                    .get("content-length")
                    .map_or(0, |value| parse_content_length(value))
            }
            ParserState::Content { raw, remaining } => {
                raw.push(byte);
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 {
                    return None;
                }
                let payload = std::mem::take(raw);
                self.state = ParserState::default();
                return Some(decode_payload(payload));
            }
        };

        if content_length == 0 {
            self.state = ParserState::default();
            return Some(String::new());
        }

        self.state = ParserState::Content {
            raw: Vec::with_capacity(content_length.min(MAX_PREALLOC)),
            remaining: content_length,
        };
        None
    }

    /// Feeds a slice byte by byte, collecting every completed payload.
    pub fn write_all(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.write_byte(b)).collect()
    }

    /// Returns true between frames, with no partial header buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(&self.state, ParserState::Header { raw, headers } if raw.is_empty() && headers.is_empty())
    }

    /// Bytes of the current, incomplete frame held by the decoder.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        match &self.state {
            ParserState::Header { raw, .. } | ParserState::Content { raw, .. } => raw.len(),
        }
    }
}

fn parse_header_line(raw: &[u8]) -> Option<(String, String)> {
    let line = String::from_utf8_lossy(raw);
    let captures = HEADER_LINE.captures(&line)?;
    Some((captures[1].to_lowercase(), captures[2].to_string()))
}

/// Reads the leading decimal digits of a header value.
///
/// Values with no leading digits, or too large to represent, count as 0 so a
/// single malformed frame cannot stall the decoder.
fn parse_content_length(value: &str) -> usize {
    let trimmed = value.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());

    match trimmed[..digits_end].parse::<usize>() {
        Ok(length) => length,
        Err(e) => {
            warn!("Invalid Content-Length {value:?} ({e}), treating as 0");
            0
        }
    }
}

fn decode_payload(payload: Vec<u8>) -> String {
    String::from_utf8(payload).unwrap_or_else(|e| {
        warn!("Frame payload is not valid UTF-8: {}", e.utf8_error());
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

/// Output-byte sink handed to the program.
///
/// Owns its decoder exclusively and forwards every completed message to the
/// bridge's listeners.
pub struct StdoutSink {
    decoder: StdoutDecoder,
    context: RunContext,
    settled: bool,
}

impl StdoutSink {
    pub(crate) fn new(context: RunContext) -> Self {
        Self {
            decoder: StdoutDecoder::new(),
            context,
            settled: false,
        }
    }

    /// Accepts one byte of program output.
    pub fn write_byte(&mut self, byte: u8) {
        if !self.settled {
            self.settled = self.context.mark_running();
        }
        if let Some(message) = self.decoder.write_byte(byte) {
            trace!("Received LSP message: {}", message);
            self.context.broadcast(&ServerEvent::LspMessage(message));
        }
    }

    /// Accepts a run of program output, byte by byte.
    pub fn write_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }
}

impl std::fmt::Debug for StdoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutSink")
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}
