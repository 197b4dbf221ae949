// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Events fanned out by a [`LanguageServer`](super::LanguageServer).

use serde::Serialize;

use crate::lsp::protocol::Message;

/// Identifies a kind of [`ServerEvent`], for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A decoded protocol message.
    LspMessage,
    /// A diagnostic line from the program.
    Log,
    /// The program became ready.
    Start,
    /// The program exited.
    Exit,
    /// The program aborted.
    Abort,
}

/// Something observed on an embedded language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A complete message decoded from the program's output.
    LspMessage(String),
    /// One line written to the program's diagnostic channel.
    Log(String),
    /// The program signalled readiness.
    Start,
    /// The program exited with the given code.
    Exit(i32),
    /// The program aborted with the given reason.
    Abort(String),
}

impl ServerEvent {
    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::LspMessage(_) => EventKind::LspMessage,
            Self::Log(_) => EventKind::Log,
            Self::Start => EventKind::Start,
            Self::Exit(_) => EventKind::Exit,
            Self::Abort(_) => EventKind::Abort,
        }
    }

    /// Parses an `LspMessage` payload. Returns `None` for other kinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON-RPC message.
    pub fn message(&self) -> Option<anyhow::Result<Message>> {
        match self {
            Self::LspMessage(payload) => Some(Message::parse(payload)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(ServerEvent::LspMessage(String::new()).kind(), EventKind::LspMessage);
        assert_eq!(ServerEvent::Log("x".into()).kind(), EventKind::Log);
        assert_eq!(ServerEvent::Start.kind(), EventKind::Start);
        assert_eq!(ServerEvent::Exit(0).kind(), EventKind::Exit);
        assert_eq!(ServerEvent::Abort("x".into()).kind(), EventKind::Abort);
    }

    #[test]
    fn test_message_parses_payload() -> Result<()> {
        let event =
            ServerEvent::LspMessage(r#"{"jsonrpc":"2.0","method":"window/logMessage"}"#.into());
        let message = event.message().context("not a message event")??;
        assert_eq!(message.method(), Some("window/logMessage"));
        assert!(ServerEvent::Start.message().is_none());
        Ok(())
    }

    #[test]
    fn test_serializes_with_type_tag() -> Result<()> {
        let json = serde_json::to_value(ServerEvent::Exit(2))?;
        assert_eq!(json, serde_json::json!({"type": "exit", "detail": 2}));
        let json = serde_json::to_value(ServerEvent::Start)?;
        assert_eq!(json, serde_json::json!({"type": "start"}));
        Ok(())
    }
}
