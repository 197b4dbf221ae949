// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! stdio-bridge connects language servers that cannot own real file
//! descriptors to hosts that speak Content-Length framed LSP.
//!
//! The embedded program pulls its input one byte at a time and pushes its
//! output one byte at a time. The bridge frames outgoing messages, decodes
//! incoming ones, tracks the program's lifecycle, and fans every event out
//! to listeners that cannot disturb one another.

/// Byte-level bridge between a host and an embedded language server.
pub mod bridge;
/// Configuration for the bridge and the language server it hosts.
pub mod config;
/// Error types.
pub mod error;
/// LSP message types, framing and lifecycle state.
pub mod lsp;

pub use bridge::{LanguageServer, ProcessProgram, Program, ServerEvent, Transport};
pub use config::{BridgeOptions, Config, LogLevel};
pub use error::{BridgeError, StartupError};
pub use lsp::LifecycleState;
