// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Error types surfaced by the bridge.

use thiserror::Error;

/// Errors returned by [`LanguageServer`](crate::bridge::LanguageServer).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `run` was called while a previous run is starting or active.
    #[error("language server is already running")]
    AlreadyRunning,

    /// A message was sent while no run is active.
    #[error("language server is not running")]
    NotRunning,

    /// A message was sent after the input channel was closed.
    #[error("language server input is closed")]
    InputClosed,

    /// The program did not reach the ready state.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// A message could not be serialized, or message text was not JSON.
    #[error("invalid JSON message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a run failed before the program became ready.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The program could not be launched at all.
    #[error("failed to launch language server: {0:#}")]
    Launch(anyhow::Error),

    /// The program exited before signalling readiness.
    #[error("language server exited with code {0} during startup")]
    Exited(i32),

    /// The program aborted before signalling readiness.
    #[error("language server aborted during startup: {0}")]
    Aborted(String),

    /// The program dropped its callbacks without reporting any outcome.
    #[error("language server stopped before signalling readiness")]
    Abandoned,
}

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;
