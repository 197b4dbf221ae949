// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Lifecycle state of an embedded language server.

use serde::Serialize;
use std::fmt;

/// Run status of the embedded program, as seen by the bridge.
///
/// Exactly one variant is active at a time, so an exit code and an abort
/// reason can never be set together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum LifecycleState {
    /// Bridge constructed, or a run is starting but the program is not ready.
    #[default]
    NotInitialized,
    /// Program finished its setup and is ready to exchange bytes.
    Initialized,
    /// At least one byte has been exchanged since the program became ready.
    Running,
    /// Program terminated with an exit code.
    Exited(i32),
    /// Program hit an unrecoverable fault.
    Aborted(String),
}

impl LifecycleState {
    /// Returns true for `Exited` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Aborted(_))
    }

    /// Returns true while the program can exchange bytes.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Initialized | Self::Running)
    }

    /// Short lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Exited(_) => "exited",
            Self::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}
