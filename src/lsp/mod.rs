// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// LSP message protocol definitions and wire framing.
pub mod protocol;
/// Lifecycle state of an embedded language server.
pub mod state;

pub use protocol::{Frame, Message};
pub use state::LifecycleState;
