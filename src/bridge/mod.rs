// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Typed events and event kinds.
pub mod events;
/// Listener registry with failure isolation.
pub mod hub;
/// Child-process backed program.
pub mod process;
/// Program trait and the callback slots handed to it.
pub mod program;
/// Lifecycle controller.
mod server;
/// Outbound encoder and input-byte source.
pub mod stdin;
/// Inbound decoder and output-byte sink.
pub mod stdout;
/// String-level transport for editor clients.
pub mod transport;

pub use events::{EventKind, ServerEvent};
pub use hub::{DeliveryError, Hub, ListenerId, ListenerResult, Subscription};
pub use process::ProcessProgram;
pub use program::{
    AbortSignal, DiagnosticSink, ExitSignal, Program, ProgramCallbacks, ProgramEnv, ReadySignal,
};
pub use server::LanguageServer;
pub use stdin::{StdinByte, StdinQueue, StdinSource};
pub use stdout::{StdoutDecoder, StdoutSink};
pub use transport::Transport;

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Nothing in the bridge holds a lock across user callbacks, so the data
/// behind a poisoned lock is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
