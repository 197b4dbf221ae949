// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The boundary between the bridge and an embedded language-server program.
//!
//! A [`Program`] is launched with a [`ProgramCallbacks`] bundle holding every
//! slot it may call: an input source, an output sink, a diagnostic sink and
//! the three lifecycle signals. The signals are consumed when fired, so each
//! one fires at most once per run.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use super::events::ServerEvent;
use super::server::{RunContext, Startup};
use super::stdin::StdinSource;
use super::stdout::StdoutSink;

/// An embeddable language-server program.
///
/// `launch` is called once per [`LanguageServer::run`](super::LanguageServer::run)
/// with a fresh set of callbacks. It should start the program (on its own
/// thread, task or event loop) and return; an error means the program could
/// not be started at all.
pub trait Program: Send + Sync + 'static {
    /// Starts one instance of the program wired to `callbacks`.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be instantiated.
    fn launch(&self, callbacks: ProgramCallbacks) -> anyhow::Result<()>;
}

/// Environment variables visible to the program, editable until it is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramEnv {
    vars: BTreeMap<String, String>,
}

impl ProgramEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Reads a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterates over all variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variable is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProgramEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Every callback slot handed to a launched program.
#[derive(Debug)]
pub struct ProgramCallbacks {
    /// Pull side of the program's input.
    pub stdin: StdinSource,
    /// Push side of the program's output.
    pub stdout: StdoutSink,
    /// Diagnostic channel, forwarded as log events.
    pub stderr: DiagnosticSink,
    /// Fired once when the program is ready to exchange bytes.
    pub ready: ReadySignal,
    /// Fired when the program exits.
    pub exit: ExitSignal,
    /// Fired when the program aborts.
    pub abort: AbortSignal,
}

impl ProgramCallbacks {
    pub(crate) fn new(stdin: StdinSource, context: &RunContext, startup: &Arc<Startup>) -> Self {
        Self {
            stdin,
            stdout: StdoutSink::new(context.clone()),
            stderr: DiagnosticSink::new(context.clone()),
            ready: ReadySignal {
                context: context.clone(),
                startup: startup.clone(),
            },
            exit: ExitSignal {
                context: context.clone(),
                startup: startup.clone(),
            },
            abort: AbortSignal {
                context: context.clone(),
                startup: startup.clone(),
            },
        }
    }
}

/// Signals that the program finished its setup.
#[derive(Debug)]
pub struct ReadySignal {
    context: RunContext,
    startup: Arc<Startup>,
}

impl ReadySignal {
    /// Marks the program ready. Startup configuration (log level and log
    /// destination) is written into `env` first; this is the last point at
    /// which the program can pick it up.
    pub fn fire(self, env: &mut ProgramEnv) {
        self.context.ready(env, &self.startup);
    }
}

/// Reports a normal termination.
#[derive(Debug)]
pub struct ExitSignal {
    context: RunContext,
    startup: Arc<Startup>,
}

impl ExitSignal {
    /// Reports that the program exited with `code`.
    pub fn fire(self, code: i32) {
        self.context.exit(code, &self.startup);
    }
}

/// Reports an abnormal termination.
#[derive(Debug)]
pub struct AbortSignal {
    context: RunContext,
    startup: Arc<Startup>,
}

impl AbortSignal {
    /// Reports that the program aborted with `reason`.
    pub fn fire(self, reason: impl Into<String>) {
        self.context.abort(reason.into(), &self.startup);
    }
}

/// Diagnostic channel of the program.
///
/// Accepts whole lines or raw bytes; bytes are assembled into lines split on
/// `\n`. Each line is broadcast as [`ServerEvent::Log`].
#[derive(Debug)]
pub struct DiagnosticSink {
    line: Vec<u8>,
    context: RunContext,
}

impl DiagnosticSink {
    fn new(context: RunContext) -> Self {
        Self {
            line: Vec::new(),
            context,
        }
    }

    /// Forwards one complete line.
    pub fn write_line(&self, line: &str) {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        trace!("Language server log: {line}");
        self.context.broadcast(&ServerEvent::Log(line.to_string()));
    }

    /// Accepts one raw diagnostic byte.
    pub fn write_byte(&mut self, byte: u8) {
        if byte == b'\n' {
            self.emit();
        } else {
            self.line.push(byte);
        }
    }

    /// Accepts a run of raw diagnostic bytes.
    pub fn write_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    /// Forwards a trailing line that was never terminated, if any.
    pub fn finish(&mut self) {
        if !self.line.is_empty() {
            self.emit();
        }
    }

    fn emit(&mut self) {
        let bytes = std::mem::take(&mut self.line);
        self.write_line(&String::from_utf8_lossy(&bytes));
    }
}
