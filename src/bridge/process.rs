// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A [`Program`] backed by a child process.
//!
//! The bridge's byte-level callbacks are pumped by plain threads: one writes
//! queued input to the child's stdin, one feeds its stdout to the decoder,
//! one forwards stderr lines, and one waits for the exit status.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::program::{DiagnosticSink, Program, ProgramCallbacks, ProgramEnv};
use super::stdin::{StdinByte, StdinSource};
use super::stdout::StdoutSink;

/// Delay between polls of an empty input queue.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Read buffer size for the child's output streams.
const READ_CHUNK: usize = 4096;

/// Runs a language server executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessProgram {
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    inherit_env: bool,
    poll_interval: Duration,
}

impl ProcessProgram {
    /// A program running `command` with `args`, inheriting this process's
    /// environment.
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            inherit_env: true,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Adds a variable to the child's environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Starts the child from an empty environment instead of this process's.
    #[must_use]
    pub const fn clear_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// How long the input pump sleeps when nothing is queued.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The executable being run.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    fn initial_env(&self) -> ProgramEnv {
        let mut env = if self.inherit_env {
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect()
        } else {
            ProgramEnv::new()
        };
        for (key, value) in &self.env {
            env.set(key.as_str(), value.as_str());
        }
        env
    }
}

impl Program for ProcessProgram {
    fn launch(&self, callbacks: ProgramCallbacks) -> Result<()> {
        let ProgramCallbacks {
            stdin,
            stdout,
            stderr,
            ready,
            exit,
            abort,
        } = callbacks;

        // The child's environment is final once readiness has been signalled.
        let mut env = self.initial_env();
        ready.fire(&mut env);

        debug!("Spawning language server: {} {:?}", self.command, self.args);
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn language server: {}", self.command))?;

        let child_stdin = child.stdin.take().context("stdin not captured")?;
        let child_stdout = child.stdout.take().context("stdout not captured")?;
        let child_stderr = child.stderr.take().context("stderr not captured")?;

        let poll_interval = self.poll_interval;
        spawn_named("stdin", move || pump_stdin(stdin, child_stdin, poll_interval))?;
        let stdout_pump = spawn_named("stdout", move || pump_stdout(child_stdout, stdout))?;
        let stderr_pump = spawn_named("stderr", move || pump_stderr(child_stderr, stderr))?;

        spawn_named("wait", move || {
            let status = child.wait();
            // Report the outcome only after all output has been delivered.
            join(stdout_pump);
            join(stderr_pump);

            match status {
                Ok(status) => match exit_code(status) {
                    Ok(code) => exit.fire(code),
                    Err(reason) => abort.fire(reason),
                },
                Err(e) => abort.fire(format!("failed to wait for language server: {e}")),
            }
        })?;

        Ok(())
    }
}

fn spawn_named<F>(role: &str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("stdio-bridge-{role}"))
        .spawn(f)
        .with_context(|| format!("Failed to start {role} thread"))
}

fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("Language server output thread panicked");
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> std::result::Result<i32, String> {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => Ok(code),
        (None, Some(signal)) => Err(format!("terminated by signal {signal}")),
        (None, None) => Err("terminated without an exit code".to_string()),
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> std::result::Result<i32, String> {
    status
        .code()
        .ok_or_else(|| "terminated without an exit code".to_string())
}

/// Writes queued input to the child, a burst at a time, until end of stream.
fn pump_stdin(mut source: StdinSource, mut sink: ChildStdin, poll_interval: Duration) {
    let mut burst = Vec::with_capacity(READ_CHUNK);
    loop {
        match source.read_byte() {
            StdinByte::Byte(byte) => {
                burst.push(byte);
                if burst.len() < READ_CHUNK {
                    continue;
                }
            }
            StdinByte::WouldBlock => {
                if burst.is_empty() {
                    thread::sleep(poll_interval);
                    continue;
                }
            }
            StdinByte::Eof => {
                if let Err(e) = write_burst(&mut sink, &burst) {
                    debug!("Language server stdin closed early: {}", e);
                }
                debug!("Closing language server stdin");
                return;
            }
        }

        if let Err(e) = write_burst(&mut sink, &burst) {
            debug!("Language server stdin closed: {}", e);
            return;
        }
        burst.clear();
    }
}

fn write_burst(sink: &mut ChildStdin, burst: &[u8]) -> std::io::Result<()> {
    if burst.is_empty() {
        return Ok(());
    }
    trace!("Writing {} bytes to language server", burst.len());
    sink.write_all(burst)?;
    sink.flush()
}

fn pump_stdout(mut source: impl Read, mut sink: StdoutSink) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match source.read(&mut buf) {
            Ok(0) => {
                debug!("Language server stdout closed");
                return;
            }
            Ok(n) => sink.write_all(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Error reading from language server stdout: {}", e);
                return;
            }
        }
    }
}

fn pump_stderr(mut source: impl Read, mut sink: DiagnosticSink) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => sink.write_all(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Error reading from language server stderr: {}", e);
                break;
            }
        }
    }
    sink.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_env_layers_configured_vars() {
        let program = ProcessProgram::new("rune-languageserver", ["--stdio"])
            .clear_env()
            .env("RUST_BACKTRACE", "1")
            .env("RUST_BACKTRACE", "full");

        let env = program.initial_env();
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("RUST_BACKTRACE"), Some("full"));
        assert_eq!(program.command(), "rune-languageserver");
    }

    #[test]
    fn test_inherited_env_is_default() {
        let program = ProcessProgram::new("ls", Vec::<String>::new()).env("STDIO_BRIDGE_TEST", "1");
        let env = program.initial_env();
        assert_eq!(env.get("PATH"), std::env::var("PATH").ok().as_deref());
        assert_eq!(env.get("STDIO_BRIDGE_TEST"), Some("1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_from_status() -> Result<()> {
        let status = Command::new("sh").args(["-c", "exit 7"]).status()?;
        assert_eq!(exit_code(status), Ok(7));

        let status = Command::new("sh").args(["-c", "kill -9 $$"]).status()?;
        assert_eq!(exit_code(status), Err("terminated by signal 9".to_string()));
        Ok(())
    }
}
