// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! stdio-bridge CLI.
//!
//! Runs a language server behind the bridge and relays Content-Length framed
//! messages between this process's stdin/stdout and the server.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use stdio_bridge::bridge::{EventKind, LanguageServer, ProcessProgram, ServerEvent, StdoutDecoder};
use stdio_bridge::config::{Config, LogLevel};
use stdio_bridge::error::BridgeError;
use stdio_bridge::lsp::{Frame, LifecycleState};

/// Target under which the language server's own log lines are re-emitted.
const SERVER_LOG_TARGET: &str = "stdio_bridge::server_log";

/// Output style of the bridge's own logs.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum LogFormat {
    /// Full single-line records.
    #[default]
    Default,
    /// Abbreviated single-line records.
    Compact,
    /// Multi-line, human oriented records.
    Pretty,
}

/// Command-line arguments for stdio-bridge.
#[derive(Parser, Debug)]
#[command(name = "stdio-bridge")]
#[command(about = "Byte-exact stdio framing bridge for embedded language servers")]
#[command(version = env!("STDIO_BRIDGE_VERSION"))]
struct Args {
    /// Path to configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level handed to the language server. Overrides the config file.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Filter for the bridge's own logs (e.g. "stdio_bridge=debug").
    /// Defaults to `RUST_LOG`, then "stdio_bridge=info".
    #[arg(long)]
    log_filter: Option<String>,

    /// Format of the bridge's own logs.
    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,

    /// Language server command and its arguments. Overrides the config file.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = match &args.log_filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter: {directives}"))?,
        None => EnvFilter::from_default_env().add_directive("stdio_bridge=info".parse()?),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Default => builder.init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
    Ok(())
}

fn resolve_command(args: &Args, config: &Config) -> Result<(String, Vec<String>)> {
    if let Some((command, rest)) = args.command.split_first() {
        return Ok((command.clone(), rest.to_vec()));
    }
    config
        .server
        .as_ref()
        .map(|server| (server.command.clone(), server.args.clone()))
        .ok_or_else(|| anyhow!("No language server command given and none configured"))
}

/// Writes one framed message to this process's stdout.
fn write_frame(message: &str) -> Result<()> {
    let frame = Frame::encode(message);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&frame.header)?;
    stdout.write_all(&frame.payload)?;
    stdout.flush()?;
    Ok(())
}

/// Decodes framed messages from this process's stdin and forwards them.
///
/// Runs on a plain thread: a blocking stdin read must not hold up runtime
/// shutdown once the server has exited.
fn relay_host_input(server: LanguageServer) {
    let mut decoder = StdoutDecoder::new();
    let mut stdin = std::io::stdin().lock();
    let mut buf = [0u8; 4096];

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Error reading host stdin: {}", e);
                break;
            }
        };

        for message in decoder.write_all(&buf[..n]) {
            match server.send_raw(&message) {
                Ok(()) => {}
                Err(BridgeError::NotRunning | BridgeError::InputClosed) => {
                    debug!("Language server no longer accepts input");
                    return;
                }
                Err(e) => warn!("Failed to forward message: {}", e),
            }
        }
    }

    if !decoder.is_idle() {
        warn!(
            "Host stdin closed mid-frame, dropping {} bytes",
            decoder.buffered_bytes()
        );
    }
    debug!("Host stdin closed");
    server.close_stdin();
}

fn exit_code(state: &LifecycleState) -> ExitCode {
    match state {
        LifecycleState::Exited(code) => {
            info!("Language server exited with code {code}");
            ExitCode::from(u8::try_from(*code).unwrap_or(1))
        }
        LifecycleState::Aborted(reason) => {
            error!("Language server aborted: {reason}");
            ExitCode::FAILURE
        }
        other => {
            warn!("Language server stopped while {other}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut config = Config::load(args.config.clone())?;
    if let Some(level) = args.log_level {
        config.log_level = Some(level);
    }

    let (command, command_args) = resolve_command(&args, &config)?;
    info!("Starting stdio-bridge for {command}");

    let program = ProcessProgram::new(command, command_args);
    let server = LanguageServer::new(program, config.bridge_options());

    let _messages = server.on(EventKind::LspMessage, |event| {
        if let ServerEvent::LspMessage(message) = event {
            write_frame(message).context("Failed to write to host stdout")?;
        }
        Ok(())
    });
    let _logs = server.on(EventKind::Log, |event| {
        if let ServerEvent::Log(line) = event {
            info!(target: SERVER_LOG_TARGET, "{line}");
        }
        Ok(())
    });
    server.hub().set_error_hook(|id, e| warn!("Event listener {id} failed: {e}"));

    server
        .run()
        .await
        .context("Failed to start language server")?;

    let relay = server.clone();
    std::thread::Builder::new()
        .name("stdio-bridge-host-stdin".to_string())
        .spawn(move || relay_host_input(relay))
        .context("Failed to start host input thread")?;

    let state = server.wait_for_exit().await;
    Ok(exit_code(&state))
}
