// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for the `stdio-bridge` binary.
//!
//! Runs the binary in front of `mockls` and talks framed JSON-RPC to it the
//! way an editor would.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use stdio_bridge::bridge::StdoutDecoder;
use stdio_bridge::lsp::Frame;
use tempfile::tempdir;

fn frames(messages: &[Value]) -> Vec<u8> {
    messages
        .iter()
        .flat_map(|m| Frame::encode(&m.to_string()).to_vec())
        .collect()
}

/// Runs the bridge with `args`, feeds it `input`, and waits for it to exit.
fn run_bridge(config_home: &Path, args: &[&str], input: &[u8]) -> Result<Output> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_stdio-bridge"))
        .args(args)
        // Isolate from user-level config
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("STDIO_BRIDGE_LOG_LEVEL")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn stdio-bridge")?;

    let mut stdin = child.stdin.take().context("Failed to get stdin")?;
    stdin.write_all(input).context("Failed to write to stdin")?;
    drop(stdin);

    child.wait_with_output().context("Failed to wait for stdio-bridge")
}

fn decode(stdout: &[u8]) -> Result<Vec<Value>> {
    StdoutDecoder::new()
        .write_all(stdout)
        .iter()
        .map(|m| serde_json::from_str(m).context("Output frame is not JSON"))
        .collect()
}

#[test]
fn test_relays_messages_and_mirrors_exit_code() -> Result<()> {
    let dir = tempdir()?;
    let input = frames(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"}),
        json!({"jsonrpc": "2.0", "method": "exit"}),
    ]);

    let output = run_bridge(
        dir.path(),
        &["--", env!("CARGO_BIN_EXE_mockls"), "--exit-code", "5"],
        &input,
    )?;

    assert_eq!(output.status.code(), Some(5));
    let replies = decode(&output.stdout)?;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "mockls");
    assert_eq!(replies[1]["id"], 2);
    Ok(())
}

#[test]
fn test_server_logs_reach_stderr() -> Result<()> {
    let dir = tempdir()?;
    let input = frames(&[json!({"jsonrpc": "2.0", "method": "exit"})]);

    let output = run_bridge(
        dir.path(),
        &["--log-filter", "stdio_bridge=info", "--", env!("CARGO_BIN_EXE_mockls")],
        &input,
    )?;

    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("mockls: received exit"),
        "server log missing from stderr: {stderr}"
    );
    Ok(())
}

#[test]
fn test_server_and_log_level_from_config_file() -> Result<()> {
    let dir = tempdir()?;
    let config_path = dir.path().join("bridge.toml");
    std::fs::write(
        &config_path,
        format!(
            "log_level = \"warn\"\n\n[server]\ncommand = {:?}\nargs = [\"--env\", \"RUNE_LOG\"]\n",
            env!("CARGO_BIN_EXE_mockls")
        ),
    )?;
    let input = frames(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        json!({"jsonrpc": "2.0", "method": "exit"}),
    ]);

    let config_arg = config_path.to_str().context("invalid config path")?;
    let output = run_bridge(dir.path(), &["--config", config_arg], &input)?;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(decode(&output.stdout)?[0]["result"]["env"]["RUNE_LOG"], "warn");

    // The command line wins over the config file.
    let output = run_bridge(
        dir.path(),
        &["--config", config_arg, "--log-level", "trace"],
        &input,
    )?;
    assert_eq!(decode(&output.stdout)?[0]["result"]["env"]["RUNE_LOG"], "trace");
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_server_crash_exits_with_failure() -> Result<()> {
    let dir = tempdir()?;
    let input = frames(&[json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})]);

    let output = run_bridge(
        dir.path(),
        &["--", env!("CARGO_BIN_EXE_mockls"), "--crash", "initialize"],
        &input,
    )?;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    Ok(())
}

#[test]
fn test_missing_server_command_fails() -> Result<()> {
    let dir = tempdir()?;
    let output = run_bridge(dir.path(), &[], b"")?;
    assert!(!output.status.success());

    let mut stderr = String::new();
    output.stderr.as_slice().read_to_string(&mut stderr)?;
    assert!(stderr.contains("No language server command"), "stderr: {stderr}");
    Ok(())
}
