// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A minimal mock language server for testing the bridge.
//!
//! Speaks Content-Length framed JSON-RPC over stdin/stdout and logs one
//! line per message to stderr. CLI flags control the exit code and failure
//! modes. No tokio, just a blocking read loop.

use std::io::{Read, Write};

use clap::Parser;
use serde_json::{Map, Value, json};
use stdio_bridge::bridge::StdoutDecoder;
use stdio_bridge::lsp::protocol::{RequestMessage, ResponseMessage};
use stdio_bridge::lsp::{Frame, Message};

/// Mock language server for integration testing.
#[derive(Parser, Debug)]
#[command(name = "mockls")]
struct Args {
    /// Exit code used when the `exit` notification arrives.
    #[arg(long, default_value_t = 0)]
    exit_code: i32,

    /// Abort the process when a message with this method arrives.
    #[arg(long, value_name = "METHOD")]
    crash: Option<String>,

    /// Report this environment variable in the `initialize` result (repeatable).
    #[arg(long = "env", value_name = "VAR")]
    env_vars: Vec<String>,
}

struct MockServer<W> {
    args: Args,
    out: W,
}

impl<W: Write> MockServer<W> {
    const fn new(args: Args, out: W) -> Self {
        Self { args, out }
    }

    /// Serves until `exit` or end of input. Returns the process exit code.
    fn run(&mut self, reader: &mut dyn Read) -> i32 {
        let mut decoder = StdoutDecoder::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) | Err(_) => return 1,
                Ok(n) => n,
            };
            for message in decoder.write_all(&buf[..n]) {
                let Ok(message) = Message::parse(&message) else {
                    log(&format!("ignoring malformed message: {message}"));
                    continue;
                };
                if let Some(code) = self.handle(message) {
                    return code;
                }
            }
        }
    }

    /// Handles one message. Returns an exit code once the server should stop.
    fn handle(&mut self, message: Message) -> Option<i32> {
        let Some(method) = message.method() else {
            log("ignoring response");
            return None;
        };
        log(&format!("received {method}"));

        if self.args.crash.as_deref() == Some(method) {
            log("crashing on request");
            std::process::abort();
        }

        match message {
            Message::Request(request) => {
                let reply = self.reply(request);
                self.respond(&reply);
                None
            }
            Message::Notification(notification) => {
                (notification.method == "exit").then_some(self.args.exit_code)
            }
            Message::Response(_) => None,
        }
    }

    fn reply(&self, request: RequestMessage) -> ResponseMessage {
        let result = match request.method.as_str() {
            "initialize" => self.initialize_result(),
            "shutdown" => Value::Null,
            _ => json!({ "method": request.method, "params": request.params }),
        };
        ResponseMessage {
            jsonrpc: "2.0".to_string(),
            id: Some(request.id),
            result: Some(result),
            error: None,
        }
    }

    fn initialize_result(&self) -> Value {
        let env: Map<String, Value> = self
            .args
            .env_vars
            .iter()
            .map(|name| {
                let value = std::env::var(name).map_or(Value::Null, Value::String);
                (name.clone(), value)
            })
            .collect();

        json!({
            "capabilities": {},
            "serverInfo": { "name": "mockls", "version": env!("CARGO_PKG_VERSION") },
            "env": env,
        })
    }

    fn respond(&mut self, response: &ResponseMessage) {
        let Ok(body) = serde_json::to_string(response) else {
            return;
        };
        let frame = Frame::encode(&body);
        let _ = self.out.write_all(&frame.to_vec());
        let _ = self.out.flush();
    }
}

fn log(line: &str) {
    let _ = writeln!(std::io::stderr(), "mockls: {line}");
}

fn main() {
    let args = Args::parse();
    let mut server = MockServer::new(args, std::io::stdout());
    let code = server.run(&mut std::io::stdin());
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &Value) -> Vec<u8> {
        Frame::encode(&body.to_string()).to_vec()
    }

    fn serve(args: &[&str], input: &[u8]) -> (i32, Vec<String>) {
        let args = Args::parse_from(std::iter::once("mockls").chain(args.iter().copied()));
        let mut out = Vec::new();
        let code = MockServer::new(args, &mut out).run(&mut &input[..]);
        (code, StdoutDecoder::new().write_all(&out))
    }

    #[test]
    fn test_initialize_shutdown_exit() -> anyhow::Result<()> {
        let mut input = frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}));
        input.extend(frame(&json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"})));
        input.extend(frame(&json!({"jsonrpc": "2.0", "method": "exit"})));

        let (code, replies) = serve(&["--exit-code", "4"], &input);
        assert_eq!(code, 4);
        assert_eq!(replies.len(), 2);

        let init: Value = serde_json::from_str(&replies[0])?;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "mockls");
        let shutdown: Value = serde_json::from_str(&replies[1])?;
        assert_eq!(shutdown["result"], Value::Null);
        Ok(())
    }

    #[test]
    fn test_other_requests_are_echoed() -> anyhow::Result<()> {
        let input = frame(&json!({
            "jsonrpc": "2.0", "id": "a", "method": "custom/echo", "params": {"text": "café 🎉"}
        }));
        let (code, replies) = serve(&[], &input);
        assert_eq!(code, 1);

        let reply: Value = serde_json::from_str(&replies[0])?;
        assert_eq!(reply["id"], "a");
        assert_eq!(reply["result"]["method"], "custom/echo");
        assert_eq!(reply["result"]["params"]["text"], "café 🎉");
        Ok(())
    }

    #[test]
    fn test_responses_and_unknown_notifications_get_no_reply() {
        let mut input = frame(&json!({"jsonrpc": "2.0", "id": 9, "result": null}));
        input.extend(frame(&json!({"jsonrpc": "2.0", "method": "initialized", "params": {}})));
        input.extend(frame(&json!({"jsonrpc": "2.0", "method": "exit"})));

        let (code, replies) = serve(&[], &input);
        assert_eq!(code, 0);
        assert!(replies.is_empty(), "unexpected replies: {replies:?}");
    }

    #[test]
    fn test_missing_env_is_reported_as_null() -> anyhow::Result<()> {
        let input = frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}));
        let (_, replies) = serve(&["--env", "MOCKLS_SURELY_UNSET_VAR"], &input);

        let init: Value = serde_json::from_str(&replies[0])?;
        assert_eq!(init["result"]["env"]["MOCKLS_SURELY_UNSET_VAR"], Value::Null);
        Ok(())
    }
}
