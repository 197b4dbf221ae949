// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! String-level transport for editor clients.
//!
//! Editor LSP clients usually want JSON text in and JSON text out. A
//! [`Transport`] wraps a [`LanguageServer`] and speaks exactly that.

use serde::de::IgnoredAny;

use super::events::{EventKind, ServerEvent};
use super::hub::ListenerId;
use super::program::Program;
use super::server::LanguageServer;
use crate::config::BridgeOptions;
use crate::error::Result;

/// JSON text transport over a [`LanguageServer`].
#[derive(Debug, Clone)]
pub struct Transport {
    server: LanguageServer,
}

impl Transport {
    /// Wraps an existing server, running or not.
    #[must_use]
    pub const fn new(server: LanguageServer) -> Self {
        Self { server }
    }

    /// Creates a server for `program`, runs it, and returns a transport to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn connect(program: impl Program, options: BridgeOptions) -> Result<Self> {
        let server = LanguageServer::new(program, options);
        server.run().await?;
        Ok(Self::new(server))
    }

    /// The underlying server.
    #[must_use]
    pub const fn server(&self) -> &LanguageServer {
        &self.server
    }

    /// Checks that `message` is JSON and sends the text unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if `message` is not valid JSON or the server is not
    /// accepting input.
    pub fn send(&self, message: &str) -> Result<()> {
        serde_json::from_str::<IgnoredAny>(message)?;
        self.server.send_raw(message)
    }

    /// Registers `handler` for every message the server emits.
    pub fn subscribe<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.server
            .on(EventKind::LspMessage, move |event| {
                if let ServerEvent::LspMessage(text) = event {
                    handler(text);
                }
                Ok(())
            })
            .id()
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.server.hub().unsubscribe(id)
    }

    /// Closes the server's input.
    pub fn close(&self) {
        self.server.close_stdin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::lock;
    use crate::bridge::program::{ProgramCallbacks, ProgramEnv};
    use crate::bridge::stdin::StdinByte;
    use crate::error::BridgeError;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Echoes every input frame straight back as output.
    struct Loopback;

    impl Program for Loopback {
        fn launch(&self, callbacks: ProgramCallbacks) -> anyhow::Result<()> {
            let ProgramCallbacks {
                mut stdin,
                mut stdout,
                ready,
                exit,
                ..
            } = callbacks;
            ready.fire(&mut ProgramEnv::new());
            thread::spawn(move || {
                loop {
                    match stdin.read_byte() {
                        StdinByte::Byte(b) => stdout.write_byte(b),
                        StdinByte::WouldBlock => thread::sleep(Duration::from_millis(1)),
                        StdinByte::Eof => break,
                    }
                }
                exit.fire(0);
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_and_receive_json_text() -> anyhow::Result<()> {
        let transport = Transport::connect(Loopback, BridgeOptions::default()).await?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let id = transport.subscribe(move |text| lock(&sink).push(text.to_string()));

        transport.send(r#"{ "jsonrpc": "2.0", "method": "initialized", "params": {} }"#)?;
        transport.close();
        transport.server().wait_for_exit().await;

        assert_eq!(
            *lock(&received),
            vec![r#"{ "jsonrpc": "2.0", "method": "initialized", "params": {} }"#.to_string()]
        );
        assert!(transport.unsubscribe(id));
        assert!(!transport.unsubscribe(id));
        Ok(())
    }

    #[tokio::test]
    async fn test_text_is_forwarded_verbatim() -> anyhow::Result<()> {
        let transport = Transport::connect(Loopback, BridgeOptions::default()).await?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let _id = transport.subscribe(move |text| lock(&sink).push(text.to_string()));

        // Key order and integers wider than 64 bits survive the trip.
        let message = r#"{"method":"custom/big","jsonrpc":"2.0","params":{"z":1,"a":123456789012345678901234567890}}"#;
        transport.send(message)?;
        transport.close();
        transport.server().wait_for_exit().await;

        assert_eq!(*lock(&received), vec![message.to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() -> anyhow::Result<()> {
        let transport = Transport::connect(Loopback, BridgeOptions::default()).await?;
        assert!(matches!(
            transport.send("{not json"),
            Err(BridgeError::Serialize(_))
        ));
        transport.close();
        Ok(())
    }

    #[test]
    fn test_send_before_run_is_not_running() {
        let transport = Transport::new(LanguageServer::new(Loopback, BridgeOptions::default()));
        assert!(matches!(
            transport.send("{}"),
            Err(BridgeError::NotRunning)
        ));
    }
}
