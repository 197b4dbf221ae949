// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! JSON-RPC message types and Content-Length frame encoding.

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Name of the only header the bridge writes.
pub const CONTENT_LENGTH: &str = "Content-Length";

fn default_null() -> serde_json::Value {
    serde_json::Value::Null
}

/// A JSON-RPC request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestMessage {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier echoed by the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

/// A JSON-RPC response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseMessage {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Identifier of the request being answered.
    pub id: Option<RequestId>,
    /// Result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

/// A JSON-RPC notification.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationMessage {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

/// A request identifier (number or string).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

/// Error object carried by a failed response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// Any JSON-RPC message, classified by shape.
///
/// Variant order matters for the untagged representation: a request carries
/// both `id` and `method`, a notification only `method`, a response only `id`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Message {
    /// Message with `id` and `method`.
    Request(RequestMessage),
    /// Message with `method` but no `id`.
    Notification(NotificationMessage),
    /// Message with `id` but no `method`.
    Response(ResponseMessage),
}

impl Message {
    /// Parses a decoded payload into a typed message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON-RPC object.
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).context("Failed to parse JSON-RPC message")
    }

    /// Returns the method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(request) => Some(&request.method),
            Self::Notification(notification) => Some(&notification.method),
            Self::Response(_) => None,
        }
    }

    /// Returns the request identifier for requests and responses.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(request) => Some(&request.id),
            Self::Response(response) => response.id.as_ref(),
            Self::Notification(_) => None,
        }
    }
}

/// One encoded frame: a header buffer followed by a payload buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `Content-Length: N\r\n\r\n`.
    pub header: Bytes,
    /// UTF-8 encoded payload, exactly `N` bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Encodes a serialized message. The declared length is the UTF-8 byte
    /// count of the payload, not its character count.
    #[must_use]
    pub fn encode(message: &str) -> Self {
        let payload = Bytes::copy_from_slice(message.as_bytes());
        let header = Bytes::from(format!("{CONTENT_LENGTH}: {}\r\n\r\n", payload.len()));
        Self { header, payload }
    }

    /// Total number of bytes on the wire.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// Returns true if the frame has no bytes at all (never the case for
    /// encoded frames, whose header is always present).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenates header and payload into one contiguous buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}
