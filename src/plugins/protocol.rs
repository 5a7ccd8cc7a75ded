//! Plugin protocol definitions
//!
//! Newline-delimited JSON-RPC 2.0 over the plugin's stdin/stdout. Only the
//! subset the host needs is modelled: numeric request IDs, results, errors and
//! plugin-to-host notifications.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Liveness probe; any non-error result means healthy
pub const METHOD_PING: &str = "ping";

/// Execute a plugin-provided tool with params `{name, input}`
pub const METHOD_TOOL_EXECUTE: &str = "tool/execute";

/// Longest accepted output line from a plugin, excluding the terminator
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Request or notification sent to a plugin.
/// `id` is omitted for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a call expecting a response
    pub fn call(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a notification (no response expected)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Serialize as one protocol line, terminator included
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// JSON-RPC error object reported by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Error payload handed to callers in place of a result, so they branch
    /// on content rather than on failure.
    pub fn into_payload(self) -> Value {
        json!({
            "error": self.message,
            "code": self.code,
            "isError": true,
        })
    }
}

/// Any line a plugin may write. Every field is optional so responses and
/// notifications share one decode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// What the read loop should do with a decoded line
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a pending call; `outcome` is the result or the error payload
    Response { id: u64, outcome: Value },
    /// Unsolicited message from the plugin
    Notification { method: String, params: Option<Value> },
    /// Neither a usable response nor a notification
    Ignored,
}

impl Incoming {
    /// Classify a decoded line
    pub fn classify(self) -> Inbound {
        match self.id {
            Some(id) if id > 0 => {
                let outcome = match self.error {
                    Some(err) => err.into_payload(),
                    None => self.result.unwrap_or(Value::Null),
                };
                Inbound::Response {
                    id: id as u64,
                    outcome,
                }
            }
            _ => match self.method {
                Some(method) if !method.is_empty() => Inbound::Notification {
                    method,
                    params: self.params,
                },
                _ => Inbound::Ignored,
            },
        }
    }
}

/// Decode one output line
pub fn parse_line(line: &str) -> serde_json::Result<Inbound> {
    serde_json::from_str::<Incoming>(line).map(Incoming::classify)
}
