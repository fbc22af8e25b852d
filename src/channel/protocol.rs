//! Wire messages for the control channel
//!
//! Every message is one JSON object terminated by `\n`. The agent answers each
//! request with exactly one response carrying the same `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Remote method accepting a [`LogRecord`]
pub const LOG_METHOD: &str = "Controller.Log";

/// Request sent from the plugin to the agent
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl Request {
    /// Create a request with a fresh time-sortable id
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Response sent from the agent back to the plugin
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result,
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Captured diagnostic output forwarded to the agent's log
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogRecord {
    #[serde(with = "lossy_text")]
    pub message: Vec<u8>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl LogRecord {
    pub fn new(message: impl Into<Vec<u8>>, is_error: bool) -> Self {
        Self {
            message: message.into(),
            is_error,
        }
    }
}

/// Bytes on the Rust side, a JSON string on the wire
///
/// Invalid UTF-8 is replaced with U+FFFD; the agent only ever displays it.
mod lossy_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        String::deserialize(deserializer).map(String::into_bytes)
    }
}
