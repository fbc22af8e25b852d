//! Driver result printed on stdout
//!
//! These structs are the JSON payload the orchestrator parses after every
//! plugin call, e.g. `{"status":"Success","capabilities":{"attach":false}}`.

use serde::{Deserialize, Serialize};

/// Outcome of a driver call
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    #[serde(rename = "Not supported")]
    NotSupported,
}

/// Features this driver advertises on `init`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub attach: bool,
}

/// The single structured result of one plugin invocation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriverStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl DriverStatus {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
            device: None,
            capabilities: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            message: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn not_supported(command: &str) -> Self {
        Self {
            status: Status::NotSupported,
            message: Some(format!("{} is not supported", command)),
            ..Self::success()
        }
    }

    /// Result of `init`
    pub fn initialized() -> Self {
        Self {
            capabilities: Some(Capabilities { attach: false }),
            ..Self::success()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Failure
    }

    /// Serialize to the single JSON line written to stdout
    pub fn to_json(&self) -> String {
        // Only strings, bools and unit enums: serialization cannot fail
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"status":"Failure","message":"unserializable result"}"#.to_string())
    }
}
