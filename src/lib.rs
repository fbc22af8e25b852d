//! flexplug - volume plugin CLI that delegates to a privileged mount agent
//!
//! Each plugin invocation is a short-lived process. It connects to the
//! long-running agent over a Unix socket installed next to the plugin binary,
//! runs the requested operation with stdout/stderr captured, forwards the
//! captured text to the agent's log, and prints exactly one JSON result.
//!
//! # Modules
//!
//! - `channel` - agent socket discovery, wire protocol and client
//! - `capture` - stdout/stderr redirection into memory
//! - `forward` - shipping captured output to the agent
//! - `driver` - plugin commands and their result format
//! - `config` - environment-driven configuration
//! - `logging` - tracing subscriber setup (stderr only)
//!
//! # Quick Start
//!
//! ```ignore
//! use flexplug::{driver, PluginConfig};
//!
//! let config = PluginConfig::from_env()?;
//! let status = driver::run(&config, &args).await?;
//! println!("{}", status.to_json());
//! ```

pub mod capture;
pub mod channel;
pub mod config;
pub mod driver;
pub mod forward;
pub mod logging;

// Re-export commonly used types at crate root for convenience
pub use capture::{run_captured, run_captured_async, Captured, CaptureError};
pub use channel::{ControlClient, LogRecord};
pub use config::PluginConfig;
pub use driver::{DriverStatus, PluginError};
pub use forward::LogForwarder;
