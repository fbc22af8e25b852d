//! Control channel between the plugin CLI and the mount agent
//!
//! This module provides:
//! - Locating the agent socket next to the plugin executable
//! - A request/response client over a Unix domain socket
//! - Newline-delimited JSON message framing
//!
//! # Architecture
//!
//! ```text
//! flexplug (one process per call)            mount agent (long-running)
//!   locator::socket_path() ──► <exe dir>/.flexplug.sock ◄── bind
//!   ControlClient::connect()  ─────────────────────────────► accept
//!   call("Controller.Mount")  ── {"id","method","params"}\n ──►
//!                             ◄── {"id","result","error"}\n ──
//!   notify("Controller.Log")  ── same framing, errors swallowed
//! ```

pub mod client;
pub mod locator;
pub mod protocol;

pub use client::{CallError, ConnectionError, ControlClient};
pub use locator::{socket_path, socket_path_for, LocatorError};
pub use protocol::{LogRecord, Request, Response, LOG_METHOD};
