//! Volume driver commands
//!
//! Turns one plugin command into the matching agent call and wraps it in a
//! capture scope so the only thing left for stdout is the [`DriverStatus`].
//!
//! # Flow
//!
//! ```text
//! args → Command::parse
//!          │ init / unsupported ─────────────────────────► DriverStatus
//!          ▼
//!   locator::socket_path → ControlClient::connect
//!          ▼
//!   run_captured_async(execute)   stdout/stderr → pipe
//!          ▼
//!   LogForwarder::forward(output)  ──► Controller.Log
//!          ▼
//!   Result<DriverStatus>  (caller prints it to the real stdout)
//! ```

pub mod command;
pub mod status;

pub use command::{AgentCommand, Command, UsageError, VolumeOptions};
pub use status::{Capabilities, DriverStatus, Status};

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::capture::{self, CaptureError, Captured};
use crate::channel::{self, CallError, ConnectionError, ControlClient, LocatorError};
use crate::config::{ConfigError, PluginConfig};
use crate::forward::LogForwarder;

/// Remote method names served by the agent
pub const MOUNT_METHOD: &str = "Controller.Mount";
pub const UNMOUNT_METHOD: &str = "Controller.Unmount";
pub const ATTACH_METHOD: &str = "Controller.Attach";
pub const DETACH_METHOD: &str = "Controller.Detach";

/// Any failure of a plugin invocation
#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("{command} panicked: {message}")]
    Panicked { command: &'static str, message: String },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MountParams<'a> {
    target_dir: &'a str,
    options: &'a VolumeOptions,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UnmountParams<'a> {
    target_dir: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AttachParams<'a> {
    options: &'a VolumeOptions,
    node: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DetachParams<'a> {
    volume: &'a str,
    node: &'a str,
}

#[derive(Deserialize, Debug)]
struct AttachReply {
    #[serde(default)]
    device: Option<String>,
}

/// Perform `command` through the agent
pub async fn execute(client: &mut ControlClient, command: &AgentCommand) -> Result<DriverStatus, CallError> {
    let status = match command {
        AgentCommand::Mount {
            target_dir,
            options,
        } => {
            info!(target_dir = %target_dir, "Mounting volume");
            let _: Value = client
                .call(MOUNT_METHOD, &MountParams { target_dir, options })
                .await?;
            DriverStatus::success()
        }
        AgentCommand::Unmount { target_dir } => {
            info!(target_dir = %target_dir, "Unmounting volume");
            let _: Value = client
                .call(UNMOUNT_METHOD, &UnmountParams { target_dir })
                .await?;
            DriverStatus::success()
        }
        AgentCommand::Attach { options, node } => {
            info!(node = %node, "Attaching volume");
            let reply: Option<AttachReply> = client
                .call(ATTACH_METHOD, &AttachParams { options, node })
                .await?;
            match reply.and_then(|r| r.device) {
                Some(device) => DriverStatus::success().with_device(device),
                None => DriverStatus::success(),
            }
        }
        AgentCommand::Detach { volume, node } => {
            info!(volume = %volume, node = %node, "Detaching volume");
            let _: Value = client
                .call(DETACH_METHOD, &DetachParams { volume, node })
                .await?;
            DriverStatus::success()
        }
    };

    Ok(status)
}

/// Run `command` against the agent listening at `socket`
///
/// The operation runs captured; its output is forwarded to the agent before
/// this returns, on success and on failure alike.
pub async fn run_with_socket(socket: &Path, command: &AgentCommand) -> Result<DriverStatus, PluginError> {
    let mut client = ControlClient::connect(socket).await?;

    let span = info_span!(
        "driver_call",
        command = command.name(),
        socket = %client.path().display()
    );
    let captured = capture::run_captured_async(execute(&mut client, command).instrument(span)).await?;

    LogForwarder::new(&mut client)
        .forward(&captured.output, captured.failed())
        .await;

    settle(command, captured)
}

/// Turn a finished capture into the invocation result
///
/// A panic becomes an ordinary failure so the caller still prints a result.
fn settle(
    command: &AgentCommand,
    captured: Captured<Result<DriverStatus, CallError>>,
) -> Result<DriverStatus, PluginError> {
    match captured.into_outcome() {
        Ok(result) => Ok(result?),
        Err(payload) => Err(PluginError::Panicked {
            command: command.name(),
            message: capture::panic_message(payload.as_ref()),
        }),
    }
}

/// Run one plugin invocation from its raw arguments
pub async fn run(config: &PluginConfig, args: &[String]) -> Result<DriverStatus, PluginError> {
    match Command::parse(args)? {
        Command::Init => Ok(DriverStatus::initialized()),
        Command::Unsupported(name) => Ok(DriverStatus::not_supported(&name)),
        Command::Agent(call) => {
            let socket = channel::socket_path(&config.socket_name)?;
            run_with_socket(&socket, &call).await
        }
    }
}
