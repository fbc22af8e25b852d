//! Positional command routing
//!
//! The orchestrator calls the plugin as `flexplug <command> [args...]` with
//! volume options passed as a single JSON object argument.

use serde_json::{Map, Value};
use thiserror::Error;

/// Volume options as handed over by the orchestrator
pub type VolumeOptions = Map<String, Value>;

/// Invalid command line
#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    #[error("no command given")]
    NoCommand,
    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("{command}: options are not a JSON object: {reason}")]
    BadOptions {
        command: &'static str,
        reason: String,
    },
}

/// One driver call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Answered locally with the driver capabilities
    Init,
    /// Delegated to the agent
    Agent(AgentCommand),
    /// Anything else; answered with "Not supported"
    Unsupported(String),
}

/// A driver call that has to go through the agent
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCommand {
    Mount {
        target_dir: String,
        options: VolumeOptions,
    },
    Unmount {
        target_dir: String,
    },
    Attach {
        options: VolumeOptions,
        node: String,
    },
    Detach {
        volume: String,
        node: String,
    },
}

impl Command {
    /// Parse the arguments following the program name
    pub fn parse(args: &[String]) -> Result<Self, UsageError> {
        let (name, rest) = args.split_first().ok_or(UsageError::NoCommand)?;

        match name.as_str() {
            "init" => Ok(Command::Init),
            "mount" => Ok(Command::Agent(AgentCommand::Mount {
                target_dir: arg(rest, 0, "mount", "target-dir")?,
                options: options(rest, 1, "mount")?,
            })),
            "unmount" => Ok(Command::Agent(AgentCommand::Unmount {
                target_dir: arg(rest, 0, "unmount", "target-dir")?,
            })),
            "attach" => Ok(Command::Agent(AgentCommand::Attach {
                options: options(rest, 0, "attach")?,
                // Older orchestrators omit the node name
                node: rest.get(1).cloned().unwrap_or_default(),
            })),
            "detach" => Ok(Command::Agent(AgentCommand::Detach {
                volume: arg(rest, 0, "detach", "volume")?,
                node: rest.get(1).cloned().unwrap_or_default(),
            })),
            other => Ok(Command::Unsupported(other.to_string())),
        }
    }

    /// Command name as given on the command line
    pub fn name(&self) -> &str {
        match self {
            Command::Init => "init",
            Command::Agent(call) => call.name(),
            Command::Unsupported(name) => name,
        }
    }
}

impl AgentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            AgentCommand::Mount { .. } => "mount",
            AgentCommand::Unmount { .. } => "unmount",
            AgentCommand::Attach { .. } => "attach",
            AgentCommand::Detach { .. } => "detach",
        }
    }
}

fn arg(
    rest: &[String],
    index: usize,
    command: &'static str,
    argument: &'static str,
) -> Result<String, UsageError> {
    rest.get(index)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(UsageError::MissingArgument { command, argument })
}

fn options(rest: &[String], index: usize, command: &'static str) -> Result<VolumeOptions, UsageError> {
    let raw = arg(rest, index, command, "json-options")?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(UsageError::BadOptions {
            command,
            reason: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(UsageError::BadOptions {
            command,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_init() {
        assert_eq!(Command::parse(&args(&["init"])).unwrap(), Command::Init);
    }

    #[test]
    fn test_parse_mount() {
        let cmd = Command::parse(&args(&[
            "mount",
            "/var/lib/kubelet/pods/x/volumes/vol",
            r#"{"pool":"replicapool","image":"x"}"#,
        ]))
        .unwrap();

        match cmd {
            Command::Agent(AgentCommand::Mount {
                target_dir,
                options,
            }) => {
                assert_eq!(target_dir, "/var/lib/kubelet/pods/x/volumes/vol");
                assert_eq!(options["pool"], "replicapool");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_detach_without_node() {
        let cmd = Command::parse(&args(&["detach", "pvc-1"])).unwrap();
        assert_eq!(
            cmd,
            Command::Agent(AgentCommand::Detach {
                volume: "pvc-1".to_string(),
                node: String::new(),
            })
        );
        assert_eq!(cmd.name(), "detach");
    }

    #[test]
    fn test_parse_missing_arguments() {
        assert_eq!(Command::parse(&[]).unwrap_err(), UsageError::NoCommand);
        assert_eq!(
            Command::parse(&args(&["unmount"])).unwrap_err(),
            UsageError::MissingArgument {
                command: "unmount",
                argument: "target-dir"
            }
        );
        assert!(matches!(
            Command::parse(&args(&["mount", "/mnt/x"])).unwrap_err(),
            UsageError::MissingArgument { .. }
        ));
    }

    #[test]
    fn test_parse_bad_options() {
        let err = Command::parse(&args(&["mount", "/mnt/x", "[1,2]"])).unwrap_err();
        assert!(matches!(err, UsageError::BadOptions { .. }));

        let err = Command::parse(&args(&["attach", "not json"])).unwrap_err();
        assert!(matches!(err, UsageError::BadOptions { .. }));
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let cmd = Command::parse(&args(&["getvolumename", "{}"])).unwrap();
        assert_eq!(cmd, Command::Unsupported("getvolumename".to_string()));
        assert_eq!(cmd.name(), "getvolumename");
    }
}
