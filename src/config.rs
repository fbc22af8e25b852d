//! Plugin configuration
//!
//! Everything has a working default; the environment can override the
//! socket file name and the logging setup. The socket *directory* is never
//! configurable: it always comes from the executable's own location.

use thiserror::Error;

/// Default rendezvous file name placed next to the plugin binary
pub const DEFAULT_SOCKET_NAME: &str = ".flexplug.sock";

/// Default tracing filter when neither `RUST_LOG` nor `FLEXPLUG_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "warn,flexplug=info";

const ENV_SOCKET_NAME: &str = "FLEXPLUG_SOCKET_NAME";
const ENV_LOG: &str = "FLEXPLUG_LOG";
const ENV_LOG_FORMAT: &str = "FLEXPLUG_LOG_FORMAT";

/// Error raised for an unusable configuration value
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("FLEXPLUG_SOCKET_NAME must be a bare file name, got {0:?}")]
    SocketNameNotBare(String),
    #[error("FLEXPLUG_LOG_FORMAT must be \"text\" or \"json\", got {0:?}")]
    UnknownLogFormat(String),
}

/// Configuration for one plugin invocation
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// File name of the agent socket, joined to the executable's directory
    pub socket_name: String,
    /// Default `EnvFilter` directive (`RUST_LOG` still wins)
    pub log_filter: String,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            socket_name: DEFAULT_SOCKET_NAME.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}

impl PluginConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Split out from [`PluginConfig::from_env`] so tests don't have to mutate
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_SOCKET_NAME).filter(|v| !v.is_empty()) {
            if name.contains('/') || name == "." || name == ".." {
                return Err(ConfigError::SocketNameNotBare(name));
            }
            config.socket_name = name;
        }

        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            config.log_filter = filter;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.json_logs = match format.as_str() {
                "" | "text" => false,
                "json" => true,
                _ => return Err(ConfigError::UnknownLogFormat(format)),
            };
        }

        Ok(config)
    }
}
