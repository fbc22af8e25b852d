//! Agent socket discovery
//!
//! The agent binds its socket in the directory the plugin binary is installed
//! in, so the address depends only on where the executable lives and never on
//! the caller's working directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error resolving the agent socket address
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("cannot resolve own executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("executable path {} has no parent directory", .0.display())]
    NoParent(PathBuf),
}

/// Socket address for the running executable
pub fn socket_path(socket_name: &str) -> Result<PathBuf, LocatorError> {
    let exe = std::env::current_exe().map_err(LocatorError::CurrentExe)?;
    socket_path_for(&exe, socket_name)
}

/// Socket address for an executable installed at `exe`
pub fn socket_path_for(exe: &Path, socket_name: &str) -> Result<PathBuf, LocatorError> {
    match exe.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.join(socket_name)),
        _ => Err(LocatorError::NoParent(exe.to_path_buf())),
    }
}
