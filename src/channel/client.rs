//! Control channel client for talking to the mount agent
//!
//! One [`ControlClient`] is opened per plugin invocation and serves every call
//! made during it. Calls are strictly sequential: a request is written, then
//! the client waits for the matching response line before returning.
//!
//! Two call wrappers exist with different failure policies:
//! - [`ControlClient::call`] propagates every failure to the caller
//! - [`ControlClient::notify`] swallows failures (used for log forwarding)

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::protocol::{Request, Response};

/// The agent socket could not be connected
#[derive(Debug, Error)]
#[error("cannot connect to agent at {}: {source}", .path.display())]
pub struct ConnectionError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ConnectionError {
    /// Kind of the underlying I/O failure (e.g. `NotFound` when no agent is running)
    pub fn kind(&self) -> std::io::ErrorKind {
        self.source.kind()
    }
}

/// A remote call failed
#[derive(Debug, Error)]
pub enum CallError {
    #[error("failed to encode {method} request: {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{method}: channel I/O error: {source}")]
    Io {
        method: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{method}: agent closed the connection before responding")]
    Disconnected { method: String },
    #[error("{method}: malformed response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{method}: response id {got} does not match request id {expected}")]
    IdMismatch {
        method: String,
        expected: String,
        got: String,
    },
    #[error("{method} failed: {message}")]
    Remote { method: String, message: String },
}

/// Client side of the control channel
pub struct ControlClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    path: PathBuf,
}

impl ControlClient {
    /// Connect to the agent listening at `path`
    ///
    /// A missing or refusing socket means the agent is not running. This is
    /// reported straight back; retrying is left to whoever invoked the plugin.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|source| ConnectionError {
                path: path.clone(),
                source,
            })?;

        debug!(socket = %path.display(), "Connected to agent");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            path,
        })
    }

    /// Socket path this client is connected to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Invoke `method` and wait for its result
    pub async fn call<P, R>(&mut self, method: &str, params: &P) -> Result<R, CallError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.round_trip(method, params).await?;

        if let Some(message) = response.error {
            return Err(CallError::Remote {
                method: method.to_string(),
                message,
            });
        }

        serde_json::from_value(response.result).map_err(|source| CallError::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// Invoke `method`, ignoring whatever happens
    ///
    /// Completes after the single round trip (or the first failure). Failures
    /// are noted through `tracing` and otherwise dropped, so a lost diagnostic
    /// can never turn a successful operation into a failed one.
    pub async fn notify<P>(&mut self, method: &str, params: &P)
    where
        P: Serialize + ?Sized,
    {
        let outcome = match self.round_trip(method, params).await {
            Ok(Response {
                error: Some(message),
                ..
            }) => Err(CallError::Remote {
                method: method.to_string(),
                message,
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!(method, error = %e, "Dropping failed agent notification");
        }
    }

    async fn round_trip<P>(&mut self, method: &str, params: &P) -> Result<Response, CallError>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params).map_err(|source| CallError::Encode {
            method: method.to_string(),
            source,
        })?;
        let request = Request::new(method, params);

        let mut line = serde_json::to_vec(&request).map_err(|source| CallError::Encode {
            method: method.to_string(),
            source,
        })?;
        line.push(b'\n');

        let io_err = |source| CallError::Io {
            method: method.to_string(),
            source,
        };

        self.writer.write_all(&line).await.map_err(io_err)?;
        self.writer.flush().await.map_err(io_err)?;

        let mut reply = String::new();
        let read = self.reader.read_line(&mut reply).await.map_err(io_err)?;
        if read == 0 {
            return Err(CallError::Disconnected {
                method: method.to_string(),
            });
        }

        let response: Response =
            serde_json::from_str(reply.trim_end()).map_err(|source| CallError::Decode {
                method: method.to_string(),
                source,
            })?;

        if response.id != request.id {
            return Err(CallError::IdMismatch {
                method: method.to_string(),
                expected: request.id,
                got: response.id,
            });
        }

        debug!(method, id = %request.id, "Agent call complete");
        Ok(response)
    }
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("path", &self.path)
            .finish()
    }
}
