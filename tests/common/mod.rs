//! Throwaway agent for integration tests
//!
//! Binds a Unix socket in a temp dir, answers each request line through a
//! handler, and hands every request it saw back to the test.

use std::path::PathBuf;

use flexplug::channel::{Request, Response};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;

pub struct FakeAgent {
    pub path: PathBuf,
    requests: mpsc::UnboundedReceiver<Request>,
    _dir: TempDir,
}

impl FakeAgent {
    /// Start an agent; the handler returning `None` makes it hang up
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Option<Response> + Send + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".flexplug.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let request: Request = serde_json::from_str(&line).unwrap();
                let reply = handler(&request);
                let _ = tx.send(request);

                let Some(response) = reply else {
                    return;
                };
                let mut out = serde_json::to_vec(&response).unwrap();
                out.push(b'\n');
                if writer.write_all(&out).await.is_err() {
                    return;
                }
            }
        });

        Self {
            path,
            requests: rx,
            _dir: dir,
        }
    }

    /// Agent that answers every request with a null result
    pub fn accepting() -> Self {
        Self::spawn(|req| Some(Response::ok(req.id.clone(), serde_json::Value::Null)))
    }

    /// Requests received so far, in arrival order
    pub fn received(&mut self) -> Vec<Request> {
        let mut seen = Vec::new();
        while let Ok(request) = self.requests.try_recv() {
            seen.push(request);
        }
        seen
    }
}
