//! Log forwarding to the agent
//!
//! Captured operation output is shipped to the agent as one [`LogRecord`] so
//! it ends up in the agent's centralized log instead of on the plugin's
//! stdout.

use tracing::debug;

use crate::channel::{ControlClient, LogRecord, LOG_METHOD};

/// Sends captured output over the control channel
pub struct LogForwarder<'a> {
    client: &'a mut ControlClient,
}

impl<'a> LogForwarder<'a> {
    pub fn new(client: &'a mut ControlClient) -> Self {
        Self { client }
    }

    /// Forward `output` as a single log record
    ///
    /// Empty output is still forwarded. Never fails; see
    /// [`ControlClient::notify`].
    pub async fn forward(&mut self, output: &[u8], is_error: bool) {
        debug!(bytes = output.len(), is_error, "Forwarding captured output");
        let record = LogRecord::new(output, is_error);
        self.client.notify(LOG_METHOD, &record).await;
    }
}
