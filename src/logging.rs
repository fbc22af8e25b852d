//! Process-local logging setup
//!
//! All log output goes to stderr. Inside a capture scope that means it is
//! captured and forwarded to the agent along with everything else; outside a
//! scope it stays off stdout, which is reserved for the driver result.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::PluginConfig;

/// Initialize the tracing subscriber for this invocation
///
/// `RUST_LOG` takes precedence over the configured default filter. Safe to
/// call more than once; only the first call installs a subscriber.
pub fn init_logging(config: &PluginConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    // Err only when a global subscriber is already set
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
}
