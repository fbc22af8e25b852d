use std::io::Write;
use std::process::ExitCode;

use tracing::error;

use flexplug::config::PluginConfig;
use flexplug::driver::{self, DriverStatus};
use flexplug::logging::init_logging;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match PluginConfig::from_env() {
        Ok(config) => config,
        Err(e) => return report(&DriverStatus::failure(e.to_string())),
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return report(&DriverStatus::failure(format!("failed to start runtime: {}", e))),
    };

    let status = match runtime.block_on(driver::run(&config, &args)) {
        Ok(status) => status,
        Err(e) => {
            error!(error = %e, "Plugin call failed");
            DriverStatus::failure(e.to_string())
        }
    };

    report(&status)
}

/// Write the one and only stdout line of this invocation
fn report(status: &DriverStatus) -> ExitCode {
    let mut stdout = std::io::stdout().lock();
    let written = writeln!(stdout, "{}", status.to_json()).and_then(|_| stdout.flush());

    if written.is_err() || status.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
