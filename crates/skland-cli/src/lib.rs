pub mod cli_args;
pub mod function;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use skland_core::{
    AttendanceConfig, LoggingDestination, execute, init_logging, open_store,
};
use tracing::{error, info, warn};

use cli_args::{Cli, Mode};
use server::AppState;

/// Run the selected mode. Returns whether the run (or server) finished successfully.
pub async fn run(cli: Cli) -> Result<bool> {
    let destination = if cli.log_file {
        LoggingDestination::FileAndStderr
    } else {
        LoggingDestination::StderrOnly
    };
    if let Some(path) = init_logging(destination).context("failed to initialise logging")? {
        info!(path = %path.display(), "Writing logs to file");
    }

    let load = AttendanceConfig::from_env().context("failed to load configuration")?;
    for warning in &load.warnings {
        warn!("{warning}");
    }
    let config = load.config;
    let store = open_store(&config)?;

    match cli.mode {
        Mode::Once => {
            let result = execute(&config, store.as_ref(), None).await?;
            Ok(result.status.is_success())
        }
        Mode::Function => match function::invoke(&config, store.as_ref()).await {
            Ok(response) => {
                println!("{}", serde_json::to_string(&response)?);
                Ok(true)
            }
            Err(err) => {
                error!(error = %err, "Invocation failed");
                println!("{}", serde_json::to_string(&err.response())?);
                Ok(false)
            }
        },
        Mode::Http => {
            let state = Arc::new(AppState { config, store });
            server::serve(cli.addr, state).await?;
            Ok(true)
        }
    }
}
