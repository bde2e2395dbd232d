use std::net::SocketAddr;

use clap::{ArgAction, Parser, ValueEnum};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(name = "skland-attendance", version, about, long_about = None)]
pub struct Cli {
    /// How the run is triggered.
    #[arg(long, value_enum, default_value_t = Mode::Once)]
    pub mode: Mode,

    /// Listen address for `--mode http`.
    #[arg(long, default_value = DEFAULT_ADDR, value_name = "HOST:PORT")]
    pub addr: SocketAddr,

    /// Also write JSON logs to the persistent log file.
    #[arg(long, action = ArgAction::SetTrue)]
    pub log_file: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Run once and exit with the run status.
    #[default]
    Once,
    /// Serve `/attendance`, one run per request.
    Http,
    /// Run once and print the invocation response as JSON.
    Function,
}
