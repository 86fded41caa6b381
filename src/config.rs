//! Configuration for the openocd-tcl command-line client

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::{DEFAULT_HOST, DEFAULT_PORT};
use crate::error::{OcdError, Result};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "openocd-tcl")]
#[command(about = "Run commands on OpenOCD through its TCL interface")]
#[command(version)]
pub struct Args {
    /// OpenOCD host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// OpenOCD TCL port
    #[arg(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Receive timeout in seconds (defaults to 5)
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Wrap each command in `capture { }` to collect printed output
    #[arg(long)]
    pub capture: bool,

    /// Print the result of failing commands instead of stopping
    #[arg(long)]
    pub no_throw: bool,

    /// Send commands as-is, without the return-code envelope
    #[arg(long, conflicts_with_all = ["capture", "no_throw"])]
    pub raw: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// TCL commands, executed in order
    #[arg(required = true)]
    pub commands: Vec<String>,
}

/// Where and how to reach OpenOCD
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Default receive timeout; the built-in default when `None`
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let timeout = args.timeout.map(timeout_from_secs).transpose()?;
        Ok(Self {
            host: args.host.clone(),
            port: args.port,
            timeout,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: None,
        }
    }
}

/// Convert a timeout in seconds, rejecting zero, negative and non-finite values.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(OcdError::InvalidArgument(format!(
            "Timeout must be a positive number of seconds, got {}",
            secs
        ))),
    }
}
