//! CLI argument definitions for the gateway.
//!
//! This file should remain minimal, containing only CLI argument struct definitions.

use clap::{Args, Parser};
use gateway_core::observability::LogFormat;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct GatewayArgs {
    /// Path to the gateway's TOML config file. Defaults apply when omitted.
    #[arg(long, env = "GATEWAY_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Sets the log format used for all gateway logs.
    #[arg(long)]
    #[arg(value_enum)]
    #[clap(default_value_t = LogFormat::default())]
    pub log_format: LogFormat,

    /// Overrides `[gateway].bind_address` from the config file.
    #[arg(long, env = "GATEWAY_BIND_ADDRESS")]
    pub bind_address: Option<SocketAddr>,

    /// These commands trigger some workflow then exit without launching the gateway.
    #[command(flatten)]
    pub early_exit_commands: EarlyExitCommands,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct EarlyExitCommands {
    /// Run PostgreSQL migrations manually then exit.
    #[arg(long)]
    pub run_postgres_migrations: bool,
}
