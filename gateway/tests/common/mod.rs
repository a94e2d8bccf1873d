#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::print_stdout,
    clippy::allow_attributes
)]
use std::net::SocketAddr;
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};

pub fn gateway_path() -> String {
    // Compatibility with 'cargo nextest archive': https://nexte.st/docs/ci-features/archiving/#making-tests-relocatable
    std::env::var("NEXTEST_BIN_EXE_gateway")
        .unwrap_or_else(|_| env!("CARGO_BIN_EXE_gateway").to_string())
}

pub struct ChildData {
    pub addr: SocketAddr,
    pub output: Vec<String>,
    // This kills the child on drop
    _child: Child,
    _config_file: NamedTempFile,
}

/// Starts the gateway binary on an ephemeral loopback port, without Postgres.
pub async fn start_gateway_on_random_port(config_suffix: &str) -> ChildData {
    let config_file = NamedTempFile::new().unwrap();
    std::fs::write(config_file.path(), config_suffix).unwrap();

    let mut child = Command::new(gateway_path())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .args([
            "--config-file",
            config_file.path().to_str().unwrap(),
            "--log-format",
            "json",
            "--bind-address",
            "127.0.0.1:0",
        ])
        // Make sure we don't inherit settings from the outer `cargo test` invocation
        .env_remove("RUST_LOG")
        .env_remove("GATEWAY_POSTGRES_URL")
        .env_remove("GATEWAY_CONFIG_FILE")
        .env_remove("GATEWAY_BIND_ADDRESS")
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let mut stdout = tokio::io::BufReader::new(child.stdout.take().unwrap()).lines();

    let mut listening_line = None;
    let mut output = Vec::new();
    while let Some(line) = stdout.next_line().await.unwrap() {
        println!("{line}");
        if line.contains("listening on 127.0.0.1:") {
            listening_line = Some(line.clone());
        }
        output.push(line.clone());
        if line.contains("└") {
            // We're done logging the startup message
            break;
        }
    }
    // Keep draining stdout so the child never blocks on a full pipe
    tokio::spawn(async move { while let Ok(Some(_)) = stdout.next_line().await {} });

    let port = listening_line
        .expect("Gateway exited before listening")
        .split_once("listening on 127.0.0.1:")
        .expect("Gateway didn't log listening line")
        .1
        .split('"')
        .next()
        .unwrap()
        .parse::<u16>()
        .unwrap();

    ChildData {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        output,
        _child: child,
        _config_file: config_file,
    }
}
