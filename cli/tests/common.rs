//! Test utilities for CLI crate integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Write a supervisor config that runs a `sh` loop tagged with `marker` and
/// keeps its records under `dir`.
pub fn write_sleeper_config(dir: &Path, marker: &str, port: u16) -> PathBuf {
    let records = dir.join("records");
    let toml = format!(
        r#"defaultPort = {port}
command = "sh"
args = ["-c", "while :; do sleep 1; done", "{marker}", "--port", "{{port}}"]
marker = "{marker}"
startupWaitMs = 300
pollIntervalMs = 25
gracefulTimeoutMs = 1000
recordDir = "{records}"
"#,
        records = records.display()
    );
    let path = dir.join("supervisor.toml");
    std::fs::write(&path, toml).expect("write config");
    path
}

/// Port nothing is listening on right now
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}
