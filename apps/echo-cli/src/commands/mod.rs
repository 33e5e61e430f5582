pub mod config;
pub mod contract;
pub mod router;
pub mod status;
pub mod workflow;

use anyhow::{Context, Result};
use echo_probe::{Config, ConnectionTable, ProbeClient};

/// The one HTTP client for this run; released when the command returns.
pub fn acquire_client(cfg: &Config) -> Result<ProbeClient> {
    let timeout = cfg.router_timeout().max(cfg.backend_timeout());
    ProbeClient::new(timeout).context("building http client")
}

pub async fn connection_table(cfg: &Config) -> ConnectionTable {
    ConnectionTable::capture_with(&cfg.ports.command).await
}

pub fn exit_code(ok: bool) -> i32 {
    if ok {
        0
    } else {
        1
    }
}
