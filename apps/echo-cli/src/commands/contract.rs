use anyhow::Result;
use echo_probe::contract;
use echo_probe::{status, Config};

use super::{acquire_client, exit_code};

pub async fn run(cfg: &Config) -> Result<i32> {
    status::banner("Backend tool endpoints", 50);
    let client = acquire_client(cfg)?;
    let report = contract::check_contract(&client, cfg).await;
    contract::print_summary(&report);
    Ok(exit_code(report.success()))
}
