use anyhow::Result;
use echo_probe::router::check_router;
use echo_probe::{status, Config};

use super::{acquire_client, connection_table, exit_code};

pub async fn run(cfg: &Config) -> Result<i32> {
    status::banner("Router check", 50);
    let client = acquire_client(cfg)?;
    let connections = connection_table(cfg).await;
    let report = check_router(&client, cfg, &connections).await;

    println!();
    println!("{}", status::pass_fail_line("router api", report.api_ok));
    if let Some(ok) = report.proxy_ok {
        println!("{}", status::pass_fail_line("router proxy", ok));
    }
    if let Some(ok) = report.smoke_ok {
        println!("{}", status::pass_fail_line("call-tool smoke call", ok));
    }
    Ok(exit_code(report.success()))
}
