use anyhow::Result;
use echo_probe::aggregate::{self, OverallStatus, ServiceTable};
use echo_probe::{status, Config};

use super::{acquire_client, connection_table};

pub async fn run(cfg: &Config) -> Result<i32> {
    status::banner("Service status check", 50);
    let client = acquire_client(cfg)?;
    let connections = connection_table(cfg).await;
    let table = ServiceTable::from_config(cfg, &client);

    let report = aggregate::check_services(&client, &connections, &table).await;
    aggregate::print_summary(&report);

    let overall = report.overall();
    if overall != OverallStatus::FullyOperational {
        println!("\nTo start the missing services:");
        for hint in aggregate::remediation_hints(cfg) {
            println!("  {hint}");
        }
    }
    Ok(overall.exit_code())
}
