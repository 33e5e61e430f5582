use anyhow::Result;
use echo_probe::workflow::{self, Workflow};
use echo_probe::{status, Config};

use super::{acquire_client, connection_table, exit_code};

pub async fn run(cfg: &Config) -> Result<i32> {
    status::banner("Intent workflow", 60);
    let client = acquire_client(cfg)?;
    let connections = connection_table(cfg).await;

    let mut flow = Workflow::new(cfg, &client);
    status::info(&format!(
        "session {} as user {}",
        flow.caller().session_id,
        flow.caller().user_id
    ));
    let report = flow.run(&connections).await;
    workflow::print_summary(&report);
    Ok(exit_code(report.success()))
}
