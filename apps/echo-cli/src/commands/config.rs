use anyhow::Result;
use clap::Args;
use echo_probe::{config_schema_json, Config};

#[derive(Args, Clone)]
pub struct ConfigArgs {
    /// Print the JSON schema of the config file instead
    #[arg(long)]
    pub schema: bool,
}

pub fn run(cfg: &Config, args: &ConfigArgs) -> Result<i32> {
    let value = if args.schema {
        config_schema_json()
    } else {
        serde_json::to_value(cfg)?
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(0)
}
