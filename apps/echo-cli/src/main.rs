use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use echo_probe::{status, Config};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(
    name = "echo-cli",
    version,
    about = "Health and contract checks for the router service and backend API"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe ports and endpoints and print an overall verdict (default)
    Status,
    /// Router-only check: servers, tools, proxy and optional smoke call
    Router,
    /// Walk intent → tool call → execution against the live services
    Workflow,
    /// Check the backend tool endpoints' status-code contract
    Contract,
    /// Print the effective configuration as JSON
    Config(commands::config::ConfigArgs),
}

fn main() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(async {
        tokio::select! {
            result = run(cli) => match result {
                Ok(code) => code,
                Err(e) => {
                    status::error(&format!("{e:#}"));
                    1
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                status::warning("Check interrupted by user");
                1
            }
        }
    });
    drop(runtime);
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let cfg = Config::load().context("loading probe configuration")?;
    debug!(
        router = cfg.router_base(),
        backend = cfg.backend_base(),
        "configuration loaded"
    );
    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => commands::status::run(&cfg).await,
        Commands::Router => commands::router::run(&cfg).await,
        Commands::Workflow => commands::workflow::run(&cfg).await,
        Commands::Contract => commands::contract::run(&cfg).await,
        Commands::Config(args) => commands::config::run(&cfg, &args),
    }
}
