mod logging;
mod probe;
mod protocol;
mod session;

use clap::Parser;
use std::path::PathBuf;

use logging::{LogConfig, init_logging};
use probe::{ProbeConfig, ScenarioRunner, default_scenarios, scenarios_from_uris};

/// CLI arguments for the workspace recognition probe
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the gopls executable (overrides GOPLS_PATH env var)
    #[arg(long, value_name = "PATH")]
    server_path: Option<String>,

    /// Workspace root URI to probe; repeatable, defaults to the built-in
    /// host-path / container-path pair
    #[arg(long, value_name = "URI")]
    workspace_uri: Vec<String>,

    /// Bounded wait for the initialize reply, in milliseconds
    #[arg(long, value_name = "MS")]
    init_grace_ms: Option<u64>,

    /// Wait after didOpen before closing stdin, in milliseconds
    #[arg(long, value_name = "MS")]
    settle_grace_ms: Option<u64>,

    /// Bound on the final output drain, in seconds
    #[arg(long, value_name = "SECS")]
    drain_timeout_secs: Option<u64>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides PROBE_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Resolve the server path from CLI args and environment
fn resolve_server_path(server_path_arg: Option<String>) -> Option<String> {
    // Priority: CLI arg > GOPLS_PATH env var > "gopls" config default
    server_path_arg.or_else(|| std::env::var("GOPLS_PATH").ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level, args.log_file);
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let config = ProbeConfig::default().with_overrides(
        resolve_server_path(args.server_path),
        args.init_grace_ms,
        args.settle_grace_ms,
        args.drain_timeout_secs,
    );

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let scenarios = if args.workspace_uri.is_empty() {
        default_scenarios()
    } else {
        scenarios_from_uris(&args.workspace_uri)
    };

    ScenarioRunner::new(config, scenarios).run().await;

    Ok(())
}
