//! Command-line interface for the StoveLink bridge.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stovelink_core::config::env_vars;
use stovelink_core::{BackupOutcome, BridgeConfig, Engine, EventBroadcaster, SimulatedStove};

/// StoveLink - HTTP, UDP and MQTT bridge for pellet stoves.
#[derive(Parser, Debug)]
#[command(name = "stovelink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to ./stovelink.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge.
    Serve {
        /// Address to bind the HTTP and UDP listeners to.
        #[arg(long)]
        host: Option<String>,
        /// HTTP port.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one command and print its answer.
    Exec {
        /// Command words, e.g. `GET STAT` or `SET POWR 3`.
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = BridgeConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.http.bind = host;
            }
            if let Some(port) = port {
                config.http.port = port;
            }
            tracing::info!(
                category = "cli",
                label = %config.host.label,
                protocol = ?config.home_automation.protocol,
                "Starting StoveLink with the simulated stove"
            );
            stovelink_api::run(config, SimulatedStove::new()).await
        }
        Command::Exec { command } => run_exec(config, &command.join(" ")),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "stovelink=debug" } else { "stovelink=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// One-shot execution against the simulated stove, without MQTT.
fn run_exec(config: BridgeConfig, cmd: &str) -> Result<()> {
    let mut engine = Engine::new(config, SimulatedStove::new(), EventBroadcaster::new(), None);

    match engine.handle_backup(cmd) {
        Some(BackupOutcome::File { body, .. }) => print!("{}", body),
        Some(BackupOutcome::Envelope(envelope)) => println!("{}", envelope.to_json()),
        None => println!("{}", engine.execute(cmd, false).to_json()),
    }
    Ok(())
}
