mod commands;
mod logging;
mod reporter;

use std::io;
use std::process;
use std::sync::Arc;
use std::thread;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, OverrideArgs};
use dotenv::dotenv;
use reporter::CliReporter;
use snappy_composer_core::compress::SnappyCompressor;
use snappy_composer_core::{SessionSummary, StopHandle, WatchConfig, WatchSession};
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match snappy_composer_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Watch(args)) => {
            let config = effective_config(config, &args.overrides);
            let session = start_session(config)?;
            if args.stop_on_enter {
                spawn_enter_listener(session.stop_handle());
            }
            print_summary(&session.run());
        }
        Some(Commands::Once(overrides)) => {
            let config = effective_config(config, &overrides);
            let mut session = start_session(config)?;
            session.run_once();
            print_summary(&session.shutdown());
        }
        Some(Commands::PrintConfig(overrides)) => {
            let config = effective_config(config, &overrides);
            println!("{}", toml::to_string_pretty(&config)?);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn effective_config(mut config: WatchConfig, overrides: &OverrideArgs) -> WatchConfig {
    overrides.apply(&mut config);
    config
}

fn start_session(config: WatchConfig) -> Result<WatchSession, Box<dyn std::error::Error>> {
    WatchSession::with_parts(config, Arc::new(SnappyCompressor), Arc::new(CliReporter)).map_err(
        |err| {
            error!("Fatal error: {}", err);
            err.into()
        },
    )
}

fn spawn_enter_listener(stop: StopHandle) {
    let spawned = thread::Builder::new()
        .name("stop-on-enter".to_string())
        .spawn(move || {
            info!("Press Enter to stop the monitor...");
            let mut line = String::new();
            if let Err(err) = io::stdin().read_line(&mut line) {
                error!("Error reading stdin: {}", err);
            }
            info!("Stopping monitor...");
            stop.stop();
        });
    if let Err(err) = spawned {
        error!("Could not start stop-on-enter listener: {}", err);
    }
}

fn print_summary(summary: &SessionSummary) {
    println!();
    info!(
        "{} sets archived, {} failed, {} already present",
        format!("{}", summary.tasks.succeeded).green(),
        format!("{}", summary.tasks.failed).red(),
        format!("{}", summary.sets_skipped).cyan(),
    );
    info!(
        "{} source files removed, {} removals failed",
        format!("{}", summary.deletions.removed).green(),
        format!("{}", summary.deletions.failed).red(),
    );
}
