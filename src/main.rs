//! ws-session - WebSocket session client
//!
//! Entry point for the `ws-session` binary: an interactive console, a
//! scripted probe, and a raw frame sender on top of the session library.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use ws_session::cli::{Cli, Commands, ConfigSubcommand, ConnectionArgs};
use ws_session::config::{self, ClientConfig};
use ws_session::error::{Error, Result};
use ws_session::probe::{self, ProbeOptions};
use ws_session::{console, logging, version};

fn main() {
    if let Err(e) = run() {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // Commands that don't need a session use minimal setup
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let connection = match &cli.command {
        Commands::Connect { connection, .. }
        | Commands::Probe { connection, .. }
        | Commands::Send { connection, .. } => connection.clone(),
        _ => ConnectionArgs::default(),
    };
    let config = load_config(&connection)?;

    // The guards must be kept alive for the lifetime of the program
    let level = logging::effective_level(&config.logging.level, cli.verbose, cli.quiet);
    let _log_guard = logging::init_logging(&config.logging, level)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        url = %config.session.url,
        "Starting ws-session"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

    let url = config.session.url.clone();
    let session_config = config.session_config();

    let result = match cli.command {
        Commands::Connect { reconnect, .. } => {
            let reconnect = reconnect || config.reconnect.enabled;
            runtime.block_on(console::run_console(&config, reconnect))
        }
        Commands::Probe {
            response_timeout_secs,
            idle_secs,
            ..
        } => {
            let options = ProbeOptions {
                response_timeout: Duration::from_secs(response_timeout_secs),
                idle: Duration::from_secs(idle_secs),
            };
            runtime.block_on(async {
                let report = probe::run_probe(&url, session_config, &options).await?;
                print!("{}", report);
                Ok::<(), Error>(())
            })
        }
        Commands::Send { wait_secs, texts, .. } => runtime.block_on(async {
            let report = probe::run_send(&url, session_config, &texts, Duration::from_secs(wait_secs)).await?;
            print!("{}", report);
            Ok::<(), Error>(())
        }),
        Commands::Version | Commands::Config { .. } => Ok(()),
    };

    // Blocking stdin reads would otherwise hold the runtime open
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

/// Load configuration, letting `--url` override the configured URL
fn load_config(connection: &ConnectionArgs) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(connection.config.as_deref())?;
    if let Some(url) = &connection.url {
        config.session.url = url.clone();
        config.validate()?;
    }
    Ok(config)
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = ClientConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let path = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", path.display());
        }
        ConfigSubcommand::Validate { config } => {
            ClientConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
