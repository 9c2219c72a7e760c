//! LanChat - main entry point

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lanchat_cli::{
    app::ChatApp,
    cli::Cli,
    error::{CliError, Result},
    tui::{Theme, TuiManager, FAREWELL},
};
use lanchat_core::ChatConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ChatConfig::example_config()?);
        return Ok(());
    }

    // The chat screen owns the terminal, so logs go to a file or nowhere
    setup_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut app = match ChatApp::start(config).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let event_receiver = app
        .take_event_receiver()
        .ok_or_else(|| CliError::UI("Event receiver already taken".to_string()))?;

    let outcome = match TuiManager::new(&app.config().ui, event_receiver, Theme::default()) {
        Ok(mut tui) => tui.run(&app).await,
        Err(e) => Err(e),
    };
    app.shutdown().await;

    if let Err(e) = outcome {
        error!("Interface failed: {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }

    println!("{}", FAREWELL);
    info!("LanChat exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::new(if verbose { "debug" } else { "info" });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false);

    let result = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                CliError::Logging(format!("Cannot open {}: {}", path.display(), e))
            })?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::sink).try_init(),
    };
    result.map_err(|e| CliError::Logging(e.to_string()))
}

/// Load configuration from file or use defaults, then apply overrides
fn load_configuration(cli: &Cli) -> Result<ChatConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path.display());
        ChatConfig::load_from_file(config_path)?
    } else {
        info!("Using default configuration");
        ChatConfig::default()
    };

    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}
