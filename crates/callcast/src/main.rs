use std::path::PathBuf;

use anyhow::{Context, Result};
use callcast::infra_common::{setup_logging, ConfigLayers, LoggingConfig};
use callcast::media_core::locate_converter;
use callcast::session_core::CallManager;
use callcast::web_console;
use callcast::AppConfig;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "callcast", version, about = "Voice-call streaming orchestrator")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CALLCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CALLCAST_LOG")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and locate the media converter
    Check,
    /// Run the call manager with the web console until interrupted
    Serve {
        /// Listen port, overrides the configured one
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Delete derived files left in the scratch directory
    Sweep,
}

fn layers(cli: &Cli) -> ConfigLayers {
    match &cli.config {
        Some(path) => ConfigLayers::new().with_required_file(path),
        None => ConfigLayers::new().with_file("callcast.toml"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_level_str(&cli.log_level, "callcast")?;
    if cli.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let config = AppConfig::load(&layers(&cli)).context("loading configuration")?;
    match cli.command {
        Command::Check => check(&config).await,
        Command::Serve { port } => serve(config, port).await,
        Command::Sweep => sweep(config).await,
    }
}

async fn check(config: &AppConfig) -> Result<()> {
    let converter = locate_converter(config.session.transformer.converter_path.as_deref())
        .await
        .context("no usable ffmpeg found")?;
    println!("converter:   {}", converter.display());
    println!("placeholder: {}", config.session.placeholder_path.display());
    if !config.session.placeholder_path.exists() {
        println!("warning:     placeholder file does not exist");
    }
    println!("scratch:     {}", config.session.transformer.scratch_dir.display());
    println!("console:     {}", config.console.addr()?);
    Ok(())
}

async fn serve(mut config: AppConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.console = config.console.with_port(port);
    }
    let manager = CallManager::builder(config.session.clone())
        .build()
        .await
        .context("starting call manager")?;
    info!(version = callcast::VERSION, "callcast started");

    web_console::serve(&config.console, manager.clone(), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    manager.shutdown().await;
    Ok(())
}

async fn sweep(config: AppConfig) -> Result<()> {
    let manager = CallManager::builder(config.session).build().await?;
    let removed = manager.sweep_scratch().await?;
    println!("removed {} derived file(s)", removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_port() {
        let cli = Cli::try_parse_from(["callcast", "--log-level", "debug", "serve", "--port", "9000"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Command::Serve { port: Some(9000) }));
    }

    #[test]
    fn test_config_file_is_optional_by_default() {
        let cli = Cli::try_parse_from(["callcast", "check"]).unwrap();
        let layers = layers(&cli);
        assert!(!layers.file_required);
    }
}
