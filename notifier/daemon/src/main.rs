//! Notifier Daemon - Trello Reminder Bot
//!
//! Entry point for the bot process. Loads configuration, sets up logging,
//! and runs the dispatcher and scheduler until a shutdown signal arrives.
//!
//! # Usage
//!
//! ```bash
//! # Default config (~/.config/trello-notifier/notifier.toml)
//! notifier-daemon
//!
//! # Explicit config file
//! notifier-daemon /etc/trello-notifier/notifier.toml
//!
//! # Scan every 30 seconds instead of at daily times
//! notifier-daemon --interval-secs 30
//!
//! # Validate the config and exit
//! notifier-daemon --check-config
//!
//! # Verbose logging
//! RUST_LOG=debug notifier-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use notifier_core::{config, ConfigOverrides};
use server::BotServer;

/// Notifier Daemon - reminds you about due Trello cards over Telegram
#[derive(Parser, Debug)]
#[command(name = "notifier-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(env = "NOTIFIER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scan at a fixed interval instead of the configured daily times
    #[arg(short = 'i', long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NOTIFIER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Load and validate the configuration, print a summary, and exit
    #[arg(long)]
    check_config: bool,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "notifier_daemon={level},notifier_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// Load, override, and validate the configuration
fn resolve_config(args: &Args) -> Result<config::NotifierConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_config_file(path),
        None => config::load_config_from_path(config::default_config_path().as_deref()),
    }
    .context("Failed to load configuration")?;

    ConfigOverrides {
        interval_secs: args.interval_secs,
    }
    .apply(&mut config);

    config.validate().context("Configuration is invalid")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Notifier daemon starting");

    let config = resolve_config(&args)?;
    info!(source = %config.source(), "Configuration loaded");

    if args.check_config {
        println!("{}", config.summary());
        println!("configuration OK");
        return Ok(());
    }

    let server = BotServer::from_config(&config)?;
    match server.run().await {
        Ok(()) => {
            info!("Notifier daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_args_parse_positional_config() {
        let args = Args::parse_from(["notifier-daemon", "/tmp/n.toml", "--interval-secs", "5", "--check-config"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/n.toml")));
        assert_eq!(args.interval_secs, Some(5));
        assert!(args.check_config);
    }

    #[test]
    fn test_resolve_config_applies_cli_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
owner_chat_id = 1
[telegram]
bot_token = "t"
[trello]
api_key = "k"
api_token = "t"
[schedule]
times = ["09:00"]
"#
        )
        .unwrap();

        let args = Args::parse_from([
            "notifier-daemon",
            file.path().to_str().unwrap(),
            "--interval-secs",
            "7",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.interval_secs, Some(7));
        assert_eq!(config.source(), notifier_core::ConfigSource::Cli);
    }

    #[test]
    fn test_resolve_config_rejects_bad_time() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
owner_chat_id = 1
[telegram]
bot_token = "t"
[trello]
api_key = "k"
api_token = "t"
[schedule]
times = ["25:00"]
"#
        )
        .unwrap();

        let args = Args::parse_from(["notifier-daemon", file.path().to_str().unwrap()]);
        let err = resolve_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("25:00"));
    }

    #[test]
    fn test_resolve_config_rejects_missing_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        let args = Args::parse_from(["notifier-daemon", missing.to_str().unwrap()]);
        let err = resolve_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }
}
