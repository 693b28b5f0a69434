//! Room host entry point.
//!
//! Loads the configuration, sets up logging, then runs the in-process mesh
//! demo: several rooms running the built-in plugins (plus any external plugin
//! libraries) that replicate a shared board and must converge.

mod cli;
mod config;
mod logging;
mod mesh;

use anyhow::{anyhow, bail, Context, Result};
use cli::CliArgs;
use config::AppConfig;
use tracing::info;

/// Applies command line overrides on top of the file configuration.
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(plugin_dir) = &args.plugin_dir {
        config.plugins.directory = plugin_dir.to_string_lossy().to_string();
        config.plugins.auto_load = true;
    }
    if let Some(peers) = args.peers {
        config.room.peer_count = peers;
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Configuration comes first so logging can honour it.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

    logging::setup_logging(&config.logging, args.debug)?;
    display_banner();
    info!(
        "📂 Config: {} | Rooms: {} | External plugins: {}",
        args.config_path.display(),
        config.room.peer_count,
        if config.plugins.auto_load {
            config.plugins.directory.as_str()
        } else {
            "disabled"
        }
    );

    let report = mesh::run_demo(&config).await?;
    if !report.converged {
        bail!("rooms did not converge");
    }
    info!("👋 Room host finished");
    Ok(())
}

fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║               🏠 ROOM HOST               ║");
    info!("║                  v{:<8}               ║", version);
    info!("║                                          ║");
    info!("║  Plugin-driven shared rooms              ║");
    info!("║  with peer-to-peer replication           ║");
    info!("╚══════════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_overrides_config() {
        let mut config = AppConfig::default();
        let args = CliArgs::try_parse_from([
            "room_host",
            "--plugins",
            "target/release",
            "--peers",
            "6",
            "--log-level",
            "trace",
            "--json-logs",
        ])
        .unwrap();

        apply_overrides(&mut config, &args);
        assert_eq!(config.plugins.directory, "target/release");
        assert!(config.plugins.auto_load);
        assert_eq!(config.room.peer_count, 6);
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json_format);
        assert_eq!(args.config_path, PathBuf::from("room.toml"));
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let mut config = AppConfig::default();
        let args = CliArgs::try_parse_from(["room_host"]).unwrap();
        apply_overrides(&mut config, &args);
        assert_eq!(config, AppConfig::default());
    }
}
