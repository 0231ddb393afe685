//! Config command implementation.

use crate::core::config::{Config, ConfigOverrides};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Settings that override the loaded file.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Override refresh.timer_ttl_seconds.
    #[arg(long)]
    pub timer_ttl_seconds: Option<u64>,
    /// Override coordination.host.
    #[arg(long)]
    pub host: Option<String>,
}

impl OverrideArgs {
    /// Combine with the global log level into config overrides.
    pub fn to_overrides(&self, log_level: Option<&str>) -> ConfigOverrides {
        ConfigOverrides {
            log_level: log_level.map(str::to_string),
            timer_ttl_seconds: self.timer_ttl_seconds,
            host: self.host.clone(),
        }
    }
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/fleetcache.toml")]
        config: PathBuf,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Print configuration with defaults and overrides filled in.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/fleetcache.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Print a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl ConfigArgs {
    /// Config file the subcommand reads, if any.
    pub fn config_path(&self) -> Option<&Path> {
        match self.command {
            ConfigCommand::Validate { ref config, .. } | ConfigCommand::Show { ref config, .. } => {
                Some(config.as_path())
            }
            ConfigCommand::Generate { .. } => None,
        }
    }
}

/// Run the config command. `log_level` is the global `--log-level` flag.
pub fn run_config(args: ConfigArgs, log_level: Option<&str>) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config, overrides } => {
            validate_config(&config, &overrides.to_overrides(log_level))
        }
        ConfigCommand::Show {
            config,
            format,
            overrides,
        } => {
            println!(
                "{}",
                show_config(&config, &format, &overrides.to_overrides(log_level))?
            );
            Ok(())
        }
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config = Config::from_file_with_overrides(path, overrides)?;
    let holder = config
        .coordination
        .holder_identity()
        .context("holder identity")?;

    println!("✓ Configuration is valid");
    println!("  holder:    {}", holder);
    println!("  namespace: {}", config.shared_store.namespace);
    println!(
        "  refresh:   every {}s, poll every {}ms",
        config.refresh.timer_ttl_seconds, config.poller.interval_ms
    );
    println!("  log level: {}", config.telemetry.log_level);
    Ok(())
}

fn show_config(path: &Path, format: &str, overrides: &ConfigOverrides) -> Result<String> {
    let config = Config::from_file_with_overrides(path, overrides)?;
    match format {
        "json" => Ok(serde_json::to_string_pretty(&config)?),
        "toml" => Ok(toml::to_string_pretty(&config)?),
        other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
    }
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = config_template();
    match output {
        Some(path) => {
            std::fs::write(path, template)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Generated config template: {}", path.display());
        }
        None => println!("{}", template),
    }
    Ok(())
}

fn config_template() -> &'static str {
    r#"# fleetcache configuration

[shared_store]
namespace = "content_api"
prefix = "fleet_"
timeout_ms = 50
max_retries = 2
retry_backoff_ms = 10

[coordination]
endpoints = ["http://127.0.0.1:4001"]
port = 4001
lock_prefix = "/fleetcache/locks/"
request_timeout_ms = 1000

[refresh]
timer_ttl_seconds = 1037
lock_ttl_factor = 1.5
cache_ttl_factor = 10

[poller]
interval_ms = 603000
reload_queue = 100

[telemetry]
log_level = "info"
"#
}
