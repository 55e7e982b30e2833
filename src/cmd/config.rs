//! Configuration view and validation commands: `screenwise config`.

use anyhow::{Result, bail};
use console::style;

use screenwise::config::ScreenwiseConfig;

use super::super::{Cli, ConfigCommands};
use super::load_settings;

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = &cli.config;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Screenwise Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found, using defaults.", config_path.display());
            }
            println!();

            let settings = load_settings(cli)?;
            println!("[screening]");
            println!("  pacing_ms = {}", settings.screening.pacing_ms);
            println!("  stage = \"{}\"", settings.screening.stage);
            println!("  db_path = \"{}\"", settings.db_path().display());
            println!();
            println!("[retry]");
            println!("  max_attempts = {}", settings.retry.max_attempts);
            println!("  base_delay_ms = {}", settings.retry.base_delay_ms);
            println!("  request_timeout_secs = {}", settings.retry.request_timeout_secs);
            println!();

            println!("Providers:");
            for provider in &settings.providers {
                let key = if provider.has_credentials() {
                    style("set").green()
                } else {
                    style("missing").red()
                };
                println!(
                    "  {:<12} {:<10} {} ({} {})",
                    provider.name, provider.kind, provider.base_url, provider.api_key_env, key
                );
            }
            println!();

            println!("Tiers (tried in order):");
            for (index, tier) in settings.tiers.iter().enumerate() {
                println!("  {}. {}", index + 1, style(&tier.name).bold());
                println!(
                    "     conservative:  {} via {}",
                    tier.conservative.model, tier.conservative.provider
                );
                println!(
                    "     comprehensive: {} via {}",
                    tier.comprehensive.model, tier.comprehensive.provider
                );
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let settings = load_settings(cli)?;
            if let Err(e) = settings.validate() {
                bail!("Configuration is invalid: {}", e);
            }

            let warnings = settings.warnings();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration is valid, with warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists.", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            ScreenwiseConfig::default().save(config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [screening] pacing_ms, stage, db_path");
            println!("  - [retry] max_attempts, base_delay_ms, request_timeout_secs");
            println!("  - [[providers]] and the ordered [[tiers]] fallback list");
            println!();
        }
    }

    Ok(())
}
