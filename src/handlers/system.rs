use crate::cli::system::{ConfigCommands, SystemCommands};
use crate::core::config::{save_config, validate_config};
use crate::core::error::HybridResult;
use crate::handlers::AppContext;

pub async fn handle_system_commands(subcommand: SystemCommands, ctx: &AppContext, format: &str) -> HybridResult<()> {
    match subcommand {
        SystemCommands::Init => {
            ctx.facade.initialize().await?;
            println!("Initialized data directory at {}", ctx.config.data_dir.display());
            Ok(())
        }
        SystemCommands::Status => {
            let reachable = ctx.facade.validate().await?;
            let connectivity = ctx.connectivity.status().await;
            let providers = ctx.facade.provider_info();
            if format == "json" {
                let payload = serde_json::json!({
                    "reachable": reachable,
                    "online": connectivity.is_online,
                    "providers": providers,
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap());
            } else {
                println!("reachable: {reachable}");
                println!("online: {}", connectivity.is_online);
                for provider in providers {
                    println!("provider: {} v{} [{}]", provider.name, provider.version, provider.capabilities.join(", "));
                }
            }
            Ok(())
        }
        SystemCommands::Config { subcommand } => handle_config_commands(subcommand, ctx, format).await,
    }
}

async fn handle_config_commands(subcommand: ConfigCommands, ctx: &AppContext, format: &str) -> HybridResult<()> {
    match subcommand {
        ConfigCommands::Show => {
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&ctx.config).unwrap());
            } else {
                println!("{}", toml::to_string_pretty(&ctx.config).unwrap());
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let mut config = ctx.config.clone();
            apply_config_set(&mut config, &key, &value)?;
            validate_config(&config)?;
            save_config(&ctx.config_path, &config)?;
            println!("Set {key} = {value}");
            Ok(())
        }
        ConfigCommands::Validate => {
            validate_config(&ctx.config)?;
            println!("Configuration is valid.");
            Ok(())
        }
        ConfigCommands::Reset => {
            let config = crate::core::config::AppConfig::default();
            save_config(&ctx.config_path, &config)?;
            println!("Configuration reset to defaults at {}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn apply_config_set(config: &mut crate::core::config::AppConfig, key: &str, value: &str) -> HybridResult<()> {
    use crate::core::error::{ConfigError, HybridError};
    use std::str::FromStr;

    match key {
        "logLevel" | "log_level" => config.log_level = value.to_string(),
        "outputFormat" | "output_format" => config.output_format = value.to_string(),
        "hybrid.autoSync" | "hybrid.auto_sync" => {
            config.hybrid.auto_sync = value.parse().map_err(|_| invalid(key, value))?;
        }
        "hybrid.syncOnWrite" | "hybrid.sync_on_write" => {
            config.hybrid.sync_on_write = value.parse().map_err(|_| invalid(key, value))?;
        }
        "hybrid.conflictResolution" | "hybrid.conflict_resolution" => {
            config.hybrid.conflict_resolution =
                crate::core::conflict::ConflictResolution::from_str(value).map_err(|_| invalid(key, value))?;
        }
        "hybrid.syncInterval" | "hybrid.sync_interval" => {
            config.hybrid.sync_interval = value.parse().map_err(|_| invalid(key, value))?;
        }
        "remote.boardId" | "remote.board_id" => config.remote.board_id = Some(value.to_string()),
        other => {
            return Err(HybridError::Config(ConfigError::InvalidFormat {
                message: format!("Unknown configuration key: {other}"),
            }));
        }
    }
    Ok(())
}

fn invalid(key: &str, value: &str) -> crate::core::error::HybridError {
    crate::core::error::HybridError::Config(crate::core::error::ConfigError::Validation {
        message: format!("Invalid value for {key}: {value}"),
    })
}
