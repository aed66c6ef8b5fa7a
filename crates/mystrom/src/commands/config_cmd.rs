//! Config subcommand handlers.

use mystrom_config::Config;
use mystrom_core::DetailFetchPolicy;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::load_config;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(mystrom_config::config_path);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load_config(global)?;
            let rendered = toml::to_string_pretty(&cfg.redacted()).map_err(|e| {
                CliError::Validation {
                    field: "config".into(),
                    reason: format!("failed to serialize config: {e}"),
                }
            })?;
            output::print_output(rendered.trim_end());
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = load_config(global)?;
            set_key(&mut cfg, &key, &value)?;
            mystrom_config::save_config_to(&cfg, &path)?;
            eprintln!("{key} saved to {}", path.display());
            Ok(())
        }
    }
}

fn set_key(cfg: &mut Config, key: &str, value: &str) -> Result<(), CliError> {
    let invalid = |reason: &str| CliError::Validation {
        field: key.into(),
        reason: reason.into(),
    };
    let secs = || value.parse::<u64>().map_err(|_| invalid("expected whole seconds"));

    match key {
        "cloud.url" => cfg.cloud.url = value.into(),
        "cloud.email" => cfg.cloud.email = Some(value.into()),
        "cloud.password" => cfg.cloud.password = Some(value.into()),
        "cloud.password_env" => cfg.cloud.password_env = Some(value.into()),
        "cloud.timeout" => cfg.cloud.timeout = secs()?,
        "polling.default_interval" => cfg.polling.default_interval = secs()?,
        "polling.enumeration_interval" => cfg.polling.enumeration_interval = secs()?,
        "polling.settle_delay" => cfg.polling.settle_delay = secs()?,
        "polling.detail_policy" => {
            cfg.polling.detail_policy = match value {
                "first-discovery" => DetailFetchPolicy::FirstDiscovery,
                "every-enumeration" => DetailFetchPolicy::EveryEnumeration,
                _ => return Err(invalid("expected 'first-discovery' or 'every-enumeration'")),
            };
        }
        "state_file" => cfg.state_file = Some(value.into()),
        _ => return Err(invalid("unknown config key")),
    }
    Ok(())
}
