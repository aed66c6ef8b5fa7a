//! Command handlers.

pub mod config_cmd;
pub mod devices;
pub mod run;

use std::sync::Arc;

use mystrom_config::Config;
use mystrom_core::{MemoryStore, SyncController};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config file named by `--config`, or the canonical one.
pub(crate) fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match &global.config {
        Some(path) => mystrom_config::load_config_from(path)?,
        None => mystrom_config::load_config()?,
    };
    Ok(cfg)
}

/// Open the state snapshot and build a controller over it.
pub(crate) fn build_controller(
    cfg: &Config,
    store: &Arc<MemoryStore>,
) -> Result<SyncController, CliError> {
    let sync = mystrom_config::to_sync_config(cfg)?;
    tracing::debug!(cloud = %sync.cloud_url, "building sync controller");
    Ok(SyncController::from_config(sync, store.clone())?)
}
