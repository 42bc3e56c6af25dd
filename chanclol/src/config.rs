use std::path::Path;

use anyhow::{Context, Result};
use chanclol_common::{ChanclolConfig, ChanclolConfigStore};
use config::{Config, Environment, File};
use tracing::*;

pub fn load_config(path: &Path) -> Result<ChanclolConfig> {
    let store: ChanclolConfigStore = Config::builder()
        .add_source(File::from(path))
        .add_source(
            Environment::with_prefix("CHANCLOL")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Could not load config")?
        .try_deserialize()
        .context("Could not parse config")?;

    store.validate().context("Invalid config")?;

    let config = ChanclolConfig {
        store,
        paths_relative_to: path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    info!(
        "Using config: {path:?} (quota rules: {}, notifications: {})",
        config.store.riot_api.quota_rules.len(),
        if config.store.discord.token.is_some() {
            "discord"
        } else {
            "log only"
        },
    );
    Ok(config)
}
