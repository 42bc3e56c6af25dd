mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use defaults::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ChanclolError, Secret};

/// One rolling-window limit: at most `max_requests` per `window`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct QuotaRuleConfig {
    pub max_requests: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RiotApiConfig {
    #[serde(default)]
    pub api_key: Secret<String>,

    #[serde(default = "_default_regional_url")]
    pub regional_url: String,

    #[serde(default = "_default_platform_url")]
    pub platform_url: String,

    #[serde(default = "_default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default = "_default_quota_rules")]
    pub quota_rules: Vec<QuotaRuleConfig>,

    /// How long to hold back all traffic after the remote reports throttling.
    /// Defaults to the widest quota window.
    #[serde(default, with = "humantime_serde")]
    pub throttle_cooldown: Option<Duration>,

    /// Static game data (champion names)
    #[serde(default = "_default_data_dragon_url")]
    pub data_dragon_url: String,

    /// Look up champion, mastery and ranks of everyone in a newly seen game
    #[serde(default = "_default_game_roster")]
    pub game_roster: bool,
}

impl Default for RiotApiConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::default(),
            regional_url: _default_regional_url(),
            platform_url: _default_platform_url(),
            request_timeout: _default_request_timeout(),
            quota_rules: _default_quota_rules(),
            throttle_cooldown: None,
            data_dragon_url: _default_data_dragon_url(),
            game_roster: _default_game_roster(),
        }
    }
}

impl RiotApiConfig {
    pub fn throttle_cooldown(&self) -> Duration {
        self.throttle_cooldown.unwrap_or_else(|| {
            self.quota_rules
                .iter()
                .map(|r| r.window)
                .max()
                .unwrap_or_else(_default_throttle_cooldown)
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerConfig {
    /// Check cadence while a player is believed to be in game
    #[serde(default = "_default_online_timeout", with = "humantime_serde")]
    pub online_timeout: Duration,

    /// Check cadence while a player is believed to be offline
    #[serde(default = "_default_offline_timeout", with = "humantime_serde")]
    pub offline_timeout: Duration,

    /// Continuous absence required before an online player is demoted
    #[serde(default = "_default_offline_threshold", with = "humantime_serde")]
    pub offline_threshold: Duration,

    #[serde(default = "_default_main_cycle", with = "humantime_serde")]
    pub main_cycle: Duration,

    #[serde(default = "_default_housekeeping_interval", with = "humantime_serde")]
    pub housekeeping_interval: Duration,

    /// How often the registry picks up players registered by other processes
    #[serde(default = "_default_registry_sync_interval", with = "humantime_serde")]
    pub registry_sync_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            online_timeout: _default_online_timeout(),
            offline_timeout: _default_offline_timeout(),
            offline_threshold: _default_offline_threshold(),
            main_cycle: _default_main_cycle(),
            housekeeping_interval: _default_housekeeping_interval(),
            registry_sync_interval: _default_registry_sync_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: Option<Secret<String>>,

    #[serde(default = "_default_discord_api_url")]
    pub api_url: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: _default_discord_api_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChanclolConfigStore {
    #[serde(default = "_default_database_url")]
    pub database_url: Secret<String>,

    #[serde(default)]
    pub riot_api: RiotApiConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub discord: DiscordConfig,
}

impl Default for ChanclolConfigStore {
    fn default() -> Self {
        Self {
            database_url: _default_database_url(),
            riot_api: RiotApiConfig::default(),
            scheduler: SchedulerConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

impl ChanclolConfigStore {
    pub fn validate(&self) -> Result<(), ChanclolError> {
        for rule in &self.riot_api.quota_rules {
            if rule.max_requests == 0 || rule.window.is_zero() {
                return Err(ChanclolError::InvalidQuota {
                    max_requests: rule.max_requests,
                    window: rule.window,
                });
            }
        }
        if self.riot_api.throttle_cooldown.is_some_and(|c| c.is_zero()) {
            return Err(ChanclolError::InvalidConfig(
                "`riot_api.throttle_cooldown` must not be zero".into(),
            ));
        }
        if self.riot_api.quota_rules.is_empty() {
            warn!("No quota rules configured, requests will only be limited by remote throttling");
        }
        if self.riot_api.api_key.expose_secret().is_empty() {
            warn!("`riot_api.api_key` is empty, every request will be rejected by the remote");
        }
        if self.scheduler.online_timeout > self.scheduler.offline_timeout {
            warn!("`scheduler.online_timeout` is longer than `scheduler.offline_timeout`");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ChanclolConfig {
    pub store: ChanclolConfigStore,
    pub paths_relative_to: PathBuf,
}
