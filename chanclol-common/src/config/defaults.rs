use std::time::Duration;

use crate::{QuotaRuleConfig, Secret};

#[inline]
pub(crate) fn _default_database_url() -> Secret<String> {
    Secret::new("sqlite:data/db".to_owned())
}

#[inline]
pub(crate) fn _default_regional_url() -> String {
    "https://europe.api.riotgames.com".to_owned()
}

#[inline]
pub(crate) fn _default_platform_url() -> String {
    "https://euw1.api.riotgames.com".to_owned()
}

#[inline]
pub(crate) fn _default_discord_api_url() -> String {
    "https://discord.com/api/v10".to_owned()
}

#[inline]
pub(crate) fn _default_data_dragon_url() -> String {
    "https://ddragon.leagueoflegends.com".to_owned()
}

#[inline]
pub(crate) fn _default_game_roster() -> bool {
    true
}

#[inline]
pub(crate) fn _default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Used when no quota rule gives a window to wait out
#[inline]
pub(crate) fn _default_throttle_cooldown() -> Duration {
    Duration::from_secs(120)
}

/// Limits of a development key
pub(crate) fn _default_quota_rules() -> Vec<QuotaRuleConfig> {
    vec![
        QuotaRuleConfig {
            max_requests: 20,
            window: Duration::from_secs(1),
        },
        QuotaRuleConfig {
            max_requests: 100,
            window: Duration::from_secs(120),
        },
    ]
}

#[inline]
pub(crate) fn _default_online_timeout() -> Duration {
    Duration::from_secs(60)
}

#[inline]
pub(crate) fn _default_offline_timeout() -> Duration {
    Duration::from_secs(60 * 5)
}

#[inline]
pub(crate) fn _default_offline_threshold() -> Duration {
    Duration::from_secs(60 * 30)
}

#[inline]
pub(crate) fn _default_main_cycle() -> Duration {
    Duration::from_secs(5)
}

#[inline]
pub(crate) fn _default_housekeeping_interval() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

#[inline]
pub(crate) fn _default_registry_sync_interval() -> Duration {
    Duration::from_secs(30)
}
