use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chanclol_common::{ChanclolError, ChannelId, GameId, GuildId, Puuid, RiotId, SummonerId};
use chrono::{DateTime, Utc};

use crate::scheduler::Mode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub puuid: Puuid,
    pub mode: Mode,
    pub last_seen_online: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub id: GuildId,
    pub channel_id: ChannelId,
    /// Tracked players and the last game each was reported in
    pub last_informed: BTreeMap<Puuid, Option<GameId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub puuid: Puuid,
    pub riot_id: RiotId,
    pub summoner_id: Option<SummonerId>,
}

/// Persisted registrations and cached identities
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_players(&self) -> Result<Vec<PlayerSnapshot>, ChanclolError>;
    async fn save_player_state(&self, snapshot: &PlayerSnapshot) -> Result<(), ChanclolError>;
    /// Also drops the player from every guild
    async fn remove_player(&self, puuid: &Puuid) -> Result<(), ChanclolError>;

    async fn load_guilds(&self) -> Result<Vec<GuildSnapshot>, ChanclolError>;
    async fn add_guild(&self, id: &GuildId, channel_id: &ChannelId) -> Result<(), ChanclolError>;
    async fn set_channel(&self, id: &GuildId, channel_id: &ChannelId) -> Result<(), ChanclolError>;
    async fn add_player_to_guild(&self, id: &GuildId, puuid: &Puuid) -> Result<(), ChanclolError>;
    async fn remove_player_from_guild(
        &self,
        id: &GuildId,
        puuid: &Puuid,
    ) -> Result<(), ChanclolError>;
    async fn set_last_informed_game(
        &self,
        id: &GuildId,
        puuid: &Puuid,
        game_id: Option<GameId>,
    ) -> Result<(), ChanclolError>;

    async fn load_identities(&self) -> Result<Vec<IdentityRecord>, ChanclolError>;
    /// Replaces any previous riot id stored for the puuid
    async fn save_riot_id(&self, puuid: &Puuid, riot_id: &RiotId) -> Result<(), ChanclolError>;
    async fn save_summoner_id(
        &self,
        puuid: &Puuid,
        summoner_id: &SummonerId,
    ) -> Result<(), ChanclolError>;
    /// Drops identities of every puuid not in `keep`, returns how many were dropped
    async fn prune_identities(&self, keep: &HashSet<Puuid>) -> Result<u64, ChanclolError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Tables {
        players: BTreeMap<Puuid, PlayerSnapshot>,
        guilds: BTreeMap<GuildId, GuildSnapshot>,
        identities: BTreeMap<Puuid, IdentityRecord>,
    }

    /// Keeps everything in memory, so it works on a paused clock
    #[derive(Default)]
    pub struct MemoryStateStore {
        tables: Mutex<Tables>,
    }

    impl MemoryStateStore {
        fn guild<'a>(
            guilds: &'a mut BTreeMap<GuildId, GuildSnapshot>,
            id: &GuildId,
        ) -> Result<&'a mut GuildSnapshot, ChanclolError> {
            guilds
                .get_mut(id)
                .ok_or_else(|| ChanclolError::NotFound(format!("guild {id}")))
        }
    }

    #[async_trait]
    impl StateStore for MemoryStateStore {
        async fn load_players(&self) -> Result<Vec<PlayerSnapshot>, ChanclolError> {
            Ok(self.tables.lock()?.players.values().cloned().collect())
        }

        async fn save_player_state(&self, snapshot: &PlayerSnapshot) -> Result<(), ChanclolError> {
            self.tables
                .lock()?
                .players
                .insert(snapshot.puuid.clone(), snapshot.clone());
            Ok(())
        }

        async fn remove_player(&self, puuid: &Puuid) -> Result<(), ChanclolError> {
            let mut tables = self.tables.lock()?;
            tables.players.remove(puuid);
            for guild in tables.guilds.values_mut() {
                guild.last_informed.remove(puuid);
            }
            Ok(())
        }

        async fn load_guilds(&self) -> Result<Vec<GuildSnapshot>, ChanclolError> {
            Ok(self.tables.lock()?.guilds.values().cloned().collect())
        }

        async fn add_guild(&self, id: &GuildId, channel_id: &ChannelId) -> Result<(), ChanclolError> {
            self.tables
                .lock()?
                .guilds
                .entry(id.clone())
                .or_insert_with(|| GuildSnapshot {
                    id: id.clone(),
                    channel_id: channel_id.clone(),
                    last_informed: BTreeMap::new(),
                });
            Ok(())
        }

        async fn set_channel(&self, id: &GuildId, channel_id: &ChannelId) -> Result<(), ChanclolError> {
            let mut tables = self.tables.lock()?;
            Self::guild(&mut tables.guilds, id)?.channel_id = channel_id.clone();
            Ok(())
        }

        async fn add_player_to_guild(&self, id: &GuildId, puuid: &Puuid) -> Result<(), ChanclolError> {
            let mut tables = self.tables.lock()?;
            Self::guild(&mut tables.guilds, id)?
                .last_informed
                .entry(puuid.clone())
                .or_insert(None);
            Ok(())
        }

        async fn remove_player_from_guild(
            &self,
            id: &GuildId,
            puuid: &Puuid,
        ) -> Result<(), ChanclolError> {
            if let Some(guild) = self.tables.lock()?.guilds.get_mut(id) {
                guild.last_informed.remove(puuid);
            }
            Ok(())
        }

        async fn set_last_informed_game(
            &self,
            id: &GuildId,
            puuid: &Puuid,
            game_id: Option<GameId>,
        ) -> Result<(), ChanclolError> {
            let mut tables = self.tables.lock()?;
            let last = Self::guild(&mut tables.guilds, id)?
                .last_informed
                .get_mut(puuid)
                .ok_or_else(|| ChanclolError::NotFound(format!("player {puuid} in guild {id}")))?;
            *last = game_id;
            Ok(())
        }

        async fn load_identities(&self) -> Result<Vec<IdentityRecord>, ChanclolError> {
            Ok(self.tables.lock()?.identities.values().cloned().collect())
        }

        async fn save_riot_id(&self, puuid: &Puuid, riot_id: &RiotId) -> Result<(), ChanclolError> {
            self.tables
                .lock()?
                .identities
                .entry(puuid.clone())
                .and_modify(|record| record.riot_id = riot_id.clone())
                .or_insert_with(|| IdentityRecord {
                    puuid: puuid.clone(),
                    riot_id: riot_id.clone(),
                    summoner_id: None,
                });
            Ok(())
        }

        async fn save_summoner_id(
            &self,
            puuid: &Puuid,
            summoner_id: &SummonerId,
        ) -> Result<(), ChanclolError> {
            if let Some(record) = self.tables.lock()?.identities.get_mut(puuid) {
                record.summoner_id = Some(summoner_id.clone());
            }
            Ok(())
        }

        async fn prune_identities(&self, keep: &HashSet<Puuid>) -> Result<u64, ChanclolError> {
            let mut tables = self.tables.lock()?;
            let before = tables.identities.len();
            tables.identities.retain(|puuid, _| keep.contains(puuid));
            Ok((before - tables.identities.len()) as u64)
        }
    }

    pub fn memory_store() -> Arc<dyn StateStore> {
        Arc::new(MemoryStateStore::default())
    }
}
