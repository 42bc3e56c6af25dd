use std::collections::BTreeMap;

use chanclol_common::{ChannelId, GameId, GuildId, Puuid};

use crate::store::GuildSnapshot;

/// A notification target and the players it tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: GuildId,
    pub channel_id: ChannelId,
    last_informed: BTreeMap<Puuid, Option<GameId>>,
}

impl Guild {
    pub fn new(id: GuildId, channel_id: ChannelId) -> Self {
        Self {
            id,
            channel_id,
            last_informed: BTreeMap::new(),
        }
    }

    pub fn has_player(&self, puuid: &Puuid) -> bool {
        self.last_informed.contains_key(puuid)
    }

    /// Returns false if the player was already tracked
    pub fn add_player(&mut self, puuid: Puuid) -> bool {
        if self.has_player(&puuid) {
            return false;
        }
        self.last_informed.insert(puuid, None);
        true
    }

    /// Returns false if the player was not tracked
    pub fn remove_player(&mut self, puuid: &Puuid) -> bool {
        self.last_informed.remove(puuid).is_some()
    }

    pub fn players(&self) -> impl Iterator<Item = &Puuid> {
        self.last_informed.keys()
    }

    pub fn last_informed(&self, puuid: &Puuid) -> Option<GameId> {
        self.last_informed.get(puuid).copied().flatten()
    }

    /// Whether the guild tracks the player and has not been told about this game yet
    pub fn should_inform(&self, puuid: &Puuid, game_id: GameId) -> bool {
        match self.last_informed.get(puuid) {
            Some(last) => *last != Some(game_id),
            None => false,
        }
    }

    pub fn set_last_informed(&mut self, puuid: &Puuid, game_id: GameId) {
        if let Some(last) = self.last_informed.get_mut(puuid) {
            *last = Some(game_id);
        }
    }

    /// Takes channel and membership from the snapshot. Members known on both
    /// sides keep the in-memory last informed game, which is never older.
    pub fn merge(&mut self, snapshot: GuildSnapshot) {
        self.channel_id = snapshot.channel_id;
        let mut last_informed = snapshot.last_informed;
        for (puuid, last) in last_informed.iter_mut() {
            if let Some(known) = self.last_informed.get(puuid) {
                *last = *known;
            }
        }
        self.last_informed = last_informed;
    }
}

impl From<GuildSnapshot> for Guild {
    fn from(snapshot: GuildSnapshot) -> Self {
        Self {
            id: snapshot.id,
            channel_id: snapshot.channel_id,
            last_informed: snapshot.last_informed,
        }
    }
}
