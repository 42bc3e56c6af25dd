use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

use chanclol_common::{GameId, Puuid, RiotId, SummonerId};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::consts::{QUEUE_RANKED_FLEX, QUEUE_RANKED_SOLO};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct League {
    pub queue_type: String,
    pub tier: String,
    pub rank: String,
    pub league_points: i32,
    pub wins: u32,
    pub losses: u32,
}

impl League {
    pub fn winrate(&self) -> f32 {
        let games = self.wins + self.losses;
        if games == 0 {
            return 0.0;
        }
        100.0 * self.wins as f32 / games as f32
    }

    /// Queue label used in game rosters
    pub fn queue_label(&self) -> &str {
        match self.queue_type.as_str() {
            QUEUE_RANKED_SOLO => "Solo",
            QUEUE_RANKED_FLEX => "Flex",
            other => other,
        }
    }
}

impl Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {} {} LP, {:.1}% winrate ({} games)",
            self.queue_type,
            self.tier,
            self.rank,
            self.league_points,
            self.winrate(),
            self.wins + self.losses,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mastery {
    pub level: i32,
    pub last_play_time: DateTime<Utc>,
}

/// One player of a live game. Everything past `team_id` is looked up
/// separately and stays empty when the lookup fails.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Absent for bots and hidden players
    pub puuid: Option<Puuid>,
    pub champion_id: i64,
    pub team_id: i64,
    #[serde(skip)]
    pub riot_id: Option<RiotId>,
    #[serde(skip)]
    pub champion_name: Option<String>,
    #[serde(skip)]
    pub mastery: Option<Mastery>,
    #[serde(skip)]
    pub leagues: Vec<League>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spectator {
    pub game_id: GameId,
    pub game_mode: String,
    pub game_length: Duration,
    pub participants: Vec<Participant>,
}

impl Spectator {
    pub fn has_participant(&self, puuid: &Puuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.puuid.as_ref() == Some(puuid))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpectatorOutcome {
    InGame(Spectator),
    NotInGame,
    /// The check was not performed this time
    Skipped,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountDto {
    pub puuid: Puuid,
    pub game_name: String,
    pub tag_line: String,
}

impl AccountDto {
    pub fn riot_id(&self) -> RiotId {
        RiotId::new(self.game_name.clone(), self.tag_line.clone())
    }
}

#[derive(Deserialize)]
pub(crate) struct SummonerDto {
    pub id: SummonerId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameIdDto {
    pub game_id: GameId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MasteryDto {
    pub champion_level: i32,
    /// Milliseconds since the epoch
    pub last_play_time: i64,
}

impl MasteryDto {
    pub fn into_mastery(self) -> Option<Mastery> {
        Some(Mastery {
            level: self.champion_level,
            last_play_time: DateTime::from_timestamp_millis(self.last_play_time)?,
        })
    }
}

#[derive(Deserialize)]
pub(crate) struct ChampionDto {
    pub id: String,
    /// Numeric champion id, as a string
    pub key: String,
}

#[derive(Deserialize)]
pub(crate) struct ChampionsDto {
    pub data: HashMap<String, ChampionDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpectatorDto {
    pub game_id: GameId,
    #[serde(default)]
    pub game_mode: String,
    /// Seconds since the game started
    #[serde(default)]
    pub game_length: i64,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl From<SpectatorDto> for Spectator {
    fn from(dto: SpectatorDto) -> Self {
        Self {
            game_id: dto.game_id,
            game_mode: dto.game_mode,
            game_length: Duration::from_secs(dto.game_length.max(0) as u64),
            participants: dto.participants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_spectator() {
        let dto: SpectatorDto = serde_json::from_str(
            r#"{
                "gameId": 7012345678,
                "gameMode": "CLASSIC",
                "gameLength": 312,
                "participants": [
                    {"puuid": "p1", "championId": 103, "teamId": 100, "spell1Id": 4},
                    {"puuid": null, "championId": 7, "teamId": 200}
                ]
            }"#,
        )
        .unwrap();
        let spectator = Spectator::from(dto);

        assert_eq!(spectator.game_id, GameId(7012345678));
        assert_eq!(spectator.game_length, Duration::from_secs(312));
        assert!(spectator.has_participant(&"p1".into()));
        assert!(!spectator.has_participant(&"p2".into()));
    }

    #[test]
    fn test_league_winrate() {
        let league = League {
            queue_type: "RANKED_SOLO_5x5".into(),
            tier: "GOLD".into(),
            rank: "II".into(),
            league_points: 40,
            wins: 30,
            losses: 10,
        };
        assert_eq!(league.winrate(), 75.0);
        assert_eq!(
            league.to_string(),
            "RANKED_SOLO_5x5: GOLD II 40 LP, 75.0% winrate (40 games)"
        );
    }

    #[test]
    fn test_decode_mastery_and_champions() {
        let mastery: MasteryDto =
            serde_json::from_str(r#"{"championLevel": 7, "lastPlayTime": 1714593600000, "championPoints": 1}"#)
                .unwrap();
        let mastery = mastery.into_mastery().unwrap();
        assert_eq!(mastery.level, 7);
        assert_eq!(mastery.last_play_time.timestamp(), 1714593600);

        let champions: ChampionsDto = serde_json::from_str(
            r#"{"type": "champion", "data": {"Annie": {"id": "Annie", "key": "1", "name": "Annie"}}}"#,
        )
        .unwrap();
        assert_eq!(champions.data["Annie"].key, "1");
    }
}
