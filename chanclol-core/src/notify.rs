use std::collections::BTreeMap;
use std::fmt::Display;

use async_trait::async_trait;
use chanclol_common::{ChanclolError, ChannelId, DiscordConfig, GuildId, Puuid, RiotId, Secret};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::*;

use crate::riotapi::{Participant, Spectator};

/// A tracked player was found in a game their guild has not heard about yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameNotification {
    pub guild_id: GuildId,
    pub puuid: Puuid,
    pub riot_id: Option<RiotId>,
    pub spectator: Spectator,
}

impl GameNotification {
    /// Headline, then one block per team with the tracked player's team first
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut text = match &self.riot_id {
            Some(riot_id) => format!("{riot_id} is in game"),
            None => format!("{} is in game", self.puuid),
        };
        let minutes = self.spectator.game_length.as_secs() / 60;
        if self.spectator.game_mode.is_empty() {
            text += &format!(" ({minutes} min in)");
        } else {
            text += &format!(" ({}, {minutes} min in)", self.spectator.game_mode);
        }

        let mut teams: BTreeMap<i64, Vec<&Participant>> = BTreeMap::new();
        for participant in &self.spectator.participants {
            teams.entry(participant.team_id).or_default().push(participant);
        }
        let own_team = self
            .spectator
            .participants
            .iter()
            .find(|p| p.puuid.as_ref() == Some(&self.puuid))
            .map(|p| p.team_id);
        let mut order = teams.keys().copied().collect::<Vec<_>>();
        if let Some(own) = own_team {
            order.retain(|team| *team != own);
            order.insert(0, own);
        }

        for (index, team_id) in order.iter().enumerate() {
            text += &format!("\nTeam {}", index + 1);
            for participant in &teams[team_id] {
                text += "\n";
                text += &render_participant(participant, now);
            }
        }
        text
    }
}

fn render_participant(participant: &Participant, now: DateTime<Utc>) -> String {
    let champion = match &participant.champion_name {
        Some(name) => name.clone(),
        None => format!("Champion {}", participant.champion_id),
    };
    let player = match (&participant.riot_id, &participant.puuid) {
        (Some(riot_id), _) => riot_id.to_string(),
        (None, Some(puuid)) => puuid.to_string(),
        (None, None) => "hidden".to_owned(),
    };
    let mut line = format!("- {champion} ({player})");

    match &participant.mastery {
        Some(mastery) => {
            let days = (now - mastery.last_play_time).num_days().max(0);
            let played = match days {
                0 => "today".to_owned(),
                1 => "yesterday".to_owned(),
                days => format!("{days} days ago"),
            };
            line += &format!(", mastery {}, last played {played}", mastery.level);
        }
        None => line += ", no mastery",
    }
    for league in &participant.leagues {
        line += &format!(
            ", {} {} {} {} LP",
            league.queue_label(),
            league.tier,
            league.rank,
            league.league_points
        );
    }
    line
}

impl Display for GameNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render(Utc::now()))
    }
}

/// Delivery is best-effort, the caller does not retry
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        channel: &ChannelId,
        notification: &GameNotification,
    ) -> Result<(), ChanclolError>;
}

/// Emits notifications as log events
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        channel: &ChannelId,
        notification: &GameNotification,
    ) -> Result<(), ChanclolError> {
        info!(
            guild = %notification.guild_id,
            %channel,
            game_id = %notification.spectator.game_id,
            "{notification}"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

pub struct DiscordNotificationSink {
    client: reqwest::Client,
    api_url: String,
    token: Secret<String>,
}

impl DiscordNotificationSink {
    pub fn new(config: &DiscordConfig, token: Secret<String>) -> Result<Self, ChanclolError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            token,
        })
    }

    fn authorization(&self) -> String {
        let token = self.token.expose_secret();
        format!("Bot {}", token.strip_prefix("Bot ").unwrap_or(token))
    }
}

#[async_trait]
impl NotificationSink for DiscordNotificationSink {
    async fn notify(
        &self,
        channel: &ChannelId,
        notification: &GameNotification,
    ) -> Result<(), ChanclolError> {
        let url = format!("{}/channels/{channel}/messages", self.api_url);
        let content = notification.to_string();
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization())
            .json(&CreateMessage { content: &content })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%channel, %status, "Failed to deliver notification");
            return Err(ChanclolError::RemoteStatus(status));
        }
        debug!(%channel, "Notification delivered");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chanclol_common::GameId;
    use chrono::TimeZone;

    use super::*;
    use crate::riotapi::{League, Mastery};

    /// Records every delivery
    #[derive(Default)]
    pub struct RecordingSink {
        pub delivered: Mutex<Vec<(ChannelId, GameNotification)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(
            &self,
            channel: &ChannelId,
            notification: &GameNotification,
        ) -> Result<(), ChanclolError> {
            self.delivered
                .lock()
                .unwrap()
                .push((channel.clone(), notification.clone()));
            Ok(())
        }
    }

    pub fn spectator(game_id: i64) -> Spectator {
        Spectator {
            game_id: GameId(game_id),
            game_mode: "CLASSIC".into(),
            game_length: Duration::from_secs(305),
            participants: vec![],
        }
    }

    #[test]
    fn test_notification_text() {
        let mut notification = GameNotification {
            guild_id: "g1".into(),
            puuid: "p1".into(),
            riot_id: Some(RiotId::new("Name", "EUW")),
            spectator: spectator(1),
        };
        assert_eq!(notification.to_string(), "Name#EUW is in game (CLASSIC, 5 min in)");

        notification.riot_id = None;
        notification.spectator.game_mode = String::new();
        assert_eq!(notification.to_string(), "p1 is in game (5 min in)");
    }

    fn participant(puuid: Option<&str>, champion_id: i64, team_id: i64) -> Participant {
        Participant {
            puuid: puuid.map(Puuid::from),
            champion_id,
            team_id,
            riot_id: None,
            champion_name: None,
            mastery: None,
            leagues: vec![],
        }
    }

    #[test]
    fn test_roster_puts_own_team_first() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 20, 0, 0).unwrap();
        let mut own = participant(Some("p1"), 1, 200);
        own.riot_id = Some(RiotId::new("Name", "EUW"));
        own.champion_name = Some("Annie".into());
        own.mastery = Some(Mastery {
            level: 7,
            last_play_time: now - chrono::TimeDelta::days(3),
        });
        own.leagues = vec![League {
            queue_type: "RANKED_SOLO_5x5".into(),
            tier: "GOLD".into(),
            rank: "II".into(),
            league_points: 40,
            wins: 3,
            losses: 1,
        }];

        let mut game = spectator(1);
        game.participants = vec![participant(Some("p2"), 7, 100), own, participant(None, 8, 200)];
        let notification = GameNotification {
            guild_id: "g1".into(),
            puuid: "p1".into(),
            riot_id: Some(RiotId::new("Name", "EUW")),
            spectator: game,
        };

        assert_eq!(
            notification.render(now),
            "Name#EUW is in game (CLASSIC, 5 min in)\n\
             Team 1\n\
             - Annie (Name#EUW), mastery 7, last played 3 days ago, Solo GOLD II 40 LP\n\
             - Champion 8 (hidden), no mastery\n\
             Team 2\n\
             - Champion 7 (p2), no mastery"
        );
    }

    #[test]
    fn test_bot_prefix_is_not_doubled() {
        let sink = DiscordNotificationSink::new(
            &DiscordConfig::default(),
            Secret::new("Bot abc".to_owned()),
        )
        .unwrap();
        assert_eq!(sink.authorization(), "Bot abc");
        assert_eq!(sink.api_url, "https://discord.com/api/v10");
    }
}
