use std::fmt::Display;
use std::sync::Arc;

use chanclol_common::{ChanclolError, ChannelId, GuildId, Puuid, RiotId};
use tokio::sync::Mutex;
use tracing::*;

use super::parser::{parse, Command, ParseError};
use crate::consts::COMMAND_PREFIX;
use crate::riotapi::{League, RiotApi};
use crate::scheduler::{Cadence, Guild, Player, Registry};
use crate::store::StateStore;

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Welcome(ChannelId),
    InvalidInput(ParseError),
    NoSuchPlayer(RiotId),
    AlreadyRegistered(RiotId),
    Registered {
        riot_id: RiotId,
        leagues: Vec<League>,
    },
    NotRegistered(RiotId),
    Unregistered(RiotId),
    Rank {
        riot_id: RiotId,
        leagues: Vec<League>,
    },
    ChannelChanged(ChannelId),
    Status {
        channel_id: ChannelId,
        players: Vec<String>,
    },
    Help,
}

fn write_leagues(f: &mut std::fmt::Formatter<'_>, leagues: &[League]) -> std::fmt::Result {
    if leagues.is_empty() {
        return write!(f, "\nNot ranked");
    }
    for league in leagues {
        write!(f, "\n{league}")?;
    }
    Ok(())
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Welcome(channel_id) => write!(
                f,
                "Hi, I will be sending messages to channel {channel_id}. \
                 Type `{COMMAND_PREFIX} help` to see what I can do"
            ),
            Self::InvalidInput(error) => write!(f, "Invalid command: {error}"),
            Self::NoSuchPlayer(riot_id) => write!(f, "Player {riot_id} does not exist"),
            Self::AlreadyRegistered(riot_id) => {
                write!(f, "Player {riot_id} is already registered")
            }
            Self::Registered { riot_id, leagues } => {
                write!(f, "Player {riot_id} has been registered")?;
                write_leagues(f, leagues)
            }
            Self::NotRegistered(riot_id) => write!(f, "Player {riot_id} was not registered"),
            Self::Unregistered(riot_id) => write!(f, "Player {riot_id} has been unregistered"),
            Self::Rank { riot_id, leagues } => {
                write!(f, "Rank of {riot_id}")?;
                write_leagues(f, leagues)
            }
            Self::ChannelChanged(channel_id) => {
                write!(f, "From now on I will send messages to channel {channel_id}")
            }
            Self::Status {
                channel_id,
                players,
            } => {
                write!(f, "Sending messages to channel {channel_id}")?;
                if players.is_empty() {
                    return write!(f, "\nNo players registered");
                }
                write!(f, "\nRegistered players:")?;
                for player in players {
                    write!(f, "\n- {player}")?;
                }
                Ok(())
            }
            Self::Help => write!(
                f,
                "Commands:\n\
                 `{COMMAND_PREFIX} register <game_name#tag_line>`: get notified when the player starts a game\n\
                 `{COMMAND_PREFIX} unregister <game_name#tag_line>`: stop tracking the player\n\
                 `{COMMAND_PREFIX} rank <game_name#tag_line>`: ranked standings of the player\n\
                 `{COMMAND_PREFIX} channel <channel>`: send notifications to another channel\n\
                 `{COMMAND_PREFIX} status`: channel in use and registered players\n\
                 `{COMMAND_PREFIX} help`: this message"
            ),
        }
    }
}

/// Turns chat commands into registry changes
pub struct CommandHandler {
    registry: Arc<Mutex<Registry>>,
    riot_api: Arc<RiotApi>,
    store: Arc<dyn StateStore>,
    cadence: Cadence,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        riot_api: Arc<RiotApi>,
        store: Arc<dyn StateStore>,
        cadence: Cadence,
    ) -> Self {
        Self {
            registry,
            riot_api,
            store,
            cadence,
        }
    }

    /// Errors are upstream failures while resolving players, bad input is a [Response].
    pub async fn handle_message(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        message: &str,
    ) -> Result<Vec<Response>, ChanclolError> {
        let command = match parse(message) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(vec![]),
            Err(error) => {
                info!(guild = %guild_id, %message, %error, "Invalid command");
                return Ok(vec![Response::InvalidInput(error)]);
            }
        };
        debug!(guild = %guild_id, ?command, "Handling command");

        let mut responses = vec![];
        if let Some(welcome) = self.ensure_guild(guild_id, channel_id).await {
            responses.push(welcome);
        }

        responses.push(match command {
            Command::Register(riot_id) => self.register(guild_id, riot_id).await?,
            Command::Unregister(riot_id) => self.unregister(guild_id, riot_id).await?,
            Command::Rank(riot_id) => self.rank(riot_id).await?,
            Command::Channel(channel_id) => self.channel(guild_id, channel_id).await?,
            Command::Status => self.status(guild_id).await?,
            Command::Help => Response::Help,
        });
        Ok(responses)
    }

    async fn ensure_guild(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<Response> {
        {
            let mut registry = self.registry.lock().await;
            if registry.guilds.contains_key(guild_id) {
                return None;
            }
            info!(guild = %guild_id, "Initialising guild");
            registry.guilds.insert(
                guild_id.clone(),
                Guild::new(guild_id.clone(), channel_id.clone()),
            );
        }
        if let Err(error) = self.store.add_guild(guild_id, channel_id).await {
            warn!(guild = %guild_id, ?error, "Failed to persist guild");
        }
        Some(Response::Welcome(channel_id.clone()))
    }

    async fn register(&self, guild_id: &GuildId, riot_id: RiotId) -> Result<Response, ChanclolError> {
        let Some(puuid) = self.riot_api.puuid(&riot_id).await? else {
            return Ok(Response::NoSuchPlayer(riot_id));
        };
        if self.guild_has_player(guild_id, &puuid).await? {
            info!(guild = %guild_id, %riot_id, "Player is already registered");
            return Ok(Response::AlreadyRegistered(riot_id));
        }

        let leagues = match self.riot_api.leagues(&puuid).await {
            Ok(leagues) => leagues,
            Err(error) => {
                warn!(%riot_id, ?error, "Could not fetch leagues");
                vec![]
            }
        };

        let new_player = {
            let mut registry = self.registry.lock().await;
            let new_player = if registry.players.contains_key(&puuid) {
                None
            } else {
                let player = Player::new(puuid.clone(), &self.cadence);
                let snapshot = player.snapshot();
                registry.players.insert(puuid.clone(), player);
                Some(snapshot)
            };
            registry
                .guilds
                .get_mut(guild_id)
                .ok_or_else(|| ChanclolError::NotFound(format!("guild {guild_id}")))?
                .add_player(puuid.clone());
            new_player
        };

        if let Some(snapshot) = new_player {
            if let Err(error) = self.store.save_player_state(&snapshot).await {
                warn!(%puuid, ?error, "Failed to persist player");
            }
        }
        if let Err(error) = self.store.add_player_to_guild(guild_id, &puuid).await {
            warn!(guild = %guild_id, %puuid, ?error, "Failed to persist registration");
        }
        info!(guild = %guild_id, %riot_id, %puuid, "Player registered");
        Ok(Response::Registered { riot_id, leagues })
    }

    async fn unregister(
        &self,
        guild_id: &GuildId,
        riot_id: RiotId,
    ) -> Result<Response, ChanclolError> {
        let Some(puuid) = self.riot_api.puuid(&riot_id).await? else {
            return Ok(Response::NoSuchPlayer(riot_id));
        };

        let removed_completely = {
            let mut registry = self.registry.lock().await;
            let guild = registry
                .guilds
                .get_mut(guild_id)
                .ok_or_else(|| ChanclolError::NotFound(format!("guild {guild_id}")))?;
            if !guild.remove_player(&puuid) {
                info!(guild = %guild_id, %riot_id, "Player was not registered");
                return Ok(Response::NotRegistered(riot_id));
            }
            let orphaned = !registry.is_tracked_by_any_guild(&puuid);
            if orphaned {
                registry.players.remove(&puuid);
            }
            orphaned
        };

        let persisted = if removed_completely {
            self.store.remove_player(&puuid).await
        } else {
            self.store.remove_player_from_guild(guild_id, &puuid).await
        };
        if let Err(error) = persisted {
            warn!(guild = %guild_id, %puuid, ?error, "Failed to persist unregistration");
        }
        info!(guild = %guild_id, %riot_id, removed_completely, "Player unregistered");
        Ok(Response::Unregistered(riot_id))
    }

    async fn rank(&self, riot_id: RiotId) -> Result<Response, ChanclolError> {
        let Some(puuid) = self.riot_api.puuid(&riot_id).await? else {
            return Ok(Response::NoSuchPlayer(riot_id));
        };
        let leagues = self.riot_api.leagues(&puuid).await?;
        Ok(Response::Rank { riot_id, leagues })
    }

    async fn channel(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
    ) -> Result<Response, ChanclolError> {
        {
            let mut registry = self.registry.lock().await;
            let guild = registry
                .guilds
                .get_mut(guild_id)
                .ok_or_else(|| ChanclolError::NotFound(format!("guild {guild_id}")))?;
            guild.channel_id = channel_id.clone();
        }
        if let Err(error) = self.store.set_channel(guild_id, &channel_id).await {
            warn!(guild = %guild_id, ?error, "Failed to persist channel");
        }
        info!(guild = %guild_id, channel = %channel_id, "Channel changed");
        Ok(Response::ChannelChanged(channel_id))
    }

    async fn status(&self, guild_id: &GuildId) -> Result<Response, ChanclolError> {
        let (channel_id, puuids) = {
            let registry = self.registry.lock().await;
            let guild = registry
                .guilds
                .get(guild_id)
                .ok_or_else(|| ChanclolError::NotFound(format!("guild {guild_id}")))?;
            (guild.channel_id.clone(), guild.players().cloned().collect::<Vec<_>>())
        };

        let mut players = vec![];
        for puuid in puuids {
            players.push(match self.riot_api.riot_id(&puuid).await {
                Ok(riot_id) => riot_id.to_string(),
                Err(error) => {
                    warn!(%puuid, ?error, "Could not resolve riot id");
                    puuid.to_string()
                }
            });
        }
        Ok(Response::Status {
            channel_id,
            players,
        })
    }

    async fn guild_has_player(&self, guild_id: &GuildId, puuid: &Puuid) -> Result<bool, ChanclolError> {
        let registry = self.registry.lock().await;
        Ok(registry
            .guilds
            .get(guild_id)
            .ok_or_else(|| ChanclolError::NotFound(format!("guild {guild_id}")))?
            .has_player(puuid))
    }
}
