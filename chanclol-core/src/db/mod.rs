use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chanclol_common::{
    ChanclolConfig, ChanclolError, ChannelId, GameId, GuildId, Puuid, RiotId, SummonerId,
};
use chanclol_db_entities::Player::PlayerMode;
use chanclol_db_entities::{Guild, GuildPlayer, Player, RiotIdRecord};
use chanclol_db_migrations::migrate_database;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, TransactionTrait,
};
use tokio::sync::Mutex;
use tracing::*;

use crate::scheduler::Mode;
use crate::store::{GuildSnapshot, IdentityRecord, PlayerSnapshot, StateStore};

pub async fn connect_to_db(config: &ChanclolConfig) -> Result<DatabaseConnection> {
    let mut url = url::Url::parse(&config.store.database_url.expose_secret()[..])?;
    if url.scheme() == "sqlite" && !url.path().contains(":memory:") {
        let path = url.path();
        let mut abs_path = config.paths_relative_to.clone();
        abs_path.push(path);
        abs_path.push("db.sqlite3");

        if let Some(parent) = abs_path.parent() {
            std::fs::create_dir_all(parent)?
        }

        url.set_path(
            abs_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Failed to convert database path to string"))?,
        );

        url.set_query(Some("mode=rwc"));

        let db = Database::connect(ConnectOptions::new(url.to_string())).await?;
        db.begin().await?.commit().await?;
        drop(db);
    }

    let mut opt = ConnectOptions::new(url.to_string());
    opt.max_connections(16)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(false);

    let connection = Database::connect(opt).await?;

    migrate_database(&connection).await?;
    info!("Database ready");
    Ok(connection)
}

impl From<PlayerMode> for Mode {
    fn from(mode: PlayerMode) -> Self {
        match mode {
            PlayerMode::Online => Mode::Online,
            PlayerMode::Offline => Mode::Offline,
        }
    }
}

impl From<Mode> for PlayerMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Online => PlayerMode::Online,
            Mode::Offline => PlayerMode::Offline,
        }
    }
}

pub struct DatabaseStateStore {
    db: Arc<Mutex<DatabaseConnection>>,
}

impl DatabaseStateStore {
    pub fn new(db: Arc<Mutex<DatabaseConnection>>) -> Self {
        Self { db }
    }

    async fn find_guild_player(
        db: &DatabaseConnection,
        id: &GuildId,
        puuid: &Puuid,
    ) -> Result<Option<GuildPlayer::Model>, ChanclolError> {
        Ok(GuildPlayer::Entity::find()
            .filter(GuildPlayer::Column::GuildId.eq(id.0.clone()))
            .filter(GuildPlayer::Column::Puuid.eq(puuid.0.clone()))
            .one(db)
            .await?)
    }
}

#[async_trait]
impl StateStore for DatabaseStateStore {
    async fn load_players(&self) -> Result<Vec<PlayerSnapshot>, ChanclolError> {
        let db = self.db.lock().await;
        Ok(Player::Entity::find()
            .all(&*db)
            .await?
            .into_iter()
            .map(|player| PlayerSnapshot {
                puuid: Puuid(player.puuid),
                mode: player.mode.into(),
                last_seen_online: player.last_seen_online,
            })
            .collect())
    }

    async fn save_player_state(&self, snapshot: &PlayerSnapshot) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        match Player::Entity::find_by_id(snapshot.puuid.0.clone())
            .one(&*db)
            .await?
        {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.mode = Set(snapshot.mode.into());
                model.last_seen_online = Set(snapshot.last_seen_online);
                model.update(&*db).await?;
            }
            None => {
                let values = Player::ActiveModel {
                    puuid: Set(snapshot.puuid.0.clone()),
                    mode: Set(snapshot.mode.into()),
                    last_seen_online: Set(snapshot.last_seen_online),
                };
                values.insert(&*db).await?;
            }
        }
        Ok(())
    }

    async fn remove_player(&self, puuid: &Puuid) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        let txn = db.begin().await?;
        GuildPlayer::Entity::delete_many()
            .filter(GuildPlayer::Column::Puuid.eq(puuid.0.clone()))
            .exec(&txn)
            .await?;
        Player::Entity::delete_by_id(puuid.0.clone())
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn load_guilds(&self) -> Result<Vec<GuildSnapshot>, ChanclolError> {
        let db = self.db.lock().await;
        let mut memberships: HashMap<String, BTreeMap<Puuid, Option<GameId>>> = HashMap::new();
        for member in GuildPlayer::Entity::find().all(&*db).await? {
            memberships
                .entry(member.guild_id)
                .or_default()
                .insert(Puuid(member.puuid), member.last_informed_game_id.map(GameId));
        }

        Ok(Guild::Entity::find()
            .all(&*db)
            .await?
            .into_iter()
            .map(|guild| GuildSnapshot {
                last_informed: memberships.remove(&guild.id).unwrap_or_default(),
                id: GuildId(guild.id),
                channel_id: ChannelId(guild.channel_id),
            })
            .collect())
    }

    async fn add_guild(&self, id: &GuildId, channel_id: &ChannelId) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        if Guild::Entity::find_by_id(id.0.clone())
            .one(&*db)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let values = Guild::ActiveModel {
            id: Set(id.0.clone()),
            channel_id: Set(channel_id.0.clone()),
        };
        values.insert(&*db).await?;
        Ok(())
    }

    async fn set_channel(&self, id: &GuildId, channel_id: &ChannelId) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        let guild = Guild::Entity::find_by_id(id.0.clone())
            .one(&*db)
            .await?
            .ok_or_else(|| ChanclolError::NotFound(format!("guild {id}")))?;
        let mut model = guild.into_active_model();
        model.channel_id = Set(channel_id.0.clone());
        model.update(&*db).await?;
        Ok(())
    }

    async fn add_player_to_guild(&self, id: &GuildId, puuid: &Puuid) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        if Self::find_guild_player(&db, id, puuid).await?.is_some() {
            return Ok(());
        }
        let values = GuildPlayer::ActiveModel {
            guild_id: Set(id.0.clone()),
            puuid: Set(puuid.0.clone()),
            last_informed_game_id: Set(None),
            ..Default::default()
        };
        values.insert(&*db).await?;
        Ok(())
    }

    async fn remove_player_from_guild(
        &self,
        id: &GuildId,
        puuid: &Puuid,
    ) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        GuildPlayer::Entity::delete_many()
            .filter(GuildPlayer::Column::GuildId.eq(id.0.clone()))
            .filter(GuildPlayer::Column::Puuid.eq(puuid.0.clone()))
            .exec(&*db)
            .await?;
        Ok(())
    }

    async fn set_last_informed_game(
        &self,
        id: &GuildId,
        puuid: &Puuid,
        game_id: Option<GameId>,
    ) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        let member = Self::find_guild_player(&db, id, puuid)
            .await?
            .ok_or_else(|| ChanclolError::NotFound(format!("player {puuid} in guild {id}")))?;
        let mut model = member.into_active_model();
        model.last_informed_game_id = Set(game_id.map(|g| g.0));
        model.update(&*db).await?;
        Ok(())
    }

    async fn load_identities(&self) -> Result<Vec<IdentityRecord>, ChanclolError> {
        let db = self.db.lock().await;
        Ok(RiotIdRecord::Entity::find()
            .all(&*db)
            .await?
            .into_iter()
            .map(|record| IdentityRecord {
                puuid: Puuid(record.puuid),
                riot_id: RiotId::new(record.game_name, record.tag_line),
                summoner_id: record.summoner_id.map(SummonerId),
            })
            .collect())
    }

    async fn save_riot_id(&self, puuid: &Puuid, riot_id: &RiotId) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        match RiotIdRecord::Entity::find_by_id(puuid.0.clone())
            .one(&*db)
            .await?
        {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.game_name = Set(riot_id.game_name.clone());
                model.tag_line = Set(riot_id.tag_line.clone());
                model.update(&*db).await?;
            }
            None => {
                let values = RiotIdRecord::ActiveModel {
                    puuid: Set(puuid.0.clone()),
                    game_name: Set(riot_id.game_name.clone()),
                    tag_line: Set(riot_id.tag_line.clone()),
                    summoner_id: Set(None),
                };
                values.insert(&*db).await?;
            }
        }
        Ok(())
    }

    async fn save_summoner_id(
        &self,
        puuid: &Puuid,
        summoner_id: &SummonerId,
    ) -> Result<(), ChanclolError> {
        let db = self.db.lock().await;
        let Some(existing) = RiotIdRecord::Entity::find_by_id(puuid.0.clone())
            .one(&*db)
            .await?
        else {
            debug!(%puuid, "No riot id stored yet, summoner id kept in memory only");
            return Ok(());
        };
        let mut model = existing.into_active_model();
        model.summoner_id = Set(Some(summoner_id.0.clone()));
        model.update(&*db).await?;
        Ok(())
    }

    async fn prune_identities(&self, keep: &HashSet<Puuid>) -> Result<u64, ChanclolError> {
        let db = self.db.lock().await;
        let keep = keep.iter().map(|p| p.0.clone()).collect::<Vec<_>>();
        let result = RiotIdRecord::Entity::delete_many()
            .filter(RiotIdRecord::Column::Puuid.is_not_in(keep))
            .exec(&*db)
            .await?;
        Ok(result.rows_affected)
    }
}
