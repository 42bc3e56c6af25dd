use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "guild_players")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,
    pub guild_id: String,
    pub puuid: String,
    /// Last game the guild was told about for this player
    pub last_informed_game_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Guild,
    Player,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Guild => Entity::belongs_to(super::Guild::Entity)
                .from(Column::GuildId)
                .to(super::Guild::Column::Id)
                .into(),
            Self::Player => Entity::belongs_to(super::Player::Entity)
                .from(Column::Puuid)
                .to(super::Player::Column::Puuid)
                .into(),
        }
    }
}

impl Related<super::Guild::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Guild.def()
    }
}

impl Related<super::Player::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Player.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
