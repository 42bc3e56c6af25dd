use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "guilds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Channel that receives in-game notifications
    pub channel_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Players,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Players => Entity::has_many(super::GuildPlayer::Entity)
                .from(Column::Id)
                .to(super::GuildPlayer::Column::GuildId)
                .into(),
        }
    }
}

impl Related<super::GuildPlayer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Players.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
