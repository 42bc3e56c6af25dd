use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Cached identity data, pruned by housekeeping once a player is no longer tracked
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "riot_ids")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
    pub summoner_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
