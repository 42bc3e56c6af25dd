use sea_orm_migration::prelude::*;

use crate::m00001_create_players_and_guilds::guild_player;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m00003_guild_player_index"
    }
}

const INDEX_NAME: &str = "guild_players__guild_id_puuid";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name(INDEX_NAME)
                    .table(guild_player::Entity)
                    .col(guild_player::Column::GuildId)
                    .col(guild_player::Column::Puuid)
                    .unique()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(INDEX_NAME)
                    .table(guild_player::Entity)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
