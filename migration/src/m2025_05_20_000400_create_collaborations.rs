//! Migration to create the collaborations table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Collaborations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Collaborations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Collaborations::CampaignId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Collaborations::InfluencerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Collaborations::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Collaborations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_collaborations_campaign_id")
                    .table(Collaborations::Table)
                    .col(Collaborations::CampaignId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_collaborations_influencer_id")
                    .table(Collaborations::Table)
                    .col(Collaborations::InfluencerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Collaborations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Collaborations {
    Table,
    Id,
    CampaignId,
    InfluencerId,
    Status,
    CreatedAt,
}
