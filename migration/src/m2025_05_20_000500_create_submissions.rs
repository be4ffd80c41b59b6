//! Migration to create the collaboration_submissions table.
//!
//! A submission is an influencer's claim of having posted the agreed
//! content. Status moves monotonically toward verified or rejected.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Submissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Submissions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Submissions::CollaborationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Submissions::InfluencerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Submissions::ContentUrl).text().not_null())
                    .col(
                        ColumnDef::new(Submissions::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Submissions::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Submissions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Submissions::UpdatedAt)
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
                    .name("idx_submissions_collaboration_id")
                    .table(Submissions::Table)
                    .col(Submissions::CollaborationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_submissions_influencer_id")
                    .table(Submissions::Table)
                    .col(Submissions::InfluencerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Submissions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Submissions {
    #[sea_orm(iden = "collaboration_submissions")]
    Table,
    Id,
    CollaborationId,
    InfluencerId,
    ContentUrl,
    Status,
    VerifiedAt,
    CreatedAt,
    UpdatedAt,
}
