//! Migration to create the story_verifications table.
//!
//! One row per submission, tracking the bounded retry loop the worker
//! drives against the Graph API plus any insight payloads delivered over
//! webhooks.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StoryVerifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StoryVerifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::SubmissionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::StoryId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::NextRetryAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::ClaimedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(StoryVerifications::LastError).text().null())
                    .col(
                        ColumnDef::new(StoryVerifications::InsightPayload)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(StoryVerifications::UpdatedAt)
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
                    .name("idx_story_verifications_submission_id")
                    .table(StoryVerifications::Table)
                    .col(StoryVerifications::SubmissionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // The worker scans by status; webhook delivery looks rows up by story id.
        manager
            .create_index(
                Index::create()
                    .name("idx_story_verifications_status")
                    .table(StoryVerifications::Table)
                    .col(StoryVerifications::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_story_verifications_story_id")
                    .table(StoryVerifications::Table)
                    .col(StoryVerifications::StoryId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StoryVerifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StoryVerifications {
    Table,
    Id,
    SubmissionId,
    StoryId,
    Status,
    RetryCount,
    NextRetryAt,
    ClaimedAt,
    LastError,
    InsightPayload,
    ProcessedAt,
    VerifiedAt,
    CreatedAt,
    UpdatedAt,
}
