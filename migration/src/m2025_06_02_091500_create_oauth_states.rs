//! Migration to create the oauth_states table.
//!
//! Single-use CSRF state tokens for the Instagram connect flow. Rows are
//! soft-consumed rather than deleted so a replayed callback can be told
//! apart from a token that never existed; expired rows are swept by the
//! verification worker.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthStates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthStates::Token).text().not_null())
                    .col(ColumnDef::new(OAuthStates::ProfileId).uuid().not_null())
                    .col(
                        ColumnDef::new(OAuthStates::RedirectPath)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthStates::Consumed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthStates::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthStates::CreatedAt)
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
                    .name("idx_oauth_states_token")
                    .table(OAuthStates::Table)
                    .col(OAuthStates::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_expires_at")
                    .table(OAuthStates::Table)
                    .col(OAuthStates::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OAuthStates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthStates {
    #[sea_orm(iden = "oauth_states")]
    Table,
    Id,
    Token,
    ProfileId,
    RedirectPath,
    Consumed,
    ExpiresAt,
    CreatedAt,
}
