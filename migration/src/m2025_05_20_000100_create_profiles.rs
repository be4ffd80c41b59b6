//! Migration to create the profiles table.
//!
//! Profiles are the user aggregate: influencers and business owners alike.
//! Instagram connection state (external ids plus the sealed access token)
//! lives directly on the profile row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Profiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Profiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Profiles::DisplayName).text().not_null())
                    .col(
                        ColumnDef::new(Profiles::AccountType)
                            .text()
                            .not_null()
                            .default("influencer"),
                    )
                    .col(
                        ColumnDef::new(Profiles::InstagramConnected)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Profiles::InstagramUserId).text().null())
                    .col(ColumnDef::new(Profiles::InstagramUsername).text().null())
                    .col(
                        ColumnDef::new(Profiles::InstagramTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Profiles::InstagramTokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Profiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Profiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Profiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Profiles {
    Table,
    Id,
    DisplayName,
    AccountType,
    InstagramConnected,
    InstagramUserId,
    InstagramUsername,
    InstagramTokenCiphertext,
    InstagramTokenExpiresAt,
    CreatedAt,
    UpdatedAt,
}
