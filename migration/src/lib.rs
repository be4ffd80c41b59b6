//! Database migrations for the StoryProof service.
//!
//! All schema changes go through SeaORM Migration so deployments and test
//! databases share a single source of truth.

pub use sea_orm_migration::prelude::*;

mod m2025_05_20_000100_create_profiles;
mod m2025_05_20_000200_create_businesses;
mod m2025_05_20_000300_create_campaigns;
mod m2025_05_20_000400_create_collaborations;
mod m2025_05_20_000500_create_submissions;
mod m2025_05_20_000600_create_story_verifications;
mod m2025_05_20_000700_create_notifications;
mod m2025_06_02_091500_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_20_000100_create_profiles::Migration),
            Box::new(m2025_05_20_000200_create_businesses::Migration),
            Box::new(m2025_05_20_000300_create_campaigns::Migration),
            Box::new(m2025_05_20_000400_create_collaborations::Migration),
            Box::new(m2025_05_20_000500_create_submissions::Migration),
            Box::new(m2025_05_20_000600_create_story_verifications::Migration),
            Box::new(m2025_05_20_000700_create_notifications::Migration),
            Box::new(m2025_06_02_091500_create_oauth_states::Migration),
        ]
    }
}
