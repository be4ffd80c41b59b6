//! Shared helpers for integration tests: SQLite test databases with
//! migrations applied, app state construction, and marketplace chain
//! seeding.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use tempfile::TempDir;
use uuid::Uuid;

use storyproof::config::AppConfig;
use storyproof::crypto::CryptoKey;
use storyproof::instagram::BusinessAccount;
use storyproof::models::{business, campaign, collaboration};
use storyproof::repositories::{ProfileRepository, SubmissionRepository};
use storyproof::server::AppState;

pub const OPERATOR_TOKEN: &str = "test-operator-token";
pub const VERIFY_TOKEN: &str = "hub-verify-secret";

/// Create a fresh SQLite database with all migrations applied. The
/// returned TempDir must stay alive for the duration of the test.
pub async fn setup_test_db() -> (TempDir, DatabaseConnection) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.db");
    let db = Database::connect(format!("sqlite://{}?mode=rwc", db_path.display()))
        .await
        .expect("Failed to connect to test database");
    Migrator::up(&db, None).await.expect("Failed to apply migrations");
    (dir, db)
}

/// Baseline test configuration: test profile, operator token, fixed
/// crypto key, webhook verify token.
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        crypto_key: Some(vec![7u8; 32]),
        webhook_verify_token: Some(VERIFY_TOKEN.to_string()),
        instagram_app_id: Some("test-app-id".to_string()),
        instagram_app_secret: Some("test-app-secret".to_string()),
        ..Default::default()
    }
}

/// Build application state from a config and test database.
pub fn build_state(config: AppConfig, db: DatabaseConnection) -> AppState {
    AppState::new(config, db).expect("Failed to build app state")
}

pub fn crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).unwrap()
}

pub fn test_business_account() -> BusinessAccount {
    BusinessAccount {
        page_id: "page-77".to_string(),
        account_id: "17841400000000001".to_string(),
        username: "bistro_luna".to_string(),
        account_type: "business".to_string(),
    }
}

/// Ids of a fully seeded marketplace chain:
/// influencer + business owner profiles, business, campaign, collaboration.
pub struct ChainIds {
    pub influencer_id: Uuid,
    pub owner_profile_id: Uuid,
    pub business_id: Uuid,
    pub campaign_id: Uuid,
    pub collaboration_id: Uuid,
}

/// Seed the ownership chain the verification worker walks:
/// collaboration → campaign → business → owner profile.
pub async fn seed_chain(db: &DatabaseConnection) -> ChainIds {
    let profiles = ProfileRepository::new(Arc::new(db.clone()), crypto_key());

    let influencer = profiles.create("Chef Anna", "influencer").await.unwrap();
    let owner = profiles.create("Bistro Luna", "business").await.unwrap();

    let now = Utc::now();

    let business = business::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_profile_id: Set(owner.id),
        name: Set("Bistro Luna".to_string()),
        created_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let campaign = campaign::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business.id),
        name: Set("Summer tasting menu".to_string()),
        status: Set("active".to_string()),
        created_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let collaboration = collaboration::ActiveModel {
        id: Set(Uuid::new_v4()),
        campaign_id: Set(campaign.id),
        influencer_id: Set(influencer.id),
        status: Set("active".to_string()),
        created_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    ChainIds {
        influencer_id: influencer.id,
        owner_profile_id: owner.id,
        business_id: business.id,
        campaign_id: campaign.id,
        collaboration_id: collaboration.id,
    }
}

/// Give the chain's business owner a live Instagram credential.
pub async fn connect_owner(db: &DatabaseConnection, owner_profile_id: Uuid, access_token: &str) {
    let profiles = ProfileRepository::new(Arc::new(db.clone()), crypto_key());
    profiles
        .mark_connected(
            owner_profile_id,
            &test_business_account(),
            access_token,
            Utc::now() + Duration::days(60),
        )
        .await
        .unwrap();
}

/// Create a submission + verification pair on the chain.
pub async fn seed_submission(
    db: &DatabaseConnection,
    chain: &ChainIds,
    story_id: &str,
) -> (
    storyproof::models::submission::Model,
    storyproof::models::story_verification::Model,
) {
    let submissions = SubmissionRepository::new(Arc::new(db.clone()));
    submissions
        .create_with_verification(
            chain.collaboration_id,
            chain.influencer_id,
            &format!("https://instagram.com/stories/chef_anna/{}", story_id),
            story_id,
        )
        .await
        .unwrap()
}
