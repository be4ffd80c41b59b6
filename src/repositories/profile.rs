//! # Profile Repository
//!
//! Database operations on profiles, including the Instagram connection
//! lifecycle: connect (upsert of external ids + sealed token), disconnect
//! (invalidate and clear the secret), and token access with expiry checks.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{self, CryptoKey};
use crate::instagram::BusinessAccount;
use crate::models::profile::{self, Entity, Model};

/// Repository for profile database operations
pub struct ProfileRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

/// Errors from profile connection operations
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),
}

impl ProfileRepository {
    /// Create a new profile repository
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(self.db.as_ref()).await
    }

    /// Insert a bare profile (no connection state). Mostly exercised by
    /// tests and seed tooling.
    pub async fn create(
        &self,
        display_name: &str,
        account_type: &str,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();
        let model = profile::ActiveModel {
            id: Set(Uuid::new_v4()),
            display_name: Set(display_name.to_string()),
            account_type: Set(account_type.to_string()),
            instagram_connected: Set(false),
            instagram_user_id: Set(None),
            instagram_username: Set(None),
            instagram_token_ciphertext: Set(None),
            instagram_token_expires_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model.insert(self.db.as_ref()).await
    }

    /// Persist a successful connect: external ids plus the sealed access
    /// token. This is the single write the callback performs.
    pub async fn mark_connected(
        &self,
        profile_id: Uuid,
        account: &BusinessAccount,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Model, ProfileError> {
        let existing = self
            .find_by_id(profile_id)
            .await?
            .ok_or(ProfileError::NotFound(profile_id))?;

        let sealed = crypto::seal_access_token(&self.crypto_key, profile_id, access_token)?;

        let mut active: profile::ActiveModel = existing.into();
        active.instagram_connected = Set(true);
        active.instagram_user_id = Set(Some(account.account_id.clone()));
        active.instagram_username = Set(Some(account.username.clone()));
        active.instagram_token_ciphertext = Set(Some(sealed));
        active.instagram_token_expires_at = Set(Some(expires_at));
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Invalidate the connection: clear the secret and external ids. Used
    /// when a downstream call proves the token dead or expiry has passed.
    pub async fn disconnect(&self, profile_id: Uuid) -> Result<Model, ProfileError> {
        let existing = self
            .find_by_id(profile_id)
            .await?
            .ok_or(ProfileError::NotFound(profile_id))?;

        let mut active: profile::ActiveModel = existing.into();
        active.instagram_connected = Set(false);
        active.instagram_token_ciphertext = Set(None);
        active.instagram_token_expires_at = Set(None);
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Open the stored access token, treating a missing, cleared, or
    /// expired credential as absent. Connected implies a future expiry;
    /// anything else must not be used against the provider.
    pub fn access_token(&self, profile: &Model) -> Result<Option<String>, ProfileError> {
        if !profile.instagram_connected {
            return Ok(None);
        }

        let Some(ciphertext) = profile.instagram_token_ciphertext.as_deref() else {
            return Ok(None);
        };

        match profile.instagram_token_expires_at {
            Some(expires_at) if expires_at > Utc::now() => {}
            _ => return Ok(None),
        }

        let token = crypto::open_access_token(&self.crypto_key, profile.id, ciphertext)?;
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    fn test_account() -> BusinessAccount {
        BusinessAccount {
            page_id: "page-1".to_string(),
            account_id: "17841400000000001".to_string(),
            username: "chef_anna".to_string(),
            account_type: "business".to_string(),
        }
    }

    async fn setup_repo() -> (tempfile::TempDir, ProfileRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::connect(format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        Migrator::up(&db, None).await.unwrap();
        let key = CryptoKey::new(vec![9u8; 32]).unwrap();
        (dir, ProfileRepository::new(Arc::new(db), key))
    }

    #[tokio::test]
    async fn connect_round_trip() {
        let (_dir, repo) = setup_repo().await;
        let profile = repo.create("Anna", "influencer").await.unwrap();

        let expires_at = Utc::now() + Duration::days(60);
        let updated = repo
            .mark_connected(profile.id, &test_account(), "IGQVJ-token", expires_at)
            .await
            .unwrap();

        assert!(updated.instagram_connected);
        assert_eq!(
            updated.instagram_user_id.as_deref(),
            Some("17841400000000001")
        );
        assert_eq!(updated.instagram_username.as_deref(), Some("chef_anna"));

        let token = repo.access_token(&updated).unwrap();
        assert_eq!(token.as_deref(), Some("IGQVJ-token"));
    }

    #[tokio::test]
    async fn expired_token_is_treated_as_absent() {
        let (_dir, repo) = setup_repo().await;
        let profile = repo.create("Anna", "influencer").await.unwrap();

        let expires_at = Utc::now() - Duration::minutes(1);
        let updated = repo
            .mark_connected(profile.id, &test_account(), "IGQVJ-token", expires_at)
            .await
            .unwrap();

        assert!(repo.access_token(&updated).unwrap().is_none());
    }

    #[tokio::test]
    async fn disconnect_clears_the_secret() {
        let (_dir, repo) = setup_repo().await;
        let profile = repo.create("Anna", "influencer").await.unwrap();

        let expires_at = Utc::now() + Duration::days(60);
        repo.mark_connected(profile.id, &test_account(), "IGQVJ-token", expires_at)
            .await
            .unwrap();

        let cleared = repo.disconnect(profile.id).await.unwrap();
        assert!(!cleared.instagram_connected);
        assert!(cleared.instagram_token_ciphertext.is_none());
        assert!(cleared.instagram_token_expires_at.is_none());
        assert!(repo.access_token(&cleared).unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_connected_unknown_profile_errors() {
        let (_dir, repo) = setup_repo().await;

        let result = repo
            .mark_connected(
                Uuid::new_v4(),
                &test_account(),
                "token",
                Utc::now() + Duration::days(1),
            )
            .await;
        assert!(matches!(result, Err(ProfileError::NotFound(_))));
    }
}
