//! # OAuth State Repository
//!
//! Issues and consumes the single-use state tokens protecting the
//! Instagram connect flow. Consumption is a conditional UPDATE checked by
//! rows_affected, so two callbacks racing on the same token can never
//! both succeed.

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, ConsumedState, Entity, Model};

/// Repository for OAuth state database operations
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    /// Create a new OAuth state repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Mint and persist a new state token bound to the given profile and
    /// resume path. Returns the full row; callers put `.token` on the wire.
    pub async fn issue(
        &self,
        profile_id: Uuid,
        redirect_path: &str,
        ttl_minutes: i64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();

        let state = oauth_state::ActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(generate_state_token()),
            profile_id: Set(profile_id),
            redirect_path: Set(redirect_path.to_string()),
            consumed: Set(false),
            expires_at: Set(now + Duration::minutes(ttl_minutes)),
            created_at: Set(now),
        };

        state.insert(self.db.as_ref()).await
    }

    /// Atomically consume an unexpired, unconsumed state token.
    ///
    /// The conditional UPDATE is the replay guard: whichever caller flips
    /// the flag first gets the bound identity back; everyone else gets
    /// `None`, exactly as for an unknown token.
    pub async fn consume(&self, token: &str) -> Result<Option<ConsumedState>, sea_orm::DbErr> {
        let now = Utc::now();

        let result = Entity::update_many()
            .col_expr(oauth_state::Column::Consumed, Expr::value(true))
            .filter(oauth_state::Column::Token.eq(token))
            .filter(oauth_state::Column::Consumed.eq(false))
            .filter(oauth_state::Column::ExpiresAt.gt(now))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected != 1 {
            return Ok(None);
        }

        let row = Entity::find()
            .filter(oauth_state::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await?;

        Ok(row.map(ConsumedState::from))
    }

    /// Delete rows past their expiry, consumed or not. Returns the count.
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    /// Delete a specific state row (used when the connect flow aborts
    /// after the insert).
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(result.rows_affected > 0)
    }
}

/// Generate a cryptographically secure random state token (32 bytes,
/// base64-url encoded).
fn generate_state_token() -> String {
    use rand::Rng;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);

    base64_url::encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup_db() -> (tempfile::TempDir, Arc<DatabaseConnection>) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::connect(format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .expect("Failed to connect to test database");
        Migrator::up(&db, None).await.unwrap();
        (dir, Arc::new(db))
    }

    #[test]
    fn state_tokens_are_unique_and_url_safe() {
        let a = generate_state_token();
        let b = generate_state_token();

        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // base64 of 32 bytes
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[tokio::test]
    async fn consume_returns_bound_identity_once() {
        let (_dir, db) = setup_db().await;
        let repo = OAuthStateRepository::new(db);
        let profile_id = Uuid::new_v4();

        let state = repo.issue(profile_id, "/influencer", 15).await.unwrap();
        assert!(!state.consumed);

        let consumed = repo.consume(&state.token).await.unwrap().unwrap();
        assert_eq!(consumed.profile_id, profile_id);
        assert_eq!(consumed.redirect_path, "/influencer");

        // Replay must fail.
        assert!(repo.consume(&state.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn consume_rejects_unknown_tokens() {
        let (_dir, db) = setup_db().await;
        let repo = OAuthStateRepository::new(db);

        assert!(repo.consume("no-such-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn consume_rejects_expired_tokens() {
        let (_dir, db) = setup_db().await;
        let repo = OAuthStateRepository::new(db);

        // TTL in the past: negative minutes puts expires_at before now.
        let state = repo.issue(Uuid::new_v4(), "/business", -1).await.unwrap();
        assert!(repo.consume(&state.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_consumers_cannot_both_win() {
        let (_dir, db) = setup_db().await;
        let repo = Arc::new(OAuthStateRepository::new(db.clone()));

        let state = repo.issue(Uuid::new_v4(), "/influencer", 15).await.unwrap();

        let repo_a = Arc::clone(&repo);
        let repo_b = Arc::clone(&repo);
        let token_a = state.token.clone();
        let token_b = state.token.clone();

        let (a, b) = tokio::join!(
            tokio::spawn(async move { repo_a.consume(&token_a).await.unwrap() }),
            tokio::spawn(async move { repo_b.consume(&token_b).await.unwrap() }),
        );

        let wins = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_rows() {
        let (_dir, db) = setup_db().await;
        let repo = OAuthStateRepository::new(db);

        let live = repo.issue(Uuid::new_v4(), "/a", 15).await.unwrap();
        let _dead = repo.issue(Uuid::new_v4(), "/b", -5).await.unwrap();

        let removed = repo.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);

        // The live token still works.
        assert!(repo.consume(&live.token).await.unwrap().is_some());
    }
}
