//! # Story Verification Repository
//!
//! Persistence for the bounded verification loop. Status moves pending →
//! verified | failed; retry_count only ever grows and is capped by the
//! configured maximum. The worker claims rows through a conditional
//! UPDATE lease before touching them so overlapping runs cannot
//! double-count an attempt.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::story_verification::{self, Entity, Model, status};

/// Outcome of recording a failed provider lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Below the attempt bound; the record stays pending with a scheduled retry.
    Retrying { retry_count: i32 },
    /// The bound was reached; the record is terminally failed.
    Failed { retry_count: i32 },
}

/// Repository for story verification operations
pub struct StoryVerificationRepository {
    db: Arc<DatabaseConnection>,
}

impl StoryVerificationRepository {
    /// Create a new story verification repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(self.db.as_ref()).await
    }

    pub async fn find_by_submission(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(story_verification::Column::SubmissionId.eq(submission_id))
            .one(self.db.as_ref())
            .await
    }

    pub async fn find_by_story_id(&self, story_id: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(story_verification::Column::StoryId.eq(story_id))
            .one(self.db.as_ref())
            .await
    }

    /// The work batch for one tick: pending rows under the attempt bound
    /// whose backoff window has elapsed. Terminal rows can never match.
    pub async fn due_batch(
        &self,
        now: DateTime<Utc>,
        max_attempts: i32,
        batch_size: u64,
    ) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(story_verification::Column::Status.eq(status::PENDING))
            .filter(story_verification::Column::RetryCount.lt(max_attempts))
            .filter(story_verification::Column::VerifiedAt.is_null())
            .filter(
                Condition::any()
                    .add(story_verification::Column::NextRetryAt.is_null())
                    .add(story_verification::Column::NextRetryAt.lte(now)),
            )
            .order_by_asc(story_verification::Column::CreatedAt)
            .limit(batch_size)
            .all(self.db.as_ref())
            .await
    }

    /// Take the per-record lease. Returns false when another run holds a
    /// live lease or the row has left pending, in which case the caller
    /// must skip the record.
    pub async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_seconds: i64,
    ) -> Result<bool, sea_orm::DbErr> {
        let lease_floor = now - Duration::seconds(lease_seconds);

        let result = Entity::update_many()
            .col_expr(story_verification::Column::ClaimedAt, Expr::value(now))
            .filter(story_verification::Column::Id.eq(id))
            .filter(story_verification::Column::Status.eq(status::PENDING))
            .filter(
                Condition::any()
                    .add(story_verification::Column::ClaimedAt.is_null())
                    .add(story_verification::Column::ClaimedAt.lt(lease_floor)),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Terminal success: stamp verified_at, store the provider payload,
    /// release the lease.
    pub async fn mark_verified(
        &self,
        record: Model,
        media_payload: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<Model, sea_orm::DbErr> {
        let payload = merge_payload(record.insight_payload.clone(), "media", media_payload);

        let mut active: story_verification::ActiveModel = record.into();
        active.status = Set(status::VERIFIED.to_string());
        active.verified_at = Set(Some(now));
        active.insight_payload = Set(Some(payload));
        active.last_error = Set(None);
        active.claimed_at = Set(None);
        active.updated_at = Set(now);

        active.update(self.db.as_ref()).await
    }

    /// Record an unsuccessful lookup: bump the counter, schedule the next
    /// attempt or fail terminally once the bound is reached.
    pub async fn record_failure(
        &self,
        record: Model,
        error: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
        retry_delay_seconds: i64,
    ) -> Result<FailureOutcome, sea_orm::DbErr> {
        let retry_count = record.retry_count + 1;
        let exhausted = retry_count >= max_attempts;

        let mut active: story_verification::ActiveModel = record.into();
        active.retry_count = Set(retry_count);
        active.last_error = Set(Some(error.to_string()));
        active.claimed_at = Set(None);
        active.updated_at = Set(now);

        if exhausted {
            active.status = Set(status::FAILED.to_string());
            active.next_retry_at = Set(None);
        } else {
            active.next_retry_at = Set(Some(now + Duration::seconds(retry_delay_seconds)));
        }

        active.update(self.db.as_ref()).await?;

        Ok(if exhausted {
            FailureOutcome::Failed { retry_count }
        } else {
            FailureOutcome::Retrying { retry_count }
        })
    }

    /// Terminal failure without consuming an attempt, for conditions no
    /// retry can fix (missing business credential).
    pub async fn mark_failed_terminal(
        &self,
        record: Model,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Model, sea_orm::DbErr> {
        let mut active: story_verification::ActiveModel = record.into();
        active.status = Set(status::FAILED.to_string());
        active.last_error = Set(Some(error.to_string()));
        active.next_retry_at = Set(None);
        active.claimed_at = Set(None);
        active.updated_at = Set(now);

        active.update(self.db.as_ref()).await
    }

    /// Record an unexpected processing error on the row without touching
    /// status or retry_count; the record stays eligible for future ticks.
    pub async fn record_error(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sea_orm::DbErr> {
        Entity::update_many()
            .col_expr(
                story_verification::Column::LastError,
                Expr::value(error.to_string()),
            )
            .col_expr(story_verification::Column::ClaimedAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(story_verification::Column::UpdatedAt, Expr::value(now))
            .filter(story_verification::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Merge a webhook-delivered insight payload under its field name and
    /// stamp processed_at.
    pub async fn merge_insight(
        &self,
        record: Model,
        field: &str,
        value: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<Model, sea_orm::DbErr> {
        let payload = merge_payload(record.insight_payload.clone(), field, value);

        let mut active: story_verification::ActiveModel = record.into();
        active.insight_payload = Set(Some(payload));
        active.processed_at = Set(Some(now));
        active.updated_at = Set(now);

        active.update(self.db.as_ref()).await
    }
}

/// Merge `value` under `key` into an existing JSON object payload,
/// starting a fresh object when the payload is absent or non-object.
fn merge_payload(existing: Option<JsonValue>, key: &str, value: JsonValue) -> JsonValue {
    let mut map = match existing {
        Some(JsonValue::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::SubmissionRepository;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use serde_json::json;

    async fn setup() -> (
        tempfile::TempDir,
        StoryVerificationRepository,
        SubmissionRepository,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::connect(format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        Migrator::up(&db, None).await.unwrap();
        let db = Arc::new(db);
        (
            dir,
            StoryVerificationRepository::new(Arc::clone(&db)),
            SubmissionRepository::new(db),
        )
    }

    async fn seed_record(submissions: &SubmissionRepository, story_id: &str) -> Model {
        let (_, verification) = submissions
            .create_with_verification(Uuid::new_v4(), Uuid::new_v4(), "url", story_id)
            .await
            .unwrap();
        verification
    }

    #[tokio::test]
    async fn due_batch_selects_fresh_pending_rows() {
        let (_dir, repo, submissions) = setup().await;
        let record = seed_record(&submissions, "111").await;

        let batch = repo.due_batch(Utc::now(), 3, 50).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, record.id);
    }

    #[tokio::test]
    async fn due_batch_honors_next_retry_at() {
        let (_dir, repo, submissions) = setup().await;
        let record = seed_record(&submissions, "111").await;

        let now = Utc::now();
        let outcome = repo
            .record_failure(record, "story not found", now, 3, 300)
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Retrying { retry_count: 1 });

        // Before the delay elapses the row is excluded.
        let batch = repo.due_batch(now, 3, 50).await.unwrap();
        assert!(batch.is_empty());

        // Once the window passes it comes back.
        let later = now + Duration::seconds(301);
        let batch = repo.due_batch(later, 3, 50).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn retry_count_is_bounded_and_failure_is_terminal() {
        let (_dir, repo, submissions) = setup().await;
        let mut record = seed_record(&submissions, "111").await;

        let now = Utc::now();
        for attempt in 1..=3 {
            let outcome = repo
                .record_failure(record.clone(), "lookup failed", now, 3, 300)
                .await
                .unwrap();
            record = repo.find_by_id(record.id).await.unwrap().unwrap();

            assert_eq!(record.retry_count, attempt);
            if attempt < 3 {
                assert_eq!(
                    outcome,
                    FailureOutcome::Retrying {
                        retry_count: attempt
                    }
                );
                assert_eq!(record.status, status::PENDING);
            } else {
                assert_eq!(
                    outcome,
                    FailureOutcome::Failed {
                        retry_count: attempt
                    }
                );
                assert_eq!(record.status, status::FAILED);
                assert!(record.next_retry_at.is_none());
            }
        }

        // Terminal rows never re-enter the batch, even far in the future.
        let batch = repo
            .due_batch(now + Duration::days(30), 3, 50)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn verified_rows_leave_the_batch() {
        let (_dir, repo, submissions) = setup().await;
        let record = seed_record(&submissions, "111").await;

        let now = Utc::now();
        let verified = repo
            .mark_verified(record, json!({"id": "111", "media_type": "STORY"}), now)
            .await
            .unwrap();

        assert_eq!(verified.status, status::VERIFIED);
        assert!(verified.verified_at.is_some());
        assert_eq!(verified.insight_payload.unwrap()["media"]["id"], "111");

        let batch = repo
            .due_batch(now + Duration::days(30), 3, 50)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_lease_expires() {
        let (_dir, repo, submissions) = setup().await;
        let record = seed_record(&submissions, "111").await;

        let now = Utc::now();
        assert!(repo.claim(record.id, now, 120).await.unwrap());
        // A second run inside the lease window loses.
        assert!(!repo.claim(record.id, now, 120).await.unwrap());
        // After the lease expires the row can be reclaimed.
        let later = now + Duration::seconds(121);
        assert!(repo.claim(record.id, later, 120).await.unwrap());
    }

    #[tokio::test]
    async fn record_error_preserves_status_and_count() {
        let (_dir, repo, submissions) = setup().await;
        let record = seed_record(&submissions, "111").await;

        repo.record_error(record.id, "database hiccup", Utc::now())
            .await
            .unwrap();

        let reloaded = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, status::PENDING);
        assert_eq!(reloaded.retry_count, 0);
        assert_eq!(reloaded.last_error.as_deref(), Some("database hiccup"));
    }

    #[tokio::test]
    async fn merge_insight_accumulates_fields() {
        let (_dir, repo, submissions) = setup().await;
        let record = seed_record(&submissions, "111").await;

        let now = Utc::now();
        let record = repo
            .merge_insight(record, "story_insights", json!({"impressions": 1200}), now)
            .await
            .unwrap();
        let record = repo
            .merge_insight(record, "media", json!({"id": "111"}), now)
            .await
            .unwrap();

        let payload = record.insight_payload.unwrap();
        assert_eq!(payload["story_insights"]["impressions"], 1200);
        assert_eq!(payload["media"]["id"], "111");
        assert!(record.processed_at.is_some());
    }

    #[tokio::test]
    async fn batch_size_limits_the_selection() {
        let (_dir, repo, submissions) = setup().await;
        for i in 0..5 {
            seed_record(&submissions, &format!("story-{}", i)).await;
        }

        let batch = repo.due_batch(Utc::now(), 3, 2).await.unwrap();
        assert_eq!(batch.len(), 2);
    }
}
