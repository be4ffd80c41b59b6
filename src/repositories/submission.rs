//! # Submission Repository
//!
//! Database operations for collaboration submissions. Creating a
//! submission with content always pairs it with its story verification
//! row inside one transaction so the worker never sees a half-created
//! pair.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::story_verification::{self, Model as StoryVerificationModel};
use crate::models::submission::{self, Entity, Model, status};

/// Repository for collaboration submission operations
pub struct SubmissionRepository {
    db: Arc<DatabaseConnection>,
}

impl SubmissionRepository {
    /// Create a new submission repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(self.db.as_ref()).await
    }

    pub async fn find_by_collaboration(
        &self,
        collaboration_id: Uuid,
    ) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(submission::Column::CollaborationId.eq(collaboration_id))
            .all(self.db.as_ref())
            .await
    }

    /// Create a submission already carrying content, in
    /// `pending_verification`, together with its story verification row.
    pub async fn create_with_verification(
        &self,
        collaboration_id: Uuid,
        influencer_id: Uuid,
        content_url: &str,
        story_id: &str,
    ) -> Result<(Model, StoryVerificationModel), sea_orm::DbErr> {
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let submission = submission::ActiveModel {
            id: Set(Uuid::new_v4()),
            collaboration_id: Set(collaboration_id),
            influencer_id: Set(influencer_id),
            content_url: Set(content_url.to_string()),
            status: Set(status::PENDING_VERIFICATION.to_string()),
            verified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let verification = story_verification::ActiveModel {
            id: Set(Uuid::new_v4()),
            submission_id: Set(submission.id),
            story_id: Set(story_id.to_string()),
            status: Set(story_verification::status::PENDING.to_string()),
            retry_count: Set(0),
            next_retry_at: Set(None),
            claimed_at: Set(None),
            last_error: Set(None),
            insight_payload: Set(None),
            processed_at: Set(None),
            verified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok((submission, verification))
    }

    /// Move a submission to a new status, stamping verified_at when the
    /// target is `verified`.
    pub async fn set_status(
        &self,
        submission_id: Uuid,
        new_status: &str,
        at: DateTime<Utc>,
    ) -> Result<Model, sea_orm::DbErr> {
        let existing = Entity::find_by_id(submission_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                sea_orm::DbErr::RecordNotFound(format!(
                    "collaboration_submissions: {}",
                    submission_id
                ))
            })?;

        let mut active: submission::ActiveModel = existing.into();
        active.status = Set(new_status.to_string());
        if new_status == status::VERIFIED {
            active.verified_at = Set(Some(at));
        }
        active.updated_at = Set(at);

        active.update(self.db.as_ref()).await
    }
}
