//! Story verification entity model
//!
//! Tracks the bounded retry loop the worker drives against the Graph API
//! for one submission, plus insight payloads delivered over webhooks.
//! retry_count only ever grows and is capped by configuration; verified
//! and failed are terminal.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Verification status values.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const VERIFIED: &str = "verified";
    pub const FAILED: &str = "failed";
}

/// Per-submission verification record
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "story_verifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning submission (one-to-one)
    pub submission_id: Uuid,

    /// External story/media id on the provider
    pub story_id: String,

    /// One of the `status` module values
    pub status: String,

    /// Lookup attempts so far; monotonically non-decreasing
    pub retry_count: i32,

    /// Earliest time the worker may attempt the next lookup
    pub next_retry_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Lease stamp taken by a worker run before mutating the row
    pub claimed_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Detail of the most recent failure, for manual reconciliation
    pub last_error: Option<String>,

    /// Provider media payload and webhook-delivered insights
    #[sea_orm(column_type = "JsonBinary")]
    pub insight_payload: Option<JsonValue>,

    /// When a webhook insight was last merged in
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Set exactly once, on the successful lookup
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::submission::Entity",
        from = "Column::SubmissionId",
        to = "super::submission::Column::Id"
    )]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the record has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status == status::VERIFIED || self.status == status::FAILED
    }
}
