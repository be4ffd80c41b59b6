//! Notification entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Notification kinds emitted by the verification worker.
pub mod kind {
    pub const STORY_VERIFIED: &str = "story_verified";
    pub const STORY_VERIFICATION_FAILED: &str = "story_verification_failed";
}

/// User-facing notification row
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Recipient profile
    pub profile_id: Uuid,

    /// One of the `kind` module values
    pub kind: String,

    pub title: String,

    pub body: String,

    /// Structured context (submission id, story id, ...)
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Option<JsonValue>,

    pub read: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
