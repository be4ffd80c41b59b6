//! Collaboration submission entity model
//!
//! A submission is an influencer's claim of having posted the agreed
//! story. Status is monotonic: pending → pending_verification →
//! (verified | rejected), and the terminal states never regress.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Submission status values.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const PENDING_VERIFICATION: &str = "pending_verification";
    pub const VERIFIED: &str = "verified";
    pub const REJECTED: &str = "rejected";
}

/// Submitted content for a collaboration, awaiting verification
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "collaboration_submissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub collaboration_id: Uuid,

    pub influencer_id: Uuid,

    /// URL of the claimed story post
    pub content_url: String,

    /// One of the `status` module values
    pub status: String,

    /// Set when the submission reaches verified
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::collaboration::Entity",
        from = "Column::CollaborationId",
        to = "super::collaboration::Column::Id"
    )]
    Collaboration,
}

impl Related<super::collaboration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collaboration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
