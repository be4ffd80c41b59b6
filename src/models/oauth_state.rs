//! OAuth state entity model
//!
//! Single-use CSRF state tokens binding an Instagram connect round-trip
//! to the initiating profile. A token authorizes exactly one callback:
//! consumption flips the flag atomically and replays fail.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth state entity for connect-flow CSRF protection
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Opaque random token carried through the provider redirect
    pub token: String,

    /// Profile that initiated the connect flow
    pub profile_id: Uuid,

    /// In-app path to resume after the callback completes
    pub redirect_path: String,

    /// Set once the callback has validated this token
    pub consumed: bool,

    /// Tokens older than this are rejected even if unconsumed
    pub expires_at: chrono::DateTime<chrono::Utc>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// What a consumed state token resolves to: the identity and resume path
/// bound at issue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumedState {
    pub profile_id: Uuid,
    pub redirect_path: String,
}

impl From<Model> for ConsumedState {
    fn from(model: Model) -> Self {
        Self {
            profile_id: model.profile_id,
            redirect_path: model.redirect_path,
        }
    }
}
