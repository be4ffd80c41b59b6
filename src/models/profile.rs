//! Profile entity model
//!
//! A profile is the user aggregate: influencer or business owner. The
//! Instagram connection state lives directly on the row — external ids,
//! the sealed access token, and its expiry.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile entity holding identity plus Instagram connection state
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable display name
    pub display_name: String,

    /// Account type ("influencer" | "business")
    pub account_type: String,

    /// Whether an Instagram business account is currently connected
    pub instagram_connected: bool,

    /// Instagram business account id, set while connected
    pub instagram_user_id: Option<String>,

    /// Instagram username, set while connected
    pub instagram_username: Option<String>,

    /// AES-256-GCM sealed access token; never stored in the clear
    #[serde(skip_serializing)]
    pub instagram_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry; connected implies a future expiry
    pub instagram_token_expires_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
