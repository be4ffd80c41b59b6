//! # Data Models
//!
//! SeaORM entities for the StoryProof service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod business;
pub mod campaign;
pub mod collaboration;
pub mod notification;
pub mod oauth_state;
pub mod profile;
pub mod story_verification;
pub mod submission;

pub use business::Entity as Business;
pub use campaign::Entity as Campaign;
pub use collaboration::Entity as Collaboration;
pub use notification::Entity as Notification;
pub use oauth_state::Entity as OAuthState;
pub use profile::Entity as Profile;
pub use story_verification::Entity as StoryVerification;
pub use submission::Entity as Submission;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "storyproof".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
