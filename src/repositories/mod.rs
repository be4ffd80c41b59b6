//! # Repository Layer
//!
//! Repositories encapsulate the SeaORM operations for each entity,
//! keeping handlers and the verification worker free of query details.

pub mod notification;
pub mod oauth_state;
pub mod profile;
pub mod story_verification;
pub mod submission;

pub use notification::NotificationRepository;
pub use oauth_state::OAuthStateRepository;
pub use profile::ProfileRepository;
pub use story_verification::StoryVerificationRepository;
pub use submission::SubmissionRepository;
