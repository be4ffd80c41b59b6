//! # Notification Repository
//!
//! Thin insert/list wrapper for the notifications the verification worker
//! emits on terminal outcomes.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::notification::{self, Entity, Model};

/// Repository for notification operations
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a notification for a profile.
    pub async fn create(
        &self,
        profile_id: Uuid,
        kind: &str,
        title: &str,
        body: &str,
        data: Option<JsonValue>,
    ) -> Result<Model, sea_orm::DbErr> {
        let model = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            profile_id: Set(profile_id),
            kind: Set(kind.to_string()),
            title: Set(title.to_string()),
            body: Set(body.to_string()),
            data: Set(data),
            read: Set(false),
            created_at: Set(Utc::now()),
        };

        model.insert(self.db.as_ref()).await
    }

    /// All notifications for a profile, newest first.
    pub async fn list_by_profile(&self, profile_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(notification::Column::ProfileId.eq(profile_id))
            .order_by_desc(notification::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::kind;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use serde_json::json;

    #[tokio::test]
    async fn create_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::connect(format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        Migrator::up(&db, None).await.unwrap();
        let repo = NotificationRepository::new(Arc::new(db));

        let profile_id = Uuid::new_v4();
        repo.create(
            profile_id,
            kind::STORY_VERIFIED,
            "Story verified",
            "Your story for the campaign was verified.",
            Some(json!({"story_id": "111"})),
        )
        .await
        .unwrap();

        let listed = repo.list_by_profile(profile_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, kind::STORY_VERIFIED);
        assert!(!listed[0].read);

        assert!(repo.list_by_profile(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
