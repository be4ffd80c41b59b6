//! Integration tests for the story verification worker: the bounded
//! retry policy, terminal-state stability, per-record isolation, and
//! notification emission, against a mocked Graph API.

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storyproof::config::AppConfig;
use storyproof::instagram::InstagramClient;
use storyproof::models::story_verification;
use storyproof::models::{Notification, StoryVerification, Submission};
use storyproof::verification::VerificationService;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{ChainIds, connect_owner, crypto_key, seed_chain, seed_submission, setup_test_db};

fn worker_config(graph_uri: &str) -> AppConfig {
    let mut config = test_utils::test_config();
    config.instagram_graph_base = graph_uri.to_string();
    config
}

fn build_worker(config: AppConfig, db: &DatabaseConnection) -> VerificationService {
    let instagram = Arc::new(InstagramClient::from_config(&config));
    VerificationService::new(
        Arc::new(config),
        Arc::new(db.clone()),
        instagram,
        crypto_key(),
    )
}

/// Pull a record's next_retry_at into the past so the next tick sees it.
async fn rewind_retry(db: &DatabaseConnection, id: Uuid) {
    StoryVerification::update_many()
        .col_expr(
            story_verification::Column::NextRetryAt,
            Expr::value(Utc::now() - Duration::seconds(1)),
        )
        .filter(story_verification::Column::Id.eq(id))
        .exec(db)
        .await
        .unwrap();
}

async fn mock_story_found(server: &MockServer, story_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", story_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": story_id,
            "media_type": "STORY",
            "media_url": "https://cdn.example.com/story.jpg",
            "timestamp": "2025-06-10T12:00:00+0000"
        })))
        .mount(server)
        .await;
}

async fn mock_story_missing(server: &MockServer, story_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", story_id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "Unsupported get request.", "code": 100 }
        })))
        .mount(server)
        .await;
}

async fn seed_connected_chain(db: &DatabaseConnection) -> ChainIds {
    let chain = seed_chain(db).await;
    connect_owner(db, chain.owner_profile_id, "business-access-token").await;
    chain
}

#[tokio::test]
async fn successful_lookup_verifies_record_and_notifies() {
    let graph = MockServer::start().await;
    mock_story_found(&graph, "18000000000000010").await;

    let (_dir, db) = setup_test_db().await;
    let chain = seed_connected_chain(&db).await;
    let (submission, verification) = seed_submission(&db, &chain, "18000000000000010").await;

    let worker = build_worker(worker_config(&graph.uri()), &db);
    let stats = worker.tick().await.unwrap();

    assert_eq!(stats.records_polled, 1);
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.failed, 0);

    let record = StoryVerification::find_by_id(verification.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "verified");
    assert!(record.verified_at.is_some());
    assert_eq!(record.retry_count, 0);
    assert_eq!(
        record.insight_payload.unwrap()["media"]["media_type"],
        "STORY"
    );

    let updated_submission = Submission::find_by_id(submission.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated_submission.status, "verified");
    assert!(updated_submission.verified_at.is_some());

    let notifications = Notification::find().all(&db).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, "story_verified");
    assert_eq!(notifications[0].profile_id, chain.influencer_id);
}

#[tokio::test]
async fn failed_lookups_respect_the_retry_bound() {
    let graph = MockServer::start().await;
    mock_story_missing(&graph, "18000000000000011").await;

    let (_dir, db) = setup_test_db().await;
    let chain = seed_connected_chain(&db).await;
    let (submission, verification) = seed_submission(&db, &chain, "18000000000000011").await;

    let worker = build_worker(worker_config(&graph.uri()), &db);

    // Attempts 1 and 2 schedule retries.
    for expected_count in 1..=2 {
        let stats = worker.tick().await.unwrap();
        assert_eq!(stats.retries_scheduled, 1);

        let record = StoryVerification::find_by_id(verification.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, "pending");
        assert_eq!(record.retry_count, expected_count);
        assert!(record.next_retry_at.unwrap() > Utc::now());
        assert!(record.last_error.is_some());

        // Until the backoff window elapses the record is not due.
        let idle = worker.tick().await.unwrap();
        assert_eq!(idle.records_polled, 0);

        rewind_retry(&db, verification.id).await;
    }

    // Attempt 3 exhausts the budget: terminal failure plus notification.
    let stats = worker.tick().await.unwrap();
    assert_eq!(stats.failed, 1);

    let record = StoryVerification::find_by_id(verification.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "failed");
    assert_eq!(record.retry_count, 3);
    assert!(record.next_retry_at.is_none());

    let updated_submission = Submission::find_by_id(submission.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated_submission.status, "rejected");

    let notifications = Notification::find().all(&db).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, "story_verification_failed");

    // Terminal stability: another tick changes nothing.
    let stats = worker.tick().await.unwrap();
    assert_eq!(stats.records_polled, 0);

    let after = StoryVerification::find_by_id(verification.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.retry_count, 3);
    assert_eq!(after.status, "failed");
    assert_eq!(after.updated_at, record.updated_at);
}

#[tokio::test]
async fn one_record_failure_does_not_block_siblings() {
    let graph = MockServer::start().await;
    mock_story_missing(&graph, "18000000000000012").await;
    mock_story_found(&graph, "18000000000000013").await;

    let (_dir, db) = setup_test_db().await;
    let chain = seed_connected_chain(&db).await;
    let (_, failing) = seed_submission(&db, &chain, "18000000000000012").await;
    let (_, succeeding) = seed_submission(&db, &chain, "18000000000000013").await;

    let worker = build_worker(worker_config(&graph.uri()), &db);
    let stats = worker.tick().await.unwrap();

    assert_eq!(stats.records_polled, 2);
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.retries_scheduled, 1);

    let failing = StoryVerification::find_by_id(failing.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failing.status, "pending");
    assert_eq!(failing.retry_count, 1);

    let succeeding = StoryVerification::find_by_id(succeeding.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(succeeding.status, "verified");
}

#[tokio::test]
async fn missing_business_credential_is_terminal_without_retries() {
    let graph = MockServer::start().await;

    let (_dir, db) = setup_test_db().await;
    // Chain seeded but the owner never connected Instagram.
    let chain = seed_chain(&db).await;
    let (submission, verification) = seed_submission(&db, &chain, "18000000000000014").await;

    let worker = build_worker(worker_config(&graph.uri()), &db);
    let stats = worker.tick().await.unwrap();

    assert_eq!(stats.failed, 1);

    let record = StoryVerification::find_by_id(verification.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "failed");
    // No provider attempt was consumed; the credential can't appear by retrying.
    assert_eq!(record.retry_count, 0);
    assert!(record.last_error.unwrap().contains("credential"));

    let updated_submission = Submission::find_by_id(submission.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated_submission.status, "rejected");

    let notifications = Notification::find().all(&db).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, "story_verification_failed");
}

#[tokio::test]
async fn expired_business_credential_is_terminal() {
    let graph = MockServer::start().await;

    let (_dir, db) = setup_test_db().await;
    let chain = seed_chain(&db).await;

    // Connect the owner, then let the token expire.
    let profiles = storyproof::repositories::ProfileRepository::new(
        Arc::new(db.clone()),
        crypto_key(),
    );
    profiles
        .mark_connected(
            chain.owner_profile_id,
            &test_utils::test_business_account(),
            "stale-token",
            Utc::now() - Duration::minutes(5),
        )
        .await
        .unwrap();

    let (_, verification) = seed_submission(&db, &chain, "18000000000000015").await;

    let worker = build_worker(worker_config(&graph.uri()), &db);
    let stats = worker.tick().await.unwrap();

    assert_eq!(stats.failed, 1);
    let record = StoryVerification::find_by_id(verification.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "failed");
    assert_eq!(record.retry_count, 0);
}

#[tokio::test]
async fn tick_sweeps_expired_oauth_states() {
    let graph = MockServer::start().await;

    let (_dir, db) = setup_test_db().await;
    let chain = seed_chain(&db).await;

    let state_repo =
        storyproof::repositories::OAuthStateRepository::new(Arc::new(db.clone()));
    state_repo
        .issue(chain.influencer_id, "/influencer", -10)
        .await
        .unwrap();
    let live = state_repo
        .issue(chain.influencer_id, "/influencer", 15)
        .await
        .unwrap();

    let worker = build_worker(worker_config(&graph.uri()), &db);
    worker.tick().await.unwrap();

    let remaining = storyproof::models::OAuthState::find().all(&db).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, live.id);
}
