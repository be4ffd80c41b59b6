//! # Story Verification Worker
//!
//! Background service that re-checks pending story submissions against
//! the Graph API on a fixed schedule. Each tick selects the due batch,
//! takes a per-record lease, resolves the business credential through the
//! ownership chain, performs the lookup, and applies the bounded retry
//! policy. One record's failure never aborts the batch.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::error::ApiError;
use crate::instagram::InstagramClient;
use crate::models::notification::kind as notification_kind;
use crate::models::story_verification::Model as StoryVerificationModel;
use crate::models::submission::{Model as SubmissionModel, status as submission_status};
use crate::models::{Business, Campaign, Collaboration, Submission};
use crate::repositories::story_verification::FailureOutcome;
use crate::repositories::{
    NotificationRepository, OAuthStateRepository, ProfileRepository, StoryVerificationRepository,
    SubmissionRepository,
};

/// Background story verification service
pub struct VerificationService {
    config: Arc<AppConfig>,
    db: Arc<DatabaseConnection>,
    instagram: Arc<InstagramClient>,
    crypto_key: CryptoKey,
}

/// Per-tick processing counters, logged and exported as metrics.
#[derive(Debug, Default)]
pub struct TickStats {
    pub records_polled: u64,
    pub claims_lost: u64,
    pub verified: u64,
    pub retries_scheduled: u64,
    pub failed: u64,
    pub errors: u64,
}

/// Outcome of processing one claimed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Verified,
    Retrying,
    Failed,
}

impl VerificationService {
    /// Create a new verification service instance
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        instagram: Arc<InstagramClient>,
        crypto_key: CryptoKey,
    ) -> Self {
        Self {
            config,
            db,
            instagram,
            crypto_key,
        }
    }

    /// Run the verification loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ApiError> {
        info!("Starting story verification service");
        let tick_interval = TokioDuration::from_secs(self.config.verification.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Story verification service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Verification tick failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("story_verification_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Story verification service stopped");
        Ok(())
    }

    /// Execute one tick: sweep dead state tokens, then work the due batch.
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<TickStats, ApiError> {
        let now = Utc::now();
        let mut stats = TickStats::default();

        // Housekeeping: expired connect-flow state tokens are dead weight.
        let state_repo = OAuthStateRepository::new(Arc::clone(&self.db));
        match state_repo.cleanup_expired().await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Swept expired OAuth state tokens"),
            Err(err) => warn!(error = ?err, "OAuth state sweep failed"),
        }

        let verifications = StoryVerificationRepository::new(Arc::clone(&self.db));
        let batch = verifications
            .due_batch(
                now,
                self.config.verification.max_attempts,
                self.config.verification.batch_size,
            )
            .await?;

        stats.records_polled = batch.len() as u64;
        gauge!("story_verification_batch_gauge").set(stats.records_polled as f64);

        info!(
            records = batch.len(),
            max_attempts = self.config.verification.max_attempts,
            "Verification batch selected"
        );

        for record in batch {
            let record_id = record.id;

            // Lease the row; an overlapping run that got there first wins.
            match verifications
                .claim(record_id, now, self.config.verification.lease_seconds)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(record_id = %record_id, "Record already claimed, skipping");
                    stats.claims_lost += 1;
                    continue;
                }
                Err(err) => {
                    error!(record_id = %record_id, error = ?err, "Claim failed");
                    stats.errors += 1;
                    continue;
                }
            }

            counter!("story_verification_attempts_total").increment(1);

            match self.process_record(&verifications, record, now).await {
                Ok(RecordOutcome::Verified) => {
                    stats.verified += 1;
                    counter!("story_verification_verified_total").increment(1);
                }
                Ok(RecordOutcome::Retrying) => {
                    stats.retries_scheduled += 1;
                    counter!("story_verification_retries_total").increment(1);
                }
                Ok(RecordOutcome::Failed) => {
                    stats.failed += 1;
                    counter!("story_verification_failed_total").increment(1);
                }
                Err(err) => {
                    // Unexpected error: record it without touching status or
                    // retry_count and keep going with the next record.
                    stats.errors += 1;
                    counter!("story_verification_errors_total").increment(1);
                    error!(record_id = %record_id, error = %err, "Record processing failed");
                    if let Err(persist_err) =
                        verifications.record_error(record_id, &err, now).await
                    {
                        error!(
                            record_id = %record_id,
                            error = ?persist_err,
                            "Failed to persist processing error"
                        );
                    }
                }
            }
        }

        debug!(
            records_polled = stats.records_polled,
            claims_lost = stats.claims_lost,
            verified = stats.verified,
            retries_scheduled = stats.retries_scheduled,
            failed = stats.failed,
            errors = stats.errors,
            "Verification tick completed"
        );

        Ok(stats)
    }

    /// Process one claimed record through credential resolution, provider
    /// lookup, and the retry policy. Returns Err only for unexpected
    /// conditions that should not consume an attempt.
    #[instrument(skip_all, fields(record_id = %record.id, story_id = %record.story_id))]
    async fn process_record(
        &self,
        verifications: &StoryVerificationRepository,
        record: StoryVerificationModel,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, String> {
        let submission = Submission::find_by_id(record.submission_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| format!("submission lookup failed: {}", e))?
            .ok_or_else(|| format!("submission {} missing", record.submission_id))?;

        // Resolve the credential through the ownership chain. No amount of
        // retrying conjures a missing credential, so failures here are
        // terminal for the record.
        let access_token = match self.resolve_business_token(&submission).await {
            Ok(token) => token,
            Err(reason) => {
                warn!(reason = %reason, "Terminal credential failure");
                verifications
                    .mark_failed_terminal(record, &reason, now)
                    .await
                    .map_err(|e| format!("terminal update failed: {}", e))?;
                self.finish_submission(&submission, false, now).await;
                return Ok(RecordOutcome::Failed);
            }
        };

        match self
            .instagram
            .get_story(&record.story_id, &access_token)
            .await
        {
            Ok(media) => {
                let payload = serde_json::to_value(&media)
                    .map_err(|e| format!("media serialization failed: {}", e))?;
                verifications
                    .mark_verified(record, payload, now)
                    .await
                    .map_err(|e| format!("verified update failed: {}", e))?;
                self.finish_submission(&submission, true, now).await;
                Ok(RecordOutcome::Verified)
            }
            Err(err) => {
                let detail = err.to_string();
                let outcome = verifications
                    .record_failure(
                        record,
                        &detail,
                        now,
                        self.config.verification.max_attempts,
                        self.config.verification.retry_delay_seconds,
                    )
                    .await
                    .map_err(|e| format!("failure update failed: {}", e))?;

                match outcome {
                    FailureOutcome::Retrying { retry_count } => {
                        debug!(retry_count, "Lookup failed, retry scheduled");
                        Ok(RecordOutcome::Retrying)
                    }
                    FailureOutcome::Failed { retry_count } => {
                        warn!(retry_count, "Retry budget exhausted");
                        self.finish_submission(&submission, false, now).await;
                        Ok(RecordOutcome::Failed)
                    }
                }
            }
        }
    }

    /// Walk submission → collaboration → campaign → business → owning
    /// profile and open the stored access token.
    async fn resolve_business_token(&self, submission: &SubmissionModel) -> Result<String, String> {
        let collaboration = Collaboration::find_by_id(submission.collaboration_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| format!("collaboration lookup failed: {}", e))?
            .ok_or_else(|| format!("collaboration {} missing", submission.collaboration_id))?;

        let campaign = Campaign::find_by_id(collaboration.campaign_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| format!("campaign lookup failed: {}", e))?
            .ok_or_else(|| format!("campaign {} missing", collaboration.campaign_id))?;

        let business = Business::find_by_id(campaign.business_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| format!("business lookup failed: {}", e))?
            .ok_or_else(|| format!("business {} missing", campaign.business_id))?;

        let profiles = ProfileRepository::new(Arc::clone(&self.db), self.crypto_key.clone());
        let owner = profiles
            .find_by_id(business.owner_profile_id)
            .await
            .map_err(|e| format!("profile lookup failed: {}", e))?
            .ok_or_else(|| format!("profile {} missing", business.owner_profile_id))?;

        let token = profiles
            .access_token(&owner)
            .map_err(|e| format!("token unseal failed: {}", e))?;

        token.ok_or_else(|| {
            format!(
                "business profile {} has no valid Instagram credential",
                owner.id
            )
        })
    }

    /// Transition the submission to its terminal status and notify the
    /// submitting influencer. Notification or status failures are logged,
    /// not fatal — the verification row already carries the outcome.
    async fn finish_submission(&self, submission: &SubmissionModel, verified: bool, now: DateTime<Utc>) {
        let submissions = SubmissionRepository::new(Arc::clone(&self.db));
        let notifications = NotificationRepository::new(Arc::clone(&self.db));

        let new_status = if verified {
            submission_status::VERIFIED
        } else {
            submission_status::REJECTED
        };

        if let Err(err) = submissions.set_status(submission.id, new_status, now).await {
            error!(
                submission_id = %submission.id,
                error = ?err,
                "Failed to update submission status"
            );
        }

        let (kind, title, body) = if verified {
            (
                notification_kind::STORY_VERIFIED,
                "Story verified",
                "Your story submission has been verified.",
            )
        } else {
            (
                notification_kind::STORY_VERIFICATION_FAILED,
                "Story verification failed",
                "We couldn't verify your story submission. Please check the post and submit again.",
            )
        };

        if let Err(err) = notifications
            .create(
                submission.influencer_id,
                kind,
                title,
                body,
                Some(json!({ "submission_id": submission.id })),
            )
            .await
        {
            error!(
                submission_id = %submission.id,
                error = ?err,
                "Failed to create notification"
            );
        }
    }
}
