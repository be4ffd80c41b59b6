//! # Submission Handlers
//!
//! Content submission for a collaboration: the influencer claims a posted
//! story, which creates the submission in `pending_verification` together
//! with its story verification row for the worker to pick up.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{OperatorAuth, ProfileExtension, ProfileHeader};
use crate::error::{ApiError, validation_error};
use crate::instagram::extract_story_id;
use crate::models::Collaboration;
use crate::repositories::SubmissionRepository;
use crate::server::AppState;

/// Request body for submitting story content
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubmissionRequest {
    /// URL of the posted story
    pub content_url: String,
}

/// Created submission response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmissionResponse {
    pub id: Uuid,
    pub collaboration_id: Uuid,
    pub status: String,
    pub story_id: String,
}

/// Submit story content for a collaboration
///
/// Creates the submission in `pending_verification` and queues its story
/// verification record in one transaction.
#[utoipa::path(
    post,
    path = "/collaborations/{collaboration_id}/submissions",
    security(("bearer_auth" = [])),
    params(
        ("collaboration_id" = Uuid, Path, description = "Collaboration being fulfilled"),
        ProfileHeader
    ),
    request_body = CreateSubmissionRequest,
    responses(
        (status = 201, description = "Submission created", body = SubmissionResponse),
        (status = 400, description = "Content URL is not a story URL", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Collaboration belongs to another influencer", body = ApiError),
        (status = 404, description = "Collaboration not found", body = ApiError),
        (status = 500, description = "Persistence failure", body = ApiError)
    ),
    tag = "submissions"
)]
pub async fn create_submission(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ProfileExtension(profile): ProfileExtension,
    Path(collaboration_id): Path<Uuid>,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let collaboration = Collaboration::find_by_id(collaboration_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("collaboration '{}' not found", collaboration_id),
            )
        })?;

    if collaboration.influencer_id != profile.0 {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Collaboration belongs to another influencer",
        ));
    }

    let story_id = extract_story_id(&request.content_url).ok_or_else(|| {
        validation_error(
            "Invalid content URL",
            serde_json::json!({
                "content_url": "must be an Instagram story URL or a bare story id"
            }),
        )
    })?;

    let submissions = SubmissionRepository::new(Arc::new(state.db.clone()));
    let (submission, verification) = submissions
        .create_with_verification(collaboration_id, profile.0, &request.content_url, &story_id)
        .await
        .map_err(|err| {
            tracing::error!(
                collaboration_id = %collaboration_id,
                error = ?err,
                "Failed to create submission"
            );
            ApiError::from(err)
        })?;

    tracing::info!(
        submission_id = %submission.id,
        collaboration_id = %collaboration_id,
        story_id = %verification.story_id,
        "Submission created, verification queued"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            id: submission.id,
            collaboration_id: submission.collaboration_id,
            status: submission.status,
            story_id: verification.story_id,
        }),
    ))
}
