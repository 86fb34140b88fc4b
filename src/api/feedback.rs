use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::params::{query_or_bad_request, FeedbackParams};
use super::Operation;
use crate::bank::FeedbackPage;
use crate::error::{ApiError, ErrorBody};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStatusInput {
    pub feedback_id: String,
    /// New status, e.g. `resolved`.
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStatusChanged {
    pub status: String,
    pub message: String,
    pub feedback_id: String,
}

/// List feedback, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/feedback",
    tag = "feedback",
    params(FeedbackParams),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "One page of feedback", body = FeedbackPage),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn list_feedback(
    State(state): State<AppState>,
    params: Result<Query<FeedbackParams>, QueryRejection>,
) -> Result<Json<FeedbackPage>, ApiError> {
    let params = query_or_bad_request(params)?;
    state
        .bank
        .list_feedback(params.page_request(), params.status.as_deref())
        .await
        .map(Json)
        .map_err(|e| ApiError::from_bank(e, Operation::ListFeedback))
}

/// Set the status of a feedback item. Other fields are left alone.
#[utoipa::path(
    put,
    path = "/api/v1/feedback/status",
    tag = "feedback",
    request_body = FeedbackStatusInput,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Status updated", body = FeedbackStatusChanged),
        (status = 400, description = "Missing id or status", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Feedback not found", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn update_feedback_status(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<FeedbackStatusChanged>, ApiError> {
    let Ok(Json(body)) = body else {
        return Err(ApiError::BadRequest(
            "Feedback ID and status are required".into(),
        ));
    };

    let feedback_id = state
        .bank
        .update_feedback_status(body)
        .await
        .map_err(|e| ApiError::from_bank(e, Operation::UpdateFeedbackStatus))?;
    Ok(Json(FeedbackStatusChanged {
        status: "success".to_string(),
        message: "Feedback status updated successfully".to_string(),
        feedback_id,
    }))
}
