use axum::extract::State;
use axum::Json;

use super::Operation;
use crate::bank::ExamList;
use crate::error::{ApiError, ErrorBody};
use crate::AppState;

/// List every exam with its three question buckets resolved.
#[utoipa::path(
    get,
    path = "/api/v1/exams",
    tag = "exams",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "All exams", body = ExamList),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn list_exams(State(state): State<AppState>) -> Result<Json<ExamList>, ApiError> {
    state
        .bank
        .list_exams()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_bank(e, Operation::ListExams))
}
