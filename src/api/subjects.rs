use axum::extract::{rejection::QueryRejection, Query, State};
use axum::Json;

use super::params::{query_or_bad_request, PageParams};
use super::Operation;
use crate::bank::SubjectPage;
use crate::error::{ApiError, ErrorBody};
use crate::AppState;

/// List subjects with their questions.
///
/// Subjects are ordered by title. Each subject carries its `questionIds` and
/// the question documents they resolve to; ids that no longer resolve are
/// left out of `questions`.
#[utoipa::path(
    get,
    path = "/api/v1/subjects",
    tag = "subjects",
    params(PageParams),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "One page of subjects", body = SubjectPage),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn list_subjects(
    State(state): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<SubjectPage>, ApiError> {
    let params = query_or_bad_request(params)?;
    state
        .bank
        .list_subjects(params.page_request())
        .await
        .map(Json)
        .map_err(|e| ApiError::from_bank(e, Operation::ListSubjects))
}
