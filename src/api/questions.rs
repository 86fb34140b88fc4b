use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::params::{query_or_bad_request, DeleteParams};
use super::Operation;
use crate::error::{ApiError, ErrorBody};
use crate::AppState;

const SUCCESS: &str = "success";

/// Body of a create or update request. Fields beyond the listed ones are
/// stored as given.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QuestionInput {
    /// Question text. Required on create.
    pub question: String,
    /// Question type, e.g. `multiple-choice`. Required on create.
    #[serde(rename = "type")]
    pub kind: String,
    /// Subject title, or an exam reference like `Examen 3: Gevaarherkenning`.
    /// Required on create.
    pub parent: String,
    /// Question id. Required on update, ignored on create.
    pub id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCreated {
    pub status: String,
    pub message: String,
    pub question_id: String,
    /// The stored document including `id`, `createdAt` and `updatedAt`.
    pub question: Value,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionChanged {
    pub status: String,
    pub message: String,
    pub question_id: String,
}

impl QuestionChanged {
    fn new(message: &str, question_id: String) -> Self {
        Self {
            status: SUCCESS.to_string(),
            message: message.to_string(),
            question_id,
        }
    }
}

/// Create a question and link it to its parent.
///
/// The question is stored before it is linked. If linking fails (unknown
/// subject, unknown exam, malformed exam reference) the error is returned
/// and the stored question stays unlinked.
#[utoipa::path(
    post,
    path = "/api/v1/questions",
    tag = "questions",
    request_body = QuestionInput,
    security(("api_key" = [])),
    responses(
        (status = 201, description = "Question created", body = QuestionCreated),
        (status = 400, description = "Missing fields or malformed parent", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Parent subject or exam not found", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn create_question(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<QuestionCreated>), ApiError> {
    let Ok(Json(body)) = body else {
        return Err(ApiError::BadRequest("Question data is required".into()));
    };

    let created = state
        .bank
        .create_question(body)
        .await
        .map_err(|e| ApiError::from_bank(e, Operation::CreateQuestion))?;

    Ok((
        StatusCode::CREATED,
        Json(QuestionCreated {
            status: SUCCESS.to_string(),
            message: "Question created successfully".to_string(),
            question_id: created.question_id,
            question: created.question,
        }),
    ))
}

/// Merge the given fields into an existing question.
#[utoipa::path(
    put,
    path = "/api/v1/questions",
    tag = "questions",
    request_body = QuestionInput,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Question updated", body = QuestionChanged),
        (status = 400, description = "Missing body or id", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Question not found", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn update_question(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<QuestionChanged>, ApiError> {
    let Ok(Json(body)) = body else {
        return Err(ApiError::BadRequest(
            "Question data and ID are required".into(),
        ));
    };

    let id = state
        .bank
        .update_question(body)
        .await
        .map_err(|e| ApiError::from_bank(e, Operation::UpdateQuestion))?;
    Ok(Json(QuestionChanged::new("Question updated successfully", id)))
}

/// Delete a question. Exams and subjects that reference it are not touched.
#[utoipa::path(
    delete,
    path = "/api/v1/questions",
    tag = "questions",
    params(DeleteParams),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Question deleted", body = QuestionChanged),
        (status = 400, description = "Missing id", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Question not found", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn delete_question(
    State(state): State<AppState>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> Result<Json<QuestionChanged>, ApiError> {
    let params = query_or_bad_request(params)?;
    let id = state
        .bank
        .delete_question(params.id.as_deref())
        .await
        .map_err(|e| ApiError::from_bank(e, Operation::DeleteQuestion))?;
    Ok(Json(QuestionChanged::new("Question deleted successfully", id)))
}
