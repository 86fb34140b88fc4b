use axum::extract::{rejection::QueryRejection, Query};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::bank::PageRequest;
use crate::error::ApiError;

/// Cursor pagination parameters shared by the list endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Items per page. Defaults to 50, capped at 100.
    pub page_size: Option<String>,
    /// `nextPageToken` of the previous page.
    pub page_token: Option<String>,
}

impl PageParams {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::from_params(self.page_size.as_deref(), self.page_token.as_deref())
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct FeedbackParams {
    pub page_size: Option<String>,
    pub page_token: Option<String>,
    /// Exact status to filter on, e.g. `open`.
    pub status: Option<String>,
}

impl FeedbackParams {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::from_params(self.page_size.as_deref(), self.page_token.as_deref())
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteParams {
    /// Id of the question to delete.
    pub id: Option<String>,
}

/// Unwrap a query extraction, turning malformed query strings into a 400.
pub fn query_or_bad_request<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
