pub mod exams;
pub mod feedback;
pub mod middleware;
mod operation;
pub mod params;
pub mod questions;
pub mod subjects;

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{self, MethodRouter},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ApiError;
use crate::rate_limit::rate_limit_middleware;
use crate::AppState;

pub use operation::Operation;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    middleware::API_KEY_HEADER,
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Theorio Question Bank API",
        description = "Subjects, exams, questions and feedback for the driving-theory app. Every operation requires an `x-api-key` header and is rate limited per client IP and key. Each operation is also reachable on its legacy `/http-<operation>` path.",
        version = "0.4.0"
    ),
    paths(
        subjects::list_subjects,
        exams::list_exams,
        questions::create_question,
        questions::update_question,
        questions::delete_question,
        feedback::list_feedback,
        feedback::update_feedback_status,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::bank::Pagination,
        crate::bank::SubjectPage,
        crate::bank::SubjectWithQuestions,
        crate::bank::ExamList,
        crate::bank::ExamWithQuestions,
        crate::bank::ExamBucket,
        crate::bank::FeedbackPage,
        crate::bank::FeedbackItem,
        questions::QuestionInput,
        questions::QuestionCreated,
        questions::QuestionChanged,
        feedback::FeedbackStatusInput,
        feedback::FeedbackStatusChanged,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "subjects", description = "Subjects with their questions"),
        (name = "exams", description = "Exams with their three question buckets"),
        (name = "questions", description = "Create, update and delete questions"),
        (name = "feedback", description = "User feedback on questions")
    )
)]
pub struct ApiDoc;

/// Guard one path: key check and rate limit on the matched methods, JSON 405
/// for the rest. The fallback is added after the layers so a wrong method
/// is rejected before the key is looked at.
fn guarded(
    state: &AppState,
    route: MethodRouter<AppState>,
    ops: &[Operation],
) -> MethodRouter<AppState> {
    let allowed = ops
        .iter()
        .map(|op| op.method().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    route
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_middleware,
        ))
        .fallback(move || {
            let allowed = allowed.clone();
            async move { ApiError::MethodNotAllowed { allowed } }
        })
}

/// Build the application router.
pub fn router(state: AppState, body_limit: usize) -> Router {
    use Operation::*;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route(
            ListSubjects.path(),
            guarded(&state, routing::get(subjects::list_subjects), &[ListSubjects]),
        )
        .route(
            ListExams.path(),
            guarded(&state, routing::get(exams::list_exams), &[ListExams]),
        )
        .route(
            CreateQuestion.path(),
            guarded(
                &state,
                routing::post(questions::create_question)
                    .put(questions::update_question)
                    .delete(questions::delete_question),
                &[CreateQuestion, UpdateQuestion, DeleteQuestion],
            ),
        )
        .route(
            ListFeedback.path(),
            guarded(&state, routing::get(feedback::list_feedback), &[ListFeedback]),
        )
        .route(
            UpdateFeedbackStatus.path(),
            guarded(
                &state,
                routing::put(feedback::update_feedback_status),
                &[UpdateFeedbackStatus],
            ),
        );

    // Legacy single-operation paths
    for op in Operation::ALL {
        let route = match op {
            ListSubjects => routing::get(subjects::list_subjects),
            ListExams => routing::get(exams::list_exams),
            CreateQuestion => routing::post(questions::create_question),
            UpdateQuestion => routing::put(questions::update_question),
            DeleteQuestion => routing::delete(questions::delete_question),
            ListFeedback => routing::get(feedback::list_feedback),
            UpdateFeedbackStatus => routing::put(feedback::update_feedback_status),
        };
        app = app.route(&op.legacy_path(), guarded(&state, route, &[op]));
    }

    app.route("/api/openapi.json", routing::get(openapi_spec))
        .fallback(unknown_endpoint)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn unknown_endpoint() -> impl IntoResponse {
    ApiError::NotFound("Unknown endpoint".into())
}

/// Bind and serve until `shutdown` resolves.
pub async fn start_server(
    state: AppState,
    bind: SocketAddr,
    body_limit: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state, body_limit);

    let listener = TcpListener::bind(bind).await?;
    log::info!("Question bank API listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
