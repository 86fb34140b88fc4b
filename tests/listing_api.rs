mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::TestApp;
use theorio_api::store::collections::{EXAMS, FEEDBACK, QUESTIONS, SUBJECTS};
use theorio_api::store::MemoryStore;

fn seeded_subjects(n: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    for i in 0..n {
        store = store.with_document(
            SUBJECTS,
            &format!("subject-{i:02}"),
            json!({"title": format!("Onderwerp {i:02}"), "questionIds": []}),
        );
    }
    store
}

/// Follow `nextPageToken` until `hasMore` is false. Returns every item id
/// and the number of pages fetched.
async fn walk(app: &TestApp, base: &str, items: &str, page_size: usize) -> (Vec<String>, usize) {
    let mut ids = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let uri = match &token {
            Some(t) => format!("{base}pageSize={page_size}&pageToken={t}"),
            None => format!("{base}pageSize={page_size}"),
        };
        let resp = app.get(&uri).await;
        assert_eq!(resp.status, StatusCode::OK);
        pages += 1;

        for item in resp.body[items].as_array().unwrap() {
            ids.push(item["id"].as_str().unwrap().to_string());
        }
        let pagination = &resp.body["pagination"];
        assert_eq!(pagination["pageSize"], page_size);
        if !pagination["hasMore"].as_bool().unwrap() {
            break;
        }
        token = pagination["nextPageToken"].as_str().map(str::to_string);
        assert!(token.is_some());
        assert!(pages < 50, "pagination does not terminate");
    }
    (ids, pages)
}

#[tokio::test]
async fn subject_pages_cover_every_subject_once_in_order() {
    for (n, k) in [(7, 3), (6, 3), (2, 5)] {
        let app = TestApp::new(seeded_subjects(n));
        let (ids, _) = walk(&app, "/api/v1/subjects?", "subjects", k).await;
        let expected: Vec<String> = (0..n).map(|i| format!("subject-{i:02}")).collect();
        assert_eq!(ids, expected, "n={n} k={k}");
    }
}

#[tokio::test]
async fn subject_page_size_is_clamped() {
    let app = TestApp::new(seeded_subjects(1));

    let resp = app.get("/api/v1/subjects?pageSize=500").await;
    assert_eq!(resp.body["pagination"]["pageSize"], 100);

    let resp = app.get("/api/v1/subjects?pageSize=nope").await;
    assert_eq!(resp.body["pagination"]["pageSize"], 50);
    assert_eq!(resp.body["pagination"]["hasMore"], false);
    assert_eq!(resp.body["pagination"]["nextPageToken"], "subject-00");
}

#[tokio::test]
async fn subjects_inline_their_questions() {
    let app = TestApp::new(
        MemoryStore::new()
            .with_document(SUBJECTS, "s1", json!({"title": "Voorrang", "questionIds": ["q2", "q1"]}))
            .with_document(QUESTIONS, "q1", json!({"question": "Een"}))
            .with_document(QUESTIONS, "q2", json!({"question": "Twee"})),
    );

    let resp = app.get("/http-getAllSubjects").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body["subjects"],
        json!([{
            "id": "s1",
            "title": "Voorrang",
            "questionIds": ["q2", "q1"],
            "questions": [
                {"id": "q2", "question": "Twee"},
                {"id": "q1", "question": "Een"}
            ]
        }])
    );
    assert_eq!(resp.body["pagination"]["nextPageToken"], "s1");
}

#[tokio::test]
async fn empty_subject_collection() {
    let app = TestApp::new(MemoryStore::new());
    let resp = app.get("/api/v1/subjects").await;
    assert_eq!(
        resp.body,
        json!({"subjects": [], "pagination": {"nextPageToken": null, "pageSize": 50, "hasMore": false}})
    );
}

#[tokio::test]
async fn listing_exams_is_idempotent() {
    let app = TestApp::new(
        MemoryStore::new()
            .with_document(EXAMS, "1", json!({"gevaarherkenning": ["q1"], "inzicht": ["q2", ""], "kennis": ["q3"]}))
            .with_document(EXAMS, "2", json!({"kennis": ["q1", "missing"]}))
            .with_document(QUESTIONS, "q1", json!({"question": "Een"}))
            .with_document(QUESTIONS, "q2", json!({"question": "Twee"}))
            .with_document(QUESTIONS, "q3", json!({"question": "Drie"})),
    );

    let first = app.get("/api/v1/exams").await;
    let second = app.get("/http-getAllExams").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, second.body);

    let exams = first.body["exams"].as_array().unwrap();
    assert_eq!(exams.len(), 2);
    assert_eq!(exams[0]["id"], "1");
    assert_eq!(exams[0]["inzicht"]["questionIds"], json!(["q2"]));
    assert_eq!(exams[1]["gevaarherkenning"], json!({"questionIds": [], "questions": []}));
    assert_eq!(exams[1]["kennis"]["questions"], json!([{"id": "q1", "question": "Een"}]));
}

fn seeded_feedback() -> MemoryStore {
    MemoryStore::new()
        .with_document(
            FEEDBACK,
            "f1",
            json!({
                "subject": "Voorrang",
                "feedback": "Antwoord klopt niet",
                "date": "2024-05-01T10:00:00Z",
                "status": "open",
                "questionId": "q1",
                "userId": "u1",
                "device": "ios"
            }),
        )
        .with_document(FEEDBACK, "f2", json!({"date": "2024-05-02T10:00:00Z", "status": "resolved"}))
        .with_document(FEEDBACK, "f3", json!({"date": "2024-05-03T10:00:00Z", "status": "open"}))
        .with_document(FEEDBACK, "f4", json!({"date": "2024-05-04T10:00:00Z", "status": "open"}))
}

#[tokio::test]
async fn feedback_is_newest_first_and_projected() {
    let app = TestApp::new(seeded_feedback());

    let resp = app.get("/api/v1/feedback").await;
    let ids: Vec<&str> = resp.body["feedback"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["f4", "f3", "f2", "f1"]);

    assert_eq!(
        resp.body["feedback"][3],
        json!({
            "id": "f1",
            "subject": "Voorrang",
            "feedback": "Antwoord klopt niet",
            "date": "2024-05-01T10:00:00Z",
            "status": "open",
            "questionId": "q1",
            "userId": "u1"
        })
    );
}

#[tokio::test]
async fn feedback_status_filter_applies_before_pagination() {
    let app = TestApp::new(seeded_feedback());
    let (ids, pages) = walk(&app, "/api/v1/feedback?status=open&", "feedback", 2).await;
    assert_eq!(ids, vec!["f4", "f3", "f1"]);
    assert_eq!(pages, 2);
}

#[tokio::test]
async fn feedback_status_update_changes_only_status() {
    let app = TestApp::new(seeded_feedback());
    let before = app.store.document(FEEDBACK, "f1").unwrap();

    let resp = app
        .send_json(
            Method::PUT,
            "/api/v1/feedback/status",
            json!({"feedbackId": "f1", "status": "resolved", "feedback": "overschreven?"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body,
        json!({"status": "success", "message": "Feedback status updated successfully", "feedbackId": "f1"})
    );

    let mut after = app.store.document(FEEDBACK, "f1").unwrap();
    assert_eq!(after.data["status"], "resolved");
    assert!(after.data.remove("updatedAt").is_some_and(|v| v.is_string()));

    let strip = |mut data: serde_json::Map<String, Value>| {
        data.remove("status");
        data
    };
    assert_eq!(strip(after.data), strip(before.data));
}

#[tokio::test]
async fn feedback_status_update_errors() {
    let app = TestApp::new(seeded_feedback());

    let resp = app
        .send_json(Method::PUT, "/http-updateFeedbackStatus", json!({"feedbackId": "f1"}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["message"], "Feedback ID and status are required");

    let resp = app
        .send_json(
            Method::PUT,
            "/api/v1/feedback/status",
            json!({"feedbackId": "missing", "status": "resolved"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["message"], "Feedback not found");
}
