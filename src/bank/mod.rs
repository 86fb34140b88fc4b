//! The question bank: reads and writes over subjects, exams, questions and
//! feedback.
//!
//! Request-shape validation happens here, before any store round-trip, so a
//! malformed request never touches the database. Handlers translate
//! [`BankError`] into HTTP responses.

pub mod parent;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures_util::future::{join_all, try_join_all};
use serde_json::{Map, Value};

use crate::store::collections::{EXAMS, FEEDBACK, QUESTIONS, SUBJECTS};
use crate::store::{Direction, Document, DocumentStore, Query, StoreError};

pub use parent::{parse_parent, ExamCategory, Parent, ParentError};
pub use types::{
    CreatedQuestion, ExamBucket, ExamList, ExamWithQuestions, FeedbackItem, FeedbackPage,
    PageRequest, Pagination, SubjectPage, SubjectWithQuestions,
};

/// Questions inlined per subject.
const MAX_SUBJECT_QUESTIONS: usize = 1000;
/// Ids per "id in set" lookup.
const ID_CHUNK_SIZE: usize = 30;
/// Concurrent point reads per exam bucket.
const EXAM_BATCH_SIZE: usize = 10;

const REQUIRED_QUESTION_FIELDS: [&str; 3] = ["question", "type", "parent"];

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ParentError> for BankError {
    fn from(err: ParentError) -> Self {
        BankError::BadRequest(err.to_string())
    }
}

pub type BankResult<T> = Result<T, BankError>;

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Non-empty string field, or `None`.
fn non_empty_str<'a>(data: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// String entries of an array field, in order. Other entries are skipped.
fn string_ids(doc: &Document, field: &str) -> Vec<String> {
    doc.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub struct QuestionBank {
    store: Arc<dyn DocumentStore>,
}

impl QuestionBank {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Run one page of `query`. The page token names the last document of
    /// the previous page; a token naming a missing document is ignored.
    async fn page(
        &self,
        collection: &str,
        query: Query,
        page: &PageRequest,
    ) -> BankResult<Vec<Document>> {
        let cursor = match page.page_token.as_deref() {
            Some(token) => {
                let cursor = self.store.get(collection, token).await?;
                if cursor.is_none() {
                    log::debug!("Page token {} not found in {}, starting over", token, collection);
                }
                cursor
            }
            None => None,
        };
        let query = query.start_after(cursor).limit(page.page_size);
        Ok(self.store.query(collection, &query).await?)
    }

    // -- Subjects -----------------------------------------------------------

    /// One page of subjects ordered by title, each with its questions.
    pub async fn list_subjects(&self, page: PageRequest) -> BankResult<SubjectPage> {
        let query = Query::new().order_by("title", Direction::Ascending);
        let docs = self.page(SUBJECTS, query, &page).await?;
        let pagination = Pagination::for_page(&docs, page.page_size);

        let mut subjects = Vec::with_capacity(docs.len());
        for doc in docs {
            subjects.push(self.subject_with_questions(doc).await?);
        }

        Ok(SubjectPage {
            subjects,
            pagination,
        })
    }

    async fn subject_with_questions(&self, doc: Document) -> BankResult<SubjectWithQuestions> {
        let mut question_ids = string_ids(&doc, "questionIds");
        question_ids.truncate(MAX_SUBJECT_QUESTIONS);

        // Each question once, even when listed twice
        let mut seen = HashSet::new();
        let lookup: Vec<String> = question_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let chunks = try_join_all(
            lookup
                .chunks(ID_CHUNK_SIZE)
                .map(|chunk| self.store.get_many(QUESTIONS, chunk)),
        )
        .await?;
        let questions = chunks
            .into_iter()
            .flatten()
            .map(Document::into_json)
            .collect();

        Ok(SubjectWithQuestions {
            title: doc.get("title").cloned().unwrap_or(Value::Null),
            id: doc.id,
            question_ids,
            questions,
        })
    }

    // -- Exams --------------------------------------------------------------

    /// Every exam with its three buckets resolved.
    pub async fn list_exams(&self) -> BankResult<ExamList> {
        let docs = self.store.list(EXAMS).await?;
        let mut exams = Vec::with_capacity(docs.len());
        for doc in docs {
            exams.push(ExamWithQuestions {
                gevaarherkenning: self.exam_bucket(&doc, ExamCategory::Gevaarherkenning).await,
                inzicht: self.exam_bucket(&doc, ExamCategory::Inzicht).await,
                kennis: self.exam_bucket(&doc, ExamCategory::Kennis).await,
                id: doc.id,
            });
        }
        Ok(ExamList { exams })
    }

    /// Resolve one bucket in batches of concurrent point reads. Missing
    /// questions and failed reads are logged and left out.
    async fn exam_bucket(&self, exam: &Document, category: ExamCategory) -> ExamBucket {
        let question_ids = string_ids(exam, category.field());
        let mut questions = Vec::with_capacity(question_ids.len());

        for batch in question_ids.chunks(EXAM_BATCH_SIZE) {
            let results = join_all(batch.iter().map(|id| async move {
                match self.store.get(QUESTIONS, id).await {
                    Ok(Some(doc)) => Some(doc.into_json()),
                    Ok(None) => {
                        log::warn!(
                            "Question {} referenced by exam {} ({}) not found",
                            id,
                            exam.id,
                            category.field()
                        );
                        None
                    }
                    Err(e) => {
                        log::error!("Failed to fetch question {} for exam {}: {}", id, exam.id, e);
                        None
                    }
                }
            }))
            .await;
            questions.extend(results.into_iter().flatten());
        }

        ExamBucket {
            question_ids,
            questions,
        }
    }

    // -- Questions ----------------------------------------------------------

    /// Persist a new question, then link it to its parent.
    ///
    /// The two writes are not atomic: if linking fails the question stays
    /// stored without a parent reference and the link error is returned.
    pub async fn create_question(&self, body: Value) -> BankResult<CreatedQuestion> {
        let Value::Object(mut data) = body else {
            return Err(BankError::BadRequest("Question data is required".into()));
        };

        let missing: Vec<&str> = REQUIRED_QUESTION_FIELDS
            .into_iter()
            .filter(|field| non_empty_str(&data, field).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(BankError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        let parent = non_empty_str(&data, "parent")
            .unwrap_or_default()
            .to_string();

        let id = self.store.new_id(QUESTIONS);
        let now = timestamp();
        data.insert("id".into(), Value::String(id.clone()));
        data.insert("createdAt".into(), now.clone());
        data.insert("updatedAt".into(), now);

        self.store.set(QUESTIONS, &id, data.clone()).await?;

        if let Err(e) = self.link_to_parent(&id, &parent).await {
            log::warn!("Question {} stored but not linked to '{}': {}", id, parent, e);
            return Err(e);
        }

        log::info!("Created question {} under '{}'", id, parent);
        Ok(CreatedQuestion {
            question_id: id,
            question: Value::Object(data),
        })
    }

    async fn link_to_parent(&self, question_id: &str, parent: &str) -> BankResult<()> {
        let ids = [question_id.to_string()];
        match parse_parent(parent)? {
            Parent::Exam { exam_id, category } => self
                .store
                .array_union(EXAMS, &exam_id, category.field(), &ids)
                .await
                .map_err(|e| match e {
                    StoreError::NotFound { .. } => {
                        BankError::NotFound(format!("Exam '{}' not found", exam_id))
                    }
                    other => other.into(),
                }),
            Parent::Subject(title) => {
                let not_found = || BankError::NotFound(format!("Subject '{}' not found", title));
                let query = Query::new().where_eq("title", title.as_str()).limit(1);
                let subject = self
                    .store
                    .query(SUBJECTS, &query)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(not_found)?;
                self.store
                    .array_union(SUBJECTS, &subject.id, "questionIds", &ids)
                    .await
                    .map_err(|e| match e {
                        StoreError::NotFound { .. } => not_found(),
                        other => other.into(),
                    })
            }
        }
    }

    /// Shallow-merge the body into an existing question. Returns its id.
    pub async fn update_question(&self, body: Value) -> BankResult<String> {
        let invalid = || BankError::BadRequest("Question data and ID are required".into());
        let Value::Object(mut fields) = body else {
            return Err(invalid());
        };
        let id = non_empty_str(&fields, "id").ok_or_else(invalid)?.to_string();
        fields.insert("updatedAt".into(), timestamp());

        self.store
            .update(QUESTIONS, &id, fields)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => BankError::NotFound("Question not found".into()),
                other => other.into(),
            })?;
        Ok(id)
    }

    /// Delete a question by id. Exams and subjects keep their references;
    /// the listings skip ids that no longer resolve.
    pub async fn delete_question(&self, id: Option<&str>) -> BankResult<String> {
        let id = id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BankError::BadRequest("Question ID is required".into()))?;

        if self.store.get(QUESTIONS, id).await?.is_none() {
            return Err(BankError::NotFound("Question not found".into()));
        }
        self.store.delete(QUESTIONS, id).await?;
        log::info!("Deleted question {}", id);
        Ok(id.to_string())
    }

    // -- Feedback -----------------------------------------------------------

    /// One page of feedback, newest first, optionally filtered by status.
    pub async fn list_feedback(
        &self,
        page: PageRequest,
        status: Option<&str>,
    ) -> BankResult<FeedbackPage> {
        let mut query = Query::new();
        if let Some(status) = status.filter(|s| !s.is_empty()) {
            query = query.where_eq("status", status);
        }
        let query = query.order_by("date", Direction::Descending);

        let docs = self.page(FEEDBACK, query, &page).await?;
        let pagination = Pagination::for_page(&docs, page.page_size);
        Ok(FeedbackPage {
            feedback: docs.into_iter().map(FeedbackItem::from).collect(),
            pagination,
        })
    }

    /// Set the status of one feedback item. Returns its id.
    pub async fn update_feedback_status(&self, body: Value) -> BankResult<String> {
        let invalid = || BankError::BadRequest("Feedback ID and status are required".into());
        let Value::Object(data) = body else {
            return Err(invalid());
        };
        let id = non_empty_str(&data, "feedbackId").ok_or_else(invalid)?;
        let status = non_empty_str(&data, "status").ok_or_else(invalid)?;

        let mut fields = Map::new();
        fields.insert("status".into(), Value::String(status.to_string()));
        fields.insert("updatedAt".into(), timestamp());

        self.store
            .update(FEEDBACK, id, fields)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => BankError::NotFound("Feedback not found".into()),
                other => other.into(),
            })?;
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::StoreCall;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn bank(store: MemoryStore) -> (QuestionBank, Arc<MemoryStore>) {
        let store = Arc::new(store);
        (QuestionBank::new(store.clone()), store)
    }

    fn question(text: &str, parent: &str) -> Value {
        json!({"question": text, "type": "multiple-choice", "parent": parent})
    }

    #[tokio::test]
    async fn subjects_inline_questions_in_id_order() {
        let (bank, _) = bank(
            MemoryStore::new()
                .with_document(SUBJECTS, "s1", json!({"title": "Voorrang", "questionIds": ["q2", "gone", "q1"]}))
                .with_document(QUESTIONS, "q1", json!({"question": "Een"}))
                .with_document(QUESTIONS, "q2", json!({"question": "Twee"})),
        );

        let page = bank.list_subjects(PageRequest::default()).await.unwrap();
        assert_eq!(page.subjects.len(), 1);
        let subject = &page.subjects[0];
        assert_eq!(subject.title, json!("Voorrang"));
        assert_eq!(subject.question_ids, vec!["q2", "gone", "q1"]);
        assert_eq!(
            subject.questions,
            vec![
                json!({"id": "q2", "question": "Twee"}),
                json!({"id": "q1", "question": "Een"})
            ]
        );
        assert!(!page.pagination.has_more);
    }

    #[tokio::test]
    async fn duplicate_question_ids_resolve_once() {
        let (bank, store) = bank(
            MemoryStore::recording()
                .with_document(SUBJECTS, "s1", json!({"title": "Voorrang", "questionIds": ["q1", "q2", "q1"]}))
                .with_document(QUESTIONS, "q1", json!({"question": "Een"}))
                .with_document(QUESTIONS, "q2", json!({"question": "Twee"})),
        );

        let page = bank.list_subjects(PageRequest::default()).await.unwrap();
        let subject = &page.subjects[0];
        assert_eq!(subject.question_ids, vec!["q1", "q2", "q1"]);
        assert_eq!(
            subject.questions,
            vec![
                json!({"id": "q1", "question": "Een"}),
                json!({"id": "q2", "question": "Twee"})
            ]
        );

        let requested: Vec<Vec<String>> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::GetMany { ids, .. } => Some(ids),
                _ => None,
            })
            .collect();
        assert_eq!(requested, vec![vec!["q1".to_string(), "q2".to_string()]]);
    }

    #[tokio::test]
    async fn subject_questions_are_fetched_in_chunks() {
        let ids: Vec<String> = (0..65).map(|i| format!("q{:03}", i)).collect();
        let mut store = MemoryStore::recording()
            .with_document(SUBJECTS, "s1", json!({"title": "Groot", "questionIds": ids}));
        for id in &ids {
            store = store.with_document(QUESTIONS, id, json!({"question": id}));
        }
        let (bank, store) = bank(store);

        let page = bank.list_subjects(PageRequest::default()).await.unwrap();
        assert_eq!(page.subjects[0].questions.len(), 65);

        let chunk_sizes: Vec<usize> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::GetMany { ids, .. } => Some(ids.len()),
                _ => None,
            })
            .collect();
        assert_eq!(chunk_sizes, vec![30, 30, 5]);
    }

    #[tokio::test]
    async fn subject_pages_resume_after_token() {
        let mut store = MemoryStore::new();
        for title in ["A", "B", "C", "D", "E"] {
            store = store.with_document(SUBJECTS, &format!("id-{title}"), json!({"title": title}));
        }
        let (bank, _) = bank(store);

        let first = bank
            .list_subjects(PageRequest::from_params(Some("2"), None))
            .await
            .unwrap();
        assert_eq!(first.pagination.next_page_token.as_deref(), Some("id-B"));
        assert!(first.pagination.has_more);

        let second = bank
            .list_subjects(PageRequest::from_params(Some("2"), Some("id-B")))
            .await
            .unwrap();
        let titles: Vec<_> = second.subjects.iter().map(|s| s.title.clone()).collect();
        assert_eq!(titles, vec![json!("C"), json!("D")]);
    }

    #[tokio::test]
    async fn exams_skip_missing_and_failing_questions() {
        let (bank, _) = bank(
            MemoryStore::new()
                .with_document(
                    EXAMS,
                    "1",
                    json!({"gevaarherkenning": ["q1", "missing"], "kennis": ["q2", "broken"]}),
                )
                .with_document(QUESTIONS, "q1", json!({"question": "Een"}))
                .with_document(QUESTIONS, "q2", json!({"question": "Twee"}))
                .with_document(QUESTIONS, "broken", json!({}))
                .fail_document(QUESTIONS, "broken"),
        );

        let list = bank.list_exams().await.unwrap();
        let exam = &list.exams[0];
        assert_eq!(exam.id, "1");
        assert_eq!(exam.gevaarherkenning.question_ids, vec!["q1", "missing"]);
        assert_eq!(exam.gevaarherkenning.questions.len(), 1);
        assert_eq!(exam.inzicht, ExamBucket::default());
        assert_eq!(exam.kennis.questions, vec![json!({"id": "q2", "question": "Twee"})]);
    }

    #[tokio::test]
    async fn create_links_to_exam_bucket() {
        let (bank, store) = bank(MemoryStore::new().with_document(EXAMS, "3", json!({})));

        let created = bank
            .create_question(question("Wat ziet u?", "Examen 3: Gevaarherkenning"))
            .await
            .unwrap();
        let stored = store.document(QUESTIONS, &created.question_id).unwrap();
        assert_eq!(stored.get_str("id"), Some(created.question_id.as_str()));
        assert!(stored.get("createdAt").is_some());
        assert_eq!(created.question["parent"], json!("Examen 3: Gevaarherkenning"));

        let exam = store.document(EXAMS, "3").unwrap();
        assert_eq!(exam.get("gevaarherkenning"), Some(&json!([created.question_id])));
    }

    #[tokio::test]
    async fn create_links_to_subject_by_title() {
        let (bank, store) = bank(
            MemoryStore::new()
                .with_document(SUBJECTS, "s1", json!({"title": "Voorrang", "questionIds": ["old"]})),
        );

        let created = bank
            .create_question(question("Wie gaat eerst?", "Voorrang"))
            .await
            .unwrap();
        let subject = store.document(SUBJECTS, "s1").unwrap();
        assert_eq!(
            subject.get("questionIds"),
            Some(&json!(["old", created.question_id]))
        );
    }

    #[tokio::test]
    async fn create_rejects_missing_fields_without_store_calls() {
        let (bank, store) = bank(MemoryStore::recording());

        let err = bank
            .create_question(json!({"question": "", "parent": "Voorrang"}))
            .await
            .unwrap_err();
        assert!(
            matches!(err, BankError::BadRequest(ref m) if m == "Missing required fields: question, type")
        );

        let err = bank.create_question(json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, BankError::BadRequest(ref m) if m == "Question data is required"));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn create_with_unknown_category_keeps_orphaned_question() {
        let (bank, store) = bank(MemoryStore::new().with_document(EXAMS, "4", json!({})));

        let err = bank
            .create_question(question("?", "Examen 4: Verkeersborden"))
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));
        assert_eq!(store.count(QUESTIONS), 1);
        assert_eq!(store.document(EXAMS, "4").unwrap().data, Map::new());
    }

    #[tokio::test]
    async fn create_with_missing_parent_is_not_found() {
        let (bank, store) = bank(MemoryStore::new());

        let err = bank
            .create_question(question("?", "Bestaat niet"))
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::NotFound(ref m) if m.contains("Bestaat niet")));

        let err = bank
            .create_question(question("?", "Examen 9 Kennis"))
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::NotFound(_)));
        assert_eq!(store.count(QUESTIONS), 2);
    }

    #[tokio::test]
    async fn update_merges_and_stamps() {
        let (bank, store) = bank(
            MemoryStore::new()
                .with_document(QUESTIONS, "q1", json!({"question": "Oud", "type": "open"})),
        );

        let id = bank
            .update_question(json!({"id": "q1", "question": "Nieuw"}))
            .await
            .unwrap();
        assert_eq!(id, "q1");
        let doc = store.document(QUESTIONS, "q1").unwrap();
        assert_eq!(doc.get_str("question"), Some("Nieuw"));
        assert_eq!(doc.get_str("type"), Some("open"));
        assert!(doc.get("updatedAt").is_some());
    }

    #[tokio::test]
    async fn update_errors() {
        let (bank, _) = bank(MemoryStore::new());
        let err = bank.update_question(json!({"question": "x"})).await.unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));
        let err = bank.update_question(json!({"id": "nope"})).await.unwrap_err();
        assert!(matches!(err, BankError::NotFound(ref m) if m == "Question not found"));
    }

    #[tokio::test]
    async fn delete_leaves_dangling_references() {
        let (bank, store) = bank(
            MemoryStore::new()
                .with_document(EXAMS, "1", json!({"kennis": ["q1"]}))
                .with_document(QUESTIONS, "q1", json!({"question": "Weg"})),
        );

        assert_eq!(bank.delete_question(Some("q1")).await.unwrap(), "q1");
        assert!(store.document(QUESTIONS, "q1").is_none());

        let exams = bank.list_exams().await.unwrap();
        assert_eq!(exams.exams[0].kennis.question_ids, vec!["q1"]);
        assert!(exams.exams[0].kennis.questions.is_empty());

        let err = bank.delete_question(Some("q1")).await.unwrap_err();
        assert!(matches!(err, BankError::NotFound(_)));
        let err = bank.delete_question(Some("")).await.unwrap_err();
        assert!(matches!(err, BankError::BadRequest(ref m) if m == "Question ID is required"));
    }

    #[tokio::test]
    async fn feedback_filtered_newest_first() {
        let (bank, _) = bank(
            MemoryStore::new()
                .with_document(FEEDBACK, "f1", json!({"status": "open", "date": "2024-03-01"}))
                .with_document(FEEDBACK, "f2", json!({"status": "done", "date": "2024-03-02"}))
                .with_document(FEEDBACK, "f3", json!({"status": "open", "date": "2024-03-03"}))
                .with_document(FEEDBACK, "f4", json!({"status": "open"})),
        );

        let page = bank
            .list_feedback(PageRequest::default(), Some("open"))
            .await
            .unwrap();
        let ids: Vec<_> = page.feedback.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f3", "f1"]);

        let all = bank.list_feedback(PageRequest::default(), None).await.unwrap();
        assert_eq!(all.feedback.len(), 3);
    }

    #[tokio::test]
    async fn feedback_status_update_touches_only_status() {
        let (bank, store) = bank(MemoryStore::new().with_document(
            FEEDBACK,
            "f1",
            json!({"status": "open", "feedback": "Fout antwoord", "date": "2024-03-01"}),
        ));

        let id = bank
            .update_feedback_status(json!({"feedbackId": "f1", "status": "resolved", "feedback": "x"}))
            .await
            .unwrap();
        assert_eq!(id, "f1");
        let doc = store.document(FEEDBACK, "f1").unwrap();
        assert_eq!(doc.get_str("status"), Some("resolved"));
        assert_eq!(doc.get_str("feedback"), Some("Fout antwoord"));
        assert!(doc.get("updatedAt").is_some());

        let err = bank
            .update_feedback_status(json!({"feedbackId": "f1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));
        let err = bank
            .update_feedback_status(json!({"feedbackId": "zz", "status": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::NotFound(_)));
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let (bank, _) = bank(MemoryStore::new().fail_collection(SUBJECTS));
        let err = bank.list_subjects(PageRequest::default()).await.unwrap_err();
        assert!(matches!(err, BankError::Store(_)));
    }
}
