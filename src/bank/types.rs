//! Request and response shapes of the question bank.

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::store::Document;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// A page request as received from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: usize,
    /// Id of the last document of the previous page.
    pub page_token: Option<String>,
}

impl PageRequest {
    /// Lenient parsing: the size is read from its leading integer, so
    /// `"20abc"` is 20 and `"1.5"` is 1. An absent, non-numeric or
    /// non-positive size falls back to the default; sizes above the maximum
    /// are capped. An empty token means "first page".
    pub fn from_params(page_size: Option<&str>, page_token: Option<&str>) -> Self {
        let page_size = page_size
            .and_then(leading_int)
            .filter(|n| *n > 0)
            .map_or(DEFAULT_PAGE_SIZE, |n| {
                usize::try_from(n).unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE)
            });
        let page_token = page_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            page_size,
            page_token,
        }
    }
}

/// Optional sign followed by the leading digit run. Runs too long for an
/// `i64` saturate.
fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    let n = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -n } else { n })
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Id of the last returned item; pass as `pageToken` for the next page.
    pub next_page_token: Option<String>,
    pub page_size: usize,
    /// True when the page came back full.
    pub has_more: bool,
}

impl Pagination {
    pub fn for_page(docs: &[Document], page_size: usize) -> Self {
        Self {
            next_page_token: docs.last().map(|d| d.id.clone()),
            page_size,
            has_more: docs.len() == page_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectWithQuestions {
    pub id: String,
    pub title: Value,
    pub question_ids: Vec<String>,
    /// Full question documents, in `questionIds` order.
    pub questions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SubjectPage {
    pub subjects: Vec<SubjectWithQuestions>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExamBucket {
    pub question_ids: Vec<String>,
    pub questions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExamWithQuestions {
    pub id: String,
    pub gevaarherkenning: ExamBucket,
    pub inzicht: ExamBucket,
    pub kennis: ExamBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExamList {
    pub exams: Vec<ExamWithQuestions>,
}

/// Fixed projection of a feedback document.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
}

impl From<Document> for FeedbackItem {
    fn from(mut doc: Document) -> Self {
        Self {
            subject: doc.data.remove("subject"),
            feedback: doc.data.remove("feedback"),
            date: doc.data.remove("date"),
            status: doc.data.remove("status"),
            question_id: doc.data.remove("questionId"),
            user_id: doc.data.remove("userId"),
            id: doc.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FeedbackPage {
    pub feedback: Vec<FeedbackItem>,
    pub pagination: Pagination,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedQuestion {
    pub question_id: String,
    /// The document as persisted, including `id`, `createdAt`, `updatedAt`.
    pub question: Value,
}
