//! Parsing of a question's `parent` reference.
//!
//! A parent is either the exact title of a subject (`"Voorrang"`) or an exam
//! reference such as `"Examen 3: Gevaarherkenning"`: the word `Examen`, an
//! exam number and one of the three category keywords.

use serde::Serialize;

/// Marker that turns a parent into an exam reference.
const EXAM_MARKER: &str = "Examen";

/// The three buckets of an exam document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExamCategory {
    Gevaarherkenning,
    Inzicht,
    Kennis,
}

impl ExamCategory {
    /// In keyword-matching order.
    pub const ALL: [ExamCategory; 3] = [
        ExamCategory::Gevaarherkenning,
        ExamCategory::Inzicht,
        ExamCategory::Kennis,
    ];

    /// Field name of the bucket in the exam document.
    pub fn field(self) -> &'static str {
        match self {
            ExamCategory::Gevaarherkenning => "gevaarherkenning",
            ExamCategory::Inzicht => "inzicht",
            ExamCategory::Kennis => "kennis",
        }
    }

    /// Keyword looked for in a parent string.
    pub fn keyword(self) -> &'static str {
        match self {
            ExamCategory::Gevaarherkenning => "Gevaarherkenning",
            ExamCategory::Inzicht => "Inzicht",
            ExamCategory::Kennis => "Kennis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    Exam {
        exam_id: String,
        category: ExamCategory,
    },
    Subject(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParentError {
    #[error("Invalid exam reference. Parent must include an exam number")]
    MissingExamNumber,

    #[error("Invalid exam type. Must include 'Gevaarherkenning', 'Inzicht', or 'Kennis'")]
    UnknownCategory,
}

/// Classify a parent string. The exam id is the first run of ASCII digits;
/// the category is the first keyword found in [`ExamCategory::ALL`] order.
pub fn parse_parent(parent: &str) -> Result<Parent, ParentError> {
    if !parent.contains(EXAM_MARKER) {
        return Ok(Parent::Subject(parent.to_string()));
    }

    let exam_id = parent
        .split(|c: char| !c.is_ascii_digit())
        .find(|run| !run.is_empty())
        .ok_or(ParentError::MissingExamNumber)?;

    let category = ExamCategory::ALL
        .into_iter()
        .find(|c| parent.contains(c.keyword()))
        .ok_or(ParentError::UnknownCategory)?;

    Ok(Parent::Exam {
        exam_id: exam_id.to_string(),
        category,
    })
}
