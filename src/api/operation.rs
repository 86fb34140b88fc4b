use axum::http::Method;

/// Prefix of the paths the mobile and admin clients call.
const LEGACY_PREFIX: &str = "/http-";

/// The operations the API exposes.
///
/// Each one is mounted twice: on its REST path and on the legacy
/// `/http-<name>` path. Both accept only the operation's method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListSubjects,
    ListExams,
    CreateQuestion,
    UpdateQuestion,
    DeleteQuestion,
    ListFeedback,
    UpdateFeedbackStatus,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::ListSubjects,
        Operation::ListExams,
        Operation::CreateQuestion,
        Operation::UpdateQuestion,
        Operation::DeleteQuestion,
        Operation::ListFeedback,
        Operation::UpdateFeedbackStatus,
    ];

    /// Name recorded in the access log.
    pub fn name(self) -> &'static str {
        match self {
            Operation::ListSubjects => "getAllSubjects",
            Operation::ListExams => "getAllExams",
            Operation::CreateQuestion => "createQuestion",
            Operation::UpdateQuestion => "updateQuestion",
            Operation::DeleteQuestion => "deleteQuestion",
            Operation::ListFeedback => "getAllFeedback",
            Operation::UpdateFeedbackStatus => "updateFeedbackStatus",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Operation::ListSubjects | Operation::ListExams | Operation::ListFeedback => Method::GET,
            Operation::CreateQuestion => Method::POST,
            Operation::UpdateQuestion | Operation::UpdateFeedbackStatus => Method::PUT,
            Operation::DeleteQuestion => Method::DELETE,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Operation::ListSubjects => "/api/v1/subjects",
            Operation::ListExams => "/api/v1/exams",
            Operation::CreateQuestion | Operation::UpdateQuestion | Operation::DeleteQuestion => {
                "/api/v1/questions"
            }
            Operation::ListFeedback => "/api/v1/feedback",
            Operation::UpdateFeedbackStatus => "/api/v1/feedback/status",
        }
    }

    pub fn legacy_path(self) -> String {
        format!("{}{}", LEGACY_PREFIX, self.name())
    }

    /// Generic message returned when the store fails during this operation.
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::ListSubjects => "Een fout is opgetreden bij het ophalen van de onderwerpen en vragen, probeer het later opnieuw.",
            Operation::ListExams => "Een fout is opgetreden bij het ophalen van de examens en vragen, probeer het later opnieuw.",
            Operation::CreateQuestion => "Een fout is opgetreden bij het aanmaken van de vraag, probeer het later opnieuw.",
            Operation::UpdateQuestion => "Een fout is opgetreden bij het bijwerken van de vraag, probeer het later opnieuw.",
            Operation::DeleteQuestion => "Een fout is opgetreden bij het verwijderen van de vraag, probeer het later opnieuw.",
            Operation::ListFeedback => "Een fout is opgetreden bij het ophalen van de feedback, probeer het later opnieuw.",
            Operation::UpdateFeedbackStatus => "Een fout is opgetreden bij het bijwerken van de feedback status, probeer het later opnieuw.",
        }
    }

    /// Find the operation served at `path` for `method`.
    pub fn resolve(method: &Method, path: &str) -> Option<Operation> {
        Self::ALL.into_iter().find(|op| {
            op.method() == *method
                && (op.path() == path
                    || path
                        .strip_prefix(LEGACY_PREFIX)
                        .is_some_and(|name| name == op.name()))
        })
    }
}
