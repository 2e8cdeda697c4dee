use async_trait::async_trait;
use quiz_spec::{AnswerEntry, Id, StepId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifiers handed out when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTicket {
    pub session_id: String,
    pub response_id: String,
}

/// Opaque descriptor of a file the user attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub question_id: StepId,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Backend answer to a completed submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionResponse {
    /// Result ids the backend suggests, best first.
    pub recommendations: Vec<Id>,
    /// Backend-specific payload passed through untouched.
    pub results: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("unknown session '{0}'")]
    UnknownSession(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Remote collaborator of the engine.
///
/// Every call is a suspension point; the engine accepts no other transition
/// for the session until it returns.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// Opens a new session for `quiz_id`.
    async fn start_session(&self, quiz_id: &str) -> Result<SessionTicket, BackendError>;

    /// Previously saved answers as `{ questionId: { answer } }`, if any.
    async fn fetch_existing_answers(&self, session_id: &str)
    -> Result<Option<Value>, BackendError>;

    /// Saves one answer. `Ok(false)` means the backend refused it.
    async fn persist_answer(
        &self,
        response_id: &str,
        question_id: &str,
        answer: &Value,
    ) -> Result<bool, BackendError>;

    /// Submits the full answer set.
    async fn complete_session(
        &self,
        response_id: &str,
        answers: &[AnswerEntry],
        uploads: &[Upload],
    ) -> Result<CompletionResponse, BackendError>;
}
