use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use quiz_spec::{AnswerEntry, Id};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, CompletionResponse, QuizBackend, SessionTicket, Upload};

#[derive(Debug, Default)]
struct StoredSession {
    quiz_id: String,
    response_id: String,
    answers: Map<String, Value>,
}

/// In-process [`QuizBackend`] for tests and local runs.
///
/// Persistence and completion failures can be switched on to exercise the
/// engine's recovery paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: Mutex<BTreeMap<String, StoredSession>>,
    recommendations: Mutex<Vec<Id>>,
    reject_persist: AtomicBool,
    fail_completion: AtomicBool,
    completions: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result ids returned by every completion.
    pub fn with_recommendations(mut self, ids: impl IntoIterator<Item = impl Into<Id>>) -> Self {
        if let Ok(recommendations) = self.recommendations.get_mut() {
            *recommendations = ids.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Registers a session that already holds `answers`.
    pub fn seed_session(&self, quiz_id: &str, answers: Value) -> Result<SessionTicket, BackendError> {
        let ticket = new_ticket();
        let stored = StoredSession {
            quiz_id: quiz_id.to_string(),
            response_id: ticket.response_id.clone(),
            answers: answers.as_object().cloned().unwrap_or_default(),
        };
        self.lock()?.insert(ticket.session_id.clone(), stored);
        Ok(ticket)
    }

    pub fn reject_persist(&self, reject: bool) {
        self.reject_persist.store(reject, Ordering::SeqCst);
    }

    pub fn fail_completion(&self, fail: bool) {
        self.fail_completion.store(fail, Ordering::SeqCst);
    }

    /// Answers saved so far for `session_id`.
    pub fn saved_answers(&self, session_id: &str) -> Option<Value> {
        let sessions = self.sessions.lock().ok()?;
        sessions
            .get(session_id)
            .map(|session| Value::Object(session.answers.clone()))
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredSession>>, BackendError> {
        self.sessions
            .lock()
            .map_err(|err| BackendError::Unavailable(format!("lock: {}", err)))
    }
}

fn new_ticket() -> SessionTicket {
    SessionTicket {
        session_id: Uuid::new_v4().to_string(),
        response_id: Uuid::new_v4().to_string(),
    }
}

#[async_trait]
impl QuizBackend for MemoryBackend {
    async fn start_session(&self, quiz_id: &str) -> Result<SessionTicket, BackendError> {
        let ticket = new_ticket();
        let stored = StoredSession {
            quiz_id: quiz_id.to_string(),
            response_id: ticket.response_id.clone(),
            answers: Map::new(),
        };
        self.lock()?.insert(ticket.session_id.clone(), stored);
        debug!(quiz = quiz_id, session = %ticket.session_id, "session opened");
        Ok(ticket)
    }

    async fn fetch_existing_answers(
        &self,
        session_id: &str,
    ) -> Result<Option<Value>, BackendError> {
        let sessions = self.lock()?;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| BackendError::UnknownSession(session_id.to_string()))?;
        if session.answers.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Object(session.answers.clone())))
    }

    async fn persist_answer(
        &self,
        response_id: &str,
        question_id: &str,
        answer: &Value,
    ) -> Result<bool, BackendError> {
        if self.reject_persist.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut sessions = self.lock()?;
        let session = sessions
            .values_mut()
            .find(|session| session.response_id == response_id)
            .ok_or_else(|| BackendError::UnknownSession(response_id.to_string()))?;
        session
            .answers
            .insert(question_id.to_string(), answer.clone());
        Ok(true)
    }

    async fn complete_session(
        &self,
        response_id: &str,
        answers: &[AnswerEntry],
        uploads: &[Upload],
    ) -> Result<CompletionResponse, BackendError> {
        if self.fail_completion.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("completion endpoint down".into()));
        }
        let quiz_id = {
            let sessions = self.lock()?;
            sessions
                .values()
                .find(|session| session.response_id == response_id)
                .map(|session| session.quiz_id.clone())
                .ok_or_else(|| BackendError::UnknownSession(response_id.to_string()))?
        };
        self.completions.fetch_add(1, Ordering::SeqCst);
        let recommendations = self
            .recommendations
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(CompletionResponse {
            recommendations,
            results: serde_json::json!({
                "quizId": quiz_id,
                "answerCount": answers.len(),
                "uploadCount": uploads.len(),
            }),
        })
    }
}
