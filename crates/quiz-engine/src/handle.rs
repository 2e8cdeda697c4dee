use std::sync::Arc;

use quiz_spec::AnswerValue;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::{SessionTicket, Upload};
use crate::engine::{QuizFlowEngine, Transition};
use crate::error::EngineError;
use crate::session::Session;

/// Shareable handle that lets exactly one transition run at a time.
///
/// Calls never queue: while a `next()` or `complete()` is awaiting the
/// backend, every other call fails with [`EngineError::TransitionInFlight`].
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<QuizFlowEngine>>,
}

impl SessionHandle {
    pub fn new(engine: QuizFlowEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn acquire(&self) -> Result<MutexGuard<'_, QuizFlowEngine>, EngineError> {
        self.inner
            .try_lock()
            .map_err(|_| EngineError::TransitionInFlight)
    }

    pub async fn start(&self, ticket: Option<SessionTicket>) -> Result<Transition, EngineError> {
        let mut engine = self.acquire()?;
        engine.start(ticket).await
    }

    pub fn answer(&self, question_id: &str, value: AnswerValue) -> Result<Transition, EngineError> {
        Ok(self.acquire()?.answer(question_id, value))
    }

    pub fn select_option(&self, index: usize) -> Result<Transition, EngineError> {
        Ok(self.acquire()?.select_option(index))
    }

    pub fn write_in(&self, index: usize, text: &str) -> Result<Transition, EngineError> {
        Ok(self.acquire()?.write_in(index, text))
    }

    pub fn attach_upload(&self, upload: Upload) -> Result<Transition, EngineError> {
        Ok(self.acquire()?.attach_upload(upload))
    }

    pub async fn next(&self) -> Result<Transition, EngineError> {
        let mut engine = self.acquire()?;
        engine.next().await
    }

    pub fn back(&self) -> Result<Transition, EngineError> {
        Ok(self.acquire()?.back())
    }

    pub fn resume(&self, existing: &Value) -> Result<Transition, EngineError> {
        Ok(self.acquire()?.resume(existing))
    }

    pub async fn complete(&self) -> Result<Transition, EngineError> {
        let mut engine = self.acquire()?;
        engine.complete().await
    }

    /// Copy of the session as it stands.
    pub fn snapshot(&self) -> Result<Session, EngineError> {
        Ok(self.acquire()?.session().clone())
    }
}
