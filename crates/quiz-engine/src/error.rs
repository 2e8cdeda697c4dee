use quiz_spec::QuizError;
use thiserror::Error;

use crate::backend::BackendError;

/// Failures that stop a transition. Recoverable input problems are reported
/// as [`crate::Transition::Ignored`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Malformed(#[from] QuizError),
    #[error("quiz '{quiz_id}' requires a signed-in user")]
    LoginRequired { quiz_id: String },
    #[error("quiz '{quiz_id}' has no step left to show")]
    NothingToPresent { quiz_id: String },
    #[error("could not open a session: {0}")]
    Session(#[source] BackendError),
    #[error("could not save the answer to '{question_id}': {reason}")]
    Persistence { question_id: String, reason: String },
    #[error("could not submit the quiz: {0}")]
    Completion(#[source] BackendError),
    #[error("another transition is still in flight")]
    TransitionInFlight,
}
