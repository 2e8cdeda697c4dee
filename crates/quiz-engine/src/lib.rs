//! Orchestration layer for branching quizzes.
//!
//! [`QuizFlowEngine`] owns one session: the answer store, the current step
//! and the visited-step stack. It drives the pure algorithms in `quiz_spec`
//! and talks to the outside world only through [`QuizBackend`].

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod memory;
pub mod session;

pub use backend::{BackendError, CompletionResponse, QuizBackend, SessionTicket, Upload};
pub use config::EngineConfig;
pub use engine::{Completion, EngineState, Navigation, Notice, QuizFlowEngine, Transition};
pub use error::EngineError;
pub use handle::SessionHandle;
pub use memory::MemoryBackend;
pub use session::Session;
