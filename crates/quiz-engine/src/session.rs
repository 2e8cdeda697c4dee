use quiz_spec::{AnswerStore, Id};
use serde::{Deserialize, Serialize};

use crate::backend::Upload;
use crate::engine::EngineState;

/// One user's run through a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub quiz_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    pub state: EngineState,
    pub current_step_index: usize,
    /// Stack of presented step indices; the top is the current step.
    pub visited_steps: Vec<usize>,
    pub answers: AnswerStore,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<Upload>,
}

impl Session {
    pub fn new(quiz_id: Id) -> Self {
        Self {
            quiz_id,
            session_id: None,
            response_id: None,
            state: EngineState::NotStarted,
            current_step_index: 0,
            visited_steps: Vec::new(),
            answers: AnswerStore::new(),
            uploads: Vec::new(),
        }
    }

    /// Compact snapshot for handing a session to another process.
    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use quiz_spec::AnswerValue;

    use super::*;

    #[test]
    fn cbor_snapshot_restores_session() {
        let mut session = Session::new("weight-intake".into());
        session.state = EngineState::InProgress;
        session.current_step_index = 2;
        session.visited_steps = vec![0, 1, 2];
        session
            .answers
            .insert("1", AnswerValue::Choice("No".into()));
        session.answers.insert(
            "2",
            AnswerValue::Choices(vec!["Headache".into(), "Nausea".into()]),
        );

        let bytes = session.to_cbor().expect("encode");
        let restored = Session::from_cbor(&bytes).expect("decode");
        assert_eq!(restored, session);
    }
}
