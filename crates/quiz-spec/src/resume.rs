use crate::answers::AnswerStore;
use crate::spec::step::StepSpec;

/// Step index a resumed session continues from.
///
/// Returns the last step (in definition order) that already has an answer,
/// or `0` when nothing matches. The caller re-asks or skips from there.
pub fn resume_index(steps: &[StepSpec], answers: &AnswerStore) -> usize {
    if answers.is_empty() {
        return 0;
    }
    steps
        .iter()
        .rposition(|step| answers.contains(step.id.as_str()))
        .unwrap_or(0)
}
