use tracing::debug;

use crate::answers::{AnswerStore, AnswerValue};
use crate::spec::flow::{ConditionContext, FlowRule, FlowTarget};
use crate::spec::quiz::Quiz;
use crate::spec::step::StepSpec;

/// Outcome of branching resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Step(usize),
    Complete,
}

impl NextStep {
    pub fn index(&self) -> Option<usize> {
        match self {
            NextStep::Step(index) => Some(*index),
            NextStep::Complete => None,
        }
    }
}

/// Computes where the quiz goes after answering the step at `current`.
///
/// Flow rules attached to the current step are tried in declaration order and
/// the first satisfied one wins. Without a match the quiz advances by one.
/// Steps flagged `should_skip` are passed over before the index is returned.
pub fn resolve_next(
    quiz: &Quiz,
    current: usize,
    answer: Option<&AnswerValue>,
    answers: &AnswerStore,
) -> NextStep {
    let Some(step) = quiz.steps.get(current) else {
        return NextStep::Complete;
    };
    let target = match matching_rule(quiz, step, answer, answers) {
        Some(rule) => match &rule.to {
            FlowTarget::Index { step_index } => NextStep::Step(*step_index),
            FlowTarget::Question { question_id } => quiz
                .step_index(question_id.as_str())
                .map(NextStep::Step)
                .unwrap_or(NextStep::Complete),
            FlowTarget::End(_) => NextStep::Complete,
        },
        None => NextStep::Step(current + 1),
    };
    match target {
        NextStep::Step(index) => first_presentable(&quiz.steps, index),
        NextStep::Complete => NextStep::Complete,
    }
}

/// First flow rule of `step` whose condition holds.
pub fn matching_rule<'a>(
    quiz: &'a Quiz,
    step: &StepSpec,
    answer: Option<&AnswerValue>,
    answers: &AnswerStore,
) -> Option<&'a FlowRule> {
    let ctx = ConditionContext {
        answer,
        options: step.options(),
        answers,
    };
    let rule = quiz
        .flow
        .iter()
        .filter(|rule| rule.from.question_id == step.id)
        .find(|rule| rule.condition.evaluate(&ctx));
    if let Some(rule) = rule {
        debug!(step = %step.id, target = ?rule.to, "flow rule matched");
    }
    rule
}

/// Advances `from` past skippable steps.
pub fn first_presentable(steps: &[StepSpec], from: usize) -> NextStep {
    steps
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, step)| !step.should_skip)
        .map(|(index, _)| NextStep::Step(index))
        .unwrap_or(NextStep::Complete)
}

/// Nearest step before `before` that is not skipped.
pub fn previous_presentable(steps: &[StepSpec], before: usize) -> Option<usize> {
    steps
        .iter()
        .enumerate()
        .take(before)
        .rev()
        .find(|(_, step)| !step.should_skip)
        .map(|(index, _)| index)
}
