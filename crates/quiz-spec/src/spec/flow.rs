use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answers::{AnswerStore, AnswerValue};
use crate::spec::id::StepId;
use crate::spec::step::OptionSpec;

/// Step whose answer a flow rule inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowSource {
    pub question_id: StepId,
}

/// Sentinel target that finishes the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    End,
}

/// Where a satisfied flow rule sends the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FlowTarget {
    Index {
        #[serde(rename = "stepIndex")]
        step_index: usize,
    },
    Question {
        #[serde(rename = "questionId")]
        question_id: StepId,
    },
    End(Sentinel),
}

/// Branching rule: when the answer to `from` satisfies `condition`, go to `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowRule {
    pub from: FlowSource,
    pub to: FlowTarget,
    #[serde(default)]
    pub condition: Condition,
}

/// Values a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Answer given to the rule's source step.
    pub answer: Option<&'a AnswerValue>,
    /// Options of the rule's source step.
    pub options: &'a [OptionSpec],
    /// Every answer recorded so far.
    pub answers: &'a AnswerStore,
}

/// Predicate over a step's answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    /// Scalar equality, or membership for multi-select answers.
    Equals { value: String },
    /// Same as `Equals` against the label of the option at `index`.
    OptionIndex { index: usize },
    AnyOf { values: Vec<String> },
    Answered,
    /// Inspects another question's recorded answer.
    AnswerEquals { question_id: StepId, value: String },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn equals(value: impl Into<String>) -> Self {
        Condition::Equals {
            value: value.into(),
        }
    }

    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Equals { value } => ctx
                .answer
                .map(|answer| answer.selects(value))
                .unwrap_or(false),
            Condition::OptionIndex { index } => match (ctx.answer, ctx.options.get(*index)) {
                (Some(answer), Some(option)) => answer.selects(&option.text),
                _ => false,
            },
            Condition::AnyOf { values } => ctx
                .answer
                .map(|answer| values.iter().any(|value| answer.selects(value)))
                .unwrap_or(false),
            Condition::Answered => ctx.answer.map(|answer| !answer.is_empty()).unwrap_or(false),
            Condition::AnswerEquals { question_id, value } => ctx
                .answers
                .get(question_id.as_str())
                .map(|answer| answer.selects(value))
                .unwrap_or(false),
            Condition::And { conditions } => conditions.iter().all(|inner| inner.evaluate(ctx)),
            Condition::Or { conditions } => conditions.iter().any(|inner| inner.evaluate(ctx)),
            Condition::Not { condition } => !condition.evaluate(ctx),
        }
    }
}
