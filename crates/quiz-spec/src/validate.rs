use std::collections::BTreeSet;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answers::{AnswerValue, format_number};
use crate::spec::flow::FlowTarget;
use crate::spec::quiz::Quiz;
use crate::spec::step::{ComponentKind, ComponentStep, FormStep, QuestionStep, StepKind, StepSpec};

/// Single problem found in a quiz definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DefinitionProblem {
    pub path: String,
    pub message: String,
    pub code: String,
}

/// Report returned by [`validate_quiz`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuizValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<DefinitionProblem>,
}

impl QuizValidation {
    pub fn into_result(self, quiz_id: &str) -> Result<(), QuizError> {
        if self.valid {
            Ok(())
        } else {
            Err(QuizError::Malformed {
                quiz_id: quiz_id.to_string(),
                problems: self.problems,
            })
        }
    }
}

/// Fatal definition errors.
#[derive(Debug, Clone, Error)]
pub enum QuizError {
    #[error("quiz '{quiz_id}' is unavailable: {}", summarize(.problems))]
    Malformed {
        quiz_id: String,
        problems: Vec<DefinitionProblem>,
    },
}

fn summarize(problems: &[DefinitionProblem]) -> String {
    problems
        .iter()
        .map(|problem| format!("{} ({})", problem.message, problem.path))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks that a definition is complete enough to run.
pub fn validate_quiz(quiz: &Quiz) -> QuizValidation {
    let mut problems = Vec::new();

    if quiz.steps.is_empty() {
        problems.push(problem("/steps", "quiz has no steps", "no_steps"));
    }

    let mut seen = BTreeSet::new();
    for (index, step) in quiz.steps.iter().enumerate() {
        if !seen.insert(step.id.as_str()) {
            problems.push(problem(
                format!("/steps/{}", index),
                format!("duplicate step id '{}'", step.id),
                "duplicate_step",
            ));
        }
        check_step_definition(index, step, &mut problems);
    }

    for (index, rule) in quiz.flow.iter().enumerate() {
        let path = format!("/flow/{}", index);
        if quiz.step_index(rule.from.question_id.as_str()).is_none() {
            problems.push(problem(
                &path,
                format!("flow rule source '{}' is not a step", rule.from.question_id),
                "unknown_flow_source",
            ));
        }
        match &rule.to {
            FlowTarget::Index { step_index } if *step_index > quiz.steps.len() => {
                problems.push(problem(
                    &path,
                    format!("flow rule target index {} is out of range", step_index),
                    "flow_target_range",
                ));
            }
            FlowTarget::Question { question_id }
                if quiz.step_index(question_id.as_str()).is_none() && *question_id != "end" =>
            {
                problems.push(problem(
                    &path,
                    format!("flow rule target '{}' is not a step", question_id),
                    "unknown_flow_target",
                ));
            }
            _ => {}
        }
    }

    match (quiz.edges().is_empty(), quiz.results.is_empty()) {
        (false, true) => problems.push(problem(
            "/results",
            "recommendation edges exist but no results are defined",
            "no_results",
        )),
        (true, false) => problems.push(problem(
            "/logicResults/edges",
            "results are defined but no edges lead to them",
            "no_edges",
        )),
        _ => {}
    }
    for (index, edge) in quiz.edges().iter().enumerate() {
        let path = format!("/logicResults/edges/{}", index);
        if let Some(step) = quiz.step(edge.source.as_str())
            && let Some(question) = step.question()
            && edge.source_option_index >= question.options.len()
        {
            problems.push(problem(
                &path,
                format!(
                    "edge option index {} exceeds the options of '{}'",
                    edge.source_option_index, edge.source
                ),
                "edge_option_range",
            ));
        }
        for alternative in &edge.alternative_prods {
            if quiz.result(alternative.as_str()).is_none() {
                problems.push(problem(
                    &path,
                    format!("alternative result '{}' is not defined", alternative),
                    "unknown_alternative",
                ));
            }
        }
    }

    check_edge_graph(quiz, &mut problems);

    QuizValidation {
        valid: problems.is_empty(),
        problems,
    }
}

/// Edge sources must be steps or junctions fed by another edge. When results
/// exist every edge has to lead to one of them.
fn check_edge_graph(quiz: &Quiz, problems: &mut Vec<DefinitionProblem>) {
    let edges = quiz.edges();
    let targets: BTreeSet<&str> = edges.iter().map(|edge| edge.target.as_str()).collect();
    for (index, edge) in edges.iter().enumerate() {
        let path = format!("/logicResults/edges/{}", index);
        let source = edge.source.as_str();
        if quiz.step(source).is_none() {
            if !targets.contains(source) {
                problems.push(problem(
                    &path,
                    format!("edge source '{}' is neither a step nor a junction", source),
                    "unknown_edge_source",
                ));
            } else if edge.source_option_index != 0 {
                problems.push(problem(
                    &path,
                    format!(
                        "junction '{}' has no options but the edge uses option {}",
                        source, edge.source_option_index
                    ),
                    "junction_option_index",
                ));
            }
        }
        if !quiz.results.is_empty()
            && !reaches_result(quiz, edge.target.as_str(), &mut BTreeSet::new())
        {
            problems.push(problem(
                &path,
                format!("edge target '{}' never leads to a result", edge.target),
                "unresolved_edge_target",
            ));
        }
    }
}

fn reaches_result<'a>(quiz: &'a Quiz, node: &'a str, seen: &mut BTreeSet<&'a str>) -> bool {
    if quiz.result(node).is_some() {
        return true;
    }
    if !seen.insert(node) {
        return false;
    }
    quiz.edges()
        .iter()
        .filter(|edge| edge.source == node)
        .any(|edge| reaches_result(quiz, edge.target.as_str(), seen))
}

fn check_step_definition(index: usize, step: &StepSpec, problems: &mut Vec<DefinitionProblem>) {
    let path = format!("/steps/{}", index);
    match &step.kind {
        StepKind::Question(question) if question.options.is_empty() => {
            problems.push(problem(
                &path,
                format!("question '{}' has no options", step.id),
                "no_options",
            ));
        }
        StepKind::Form(form) => {
            if form.form_inputs.is_empty() {
                problems.push(problem(
                    &path,
                    format!("form '{}' has no inputs", step.id),
                    "no_inputs",
                ));
            }
            for input in &form.form_inputs {
                if let Some(pattern) = &input.pattern
                    && Regex::new(pattern).is_err()
                {
                    problems.push(problem(
                        &path,
                        format!("input '{}' has an invalid pattern", input.id),
                        "invalid_pattern",
                    ));
                }
            }
        }
        _ => {}
    }
}

fn problem(path: impl Into<String>, message: impl Into<String>, code: &str) -> DefinitionProblem {
    DefinitionProblem {
        path: path.into(),
        message: message.into(),
        code: code.into(),
    }
}

/// Reason an answer cannot advance the quiz.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnswerIssue {
    #[error("an answer is required")]
    Missing,
    #[error("select at least one option")]
    EmptySelection,
    #[error("'{0}' is not one of the options")]
    UnknownOption(String),
    #[error("'{0}' cannot be combined with other options")]
    ExclusiveOption(String),
    #[error("expected {0}")]
    TypeMismatch(&'static str),
    #[error("'{0}' is required")]
    MissingField(String),
    #[error("'{0}' has an invalid format")]
    PatternMismatch(String),
    #[error("{value} is outside {min}..={max}")]
    OutOfRange { value: String, min: String, max: String },
}

/// Answer requirements of a step kind.
pub trait StepContract {
    fn check_answer(&self, answer: Option<&AnswerValue>) -> Result<(), AnswerIssue>;
}

impl StepContract for QuestionStep {
    fn check_answer(&self, answer: Option<&AnswerValue>) -> Result<(), AnswerIssue> {
        let answer = answer.ok_or(AnswerIssue::Missing)?;
        let selected = match answer {
            AnswerValue::Choice(text) => vec![text.clone()],
            AnswerValue::Number(number) => vec![format_number(*number)],
            AnswerValue::Choices(items) if self.question_type.is_multiple() => items.clone(),
            AnswerValue::Choices(_) => return Err(AnswerIssue::TypeMismatch("a single option")),
            AnswerValue::Fields(_) => return Err(AnswerIssue::TypeMismatch("an option")),
        };

        let selected = selected
            .into_iter()
            .filter(|item| !item.trim().is_empty())
            .collect::<Vec<_>>();
        if selected.is_empty() {
            return Err(if self.question_type.is_multiple() {
                AnswerIssue::EmptySelection
            } else {
                AnswerIssue::Missing
            });
        }

        for item in &selected {
            if self.options.is_empty() {
                break;
            }
            let known = self.options.iter().any(|option| &option.text == item);
            if !known && !self.accepts_write_in() {
                return Err(AnswerIssue::UnknownOption(item.clone()));
            }
            if selected.len() > 1 && self.is_exclusive(item) {
                return Err(AnswerIssue::ExclusiveOption(item.clone()));
            }
        }
        Ok(())
    }
}

impl StepContract for FormStep {
    fn check_answer(&self, answer: Option<&AnswerValue>) -> Result<(), AnswerIssue> {
        let fields = match answer {
            Some(AnswerValue::Fields(fields)) => fields,
            Some(_) => return Err(AnswerIssue::TypeMismatch("form fields")),
            None => return Err(AnswerIssue::Missing),
        };
        for input in &self.form_inputs {
            let value = fields
                .get(&input.id)
                .map(|value| value.trim())
                .unwrap_or("");
            if value.is_empty() {
                if input.required {
                    return Err(AnswerIssue::MissingField(input.id.clone()));
                }
                continue;
            }
            if let Some(pattern) = &input.pattern
                && let Ok(regex) = Regex::new(pattern)
                && !regex.is_match(value)
            {
                return Err(AnswerIssue::PatternMismatch(input.id.clone()));
            }
        }
        Ok(())
    }
}

impl StepContract for ComponentStep {
    fn check_answer(&self, answer: Option<&AnswerValue>) -> Result<(), AnswerIssue> {
        match &self.component {
            ComponentKind::Bmi { min, max } => {
                let value = answer
                    .ok_or(AnswerIssue::Missing)?
                    .as_number()
                    .ok_or(AnswerIssue::TypeMismatch("a number"))?;
                let low = min.unwrap_or(0.0);
                let high = max.unwrap_or(f64::MAX);
                if value <= 0.0 || value < low || value > high {
                    return Err(AnswerIssue::OutOfRange {
                        value: format_number(value),
                        min: format_number(low),
                        max: max.map(format_number).unwrap_or_else(|| "∞".into()),
                    });
                }
                Ok(())
            }
            ComponentKind::Counter { min, max } => {
                let value = answer
                    .ok_or(AnswerIssue::Missing)?
                    .as_number()
                    .ok_or(AnswerIssue::TypeMismatch("a whole number"))?;
                if value.fract() != 0.0 {
                    return Err(AnswerIssue::TypeMismatch("a whole number"));
                }
                if value < *min as f64 || value > *max as f64 {
                    return Err(AnswerIssue::OutOfRange {
                        value: format_number(value),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(())
            }
            ComponentKind::Popup { .. } | ComponentKind::Info => Ok(()),
        }
    }
}

impl StepContract for StepKind {
    fn check_answer(&self, answer: Option<&AnswerValue>) -> Result<(), AnswerIssue> {
        match self {
            StepKind::Question(question) => question.check_answer(answer),
            StepKind::Form(form) => form.check_answer(answer),
            StepKind::Component(component) => component.check_answer(answer),
        }
    }
}

impl StepContract for StepSpec {
    fn check_answer(&self, answer: Option<&AnswerValue>) -> Result<(), AnswerIssue> {
        self.kind.check_answer(answer)
    }
}

/// True when the step can be left without recording anything.
pub fn answer_optional(step: &StepSpec) -> bool {
    if step.should_skip {
        return true;
    }
    matches!(&step.kind, StepKind::Component(component) if !component.component.requires_answer())
}
