use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use quiz_spec::{
    AnswerStore, AnswerValue, NextStep, Quiz, QuizError, StepContract, answer_optional,
    compile_rules as compile_quiz_rules, match_rule, resolve_next, resume_index as quiz_resume,
    validate_quiz,
};

const DEFAULT_QUIZ: &str = include_str!("../../quiz-spec/tests/fixtures/intake_quiz.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("quiz '{0}' is not available")]
    QuizUnavailable(String),
    #[error(transparent)]
    Malformed(#[from] QuizError),
    #[error("step '{0}' is not part of the quiz")]
    UnknownStep(String),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    quiz_json: Option<String>,
}

fn load_quiz(config_json: &str) -> Result<Quiz, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let quiz_json = config.quiz_json.as_deref().unwrap_or(DEFAULT_QUIZ);

    serde_json::from_str(quiz_json).map_err(ComponentError::ConfigParse)
}

fn ensure_quiz(quiz_id: &str, config_json: &str) -> Result<Quiz, ComponentError> {
    let quiz = load_quiz(config_json)?;
    if quiz.id != quiz_id {
        Err(ComponentError::QuizUnavailable(quiz_id.to_string()))
    } else {
        Ok(quiz)
    }
}

/// Like [`ensure_quiz`], but also refuses definitions that cannot run.
fn ensure_runnable(quiz_id: &str, config_json: &str) -> Result<Quiz, ComponentError> {
    let quiz = ensure_quiz(quiz_id, config_json)?;
    validate_quiz(&quiz).into_result(quiz_id)?;
    Ok(quiz)
}

fn parse_answers(answers_json: &str) -> AnswerStore {
    serde_json::from_str::<Value>(answers_json)
        .map(|value| AnswerStore::from_wire(&value))
        .unwrap_or_default()
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn step_payload(quiz: &Quiz, index: usize) -> Value {
    json!({
        "step_index": index,
        "step_id": quiz.steps.get(index).map(|step| step.id.as_str()),
    })
}

pub fn describe(quiz_id: &str, config_json: &str) -> String {
    respond(
        ensure_quiz(quiz_id, config_json)
            .and_then(|quiz| serde_json::to_value(quiz).map_err(ComponentError::JsonEncode)),
    )
}

pub fn validate_definition(quiz_id: &str, config_json: &str) -> String {
    respond(ensure_quiz(quiz_id, config_json).and_then(|quiz| {
        serde_json::to_value(validate_quiz(&quiz)).map_err(ComponentError::JsonEncode)
    }))
}

pub fn check_answer(
    quiz_id: &str,
    config_json: &str,
    question_id: &str,
    value_json: &str,
) -> String {
    respond(ensure_runnable(quiz_id, config_json).and_then(|quiz| {
        let step = quiz
            .step(question_id)
            .ok_or_else(|| ComponentError::UnknownStep(question_id.to_string()))?;
        let raw: Value = serde_json::from_str(value_json).map_err(ComponentError::ConfigParse)?;
        let answer = AnswerValue::from_wire(&raw);
        let outcome = if answer.is_none() && answer_optional(step) {
            Ok(())
        } else {
            step.check_answer(answer.as_ref())
        };
        Ok(match outcome {
            Ok(()) => json!({ "valid": true }),
            Err(issue) => json!({ "valid": false, "issue": issue.to_string() }),
        })
    }))
}

pub fn resume_index(quiz_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(ensure_runnable(quiz_id, config_json).map(|quiz| {
        let answers = parse_answers(answers_json);
        step_payload(&quiz, quiz_resume(&quiz.steps, &answers))
    }))
}

pub fn next_step(
    quiz_id: &str,
    config_json: &str,
    current_index: usize,
    answers_json: &str,
) -> String {
    respond(ensure_runnable(quiz_id, config_json).and_then(|quiz| {
        let step = quiz
            .steps
            .get(current_index)
            .ok_or_else(|| ComponentError::UnknownStep(current_index.to_string()))?;
        let answers = parse_answers(answers_json);
        let answer = answers.get(step.id.as_str());
        let progress = json!({
            "answered": quiz.steps.iter().filter(|step| answers.contains(step.id.as_str())).count(),
            "total": quiz.steps.len(),
        });
        Ok(match resolve_next(&quiz, current_index, answer, &answers) {
            NextStep::Step(index) => {
                let mut payload = step_payload(&quiz, index);
                payload["status"] = json!("need_input");
                payload["progress"] = progress;
                payload
            }
            NextStep::Complete => json!({
                "status": "complete",
                "step_index": null,
                "step_id": null,
                "progress": progress,
            }),
        })
    }))
}

pub fn compile_rules(quiz_id: &str, config_json: &str) -> String {
    respond(ensure_runnable(quiz_id, config_json).and_then(|quiz| {
        serde_json::to_value(compile_quiz_rules(quiz.edges(), &quiz))
            .map_err(ComponentError::JsonEncode)
    }))
}

pub fn recommend(quiz_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(ensure_runnable(quiz_id, config_json).and_then(|quiz| {
        let rules = compile_quiz_rules(quiz.edges(), &quiz);
        let answers = parse_answers(answers_json);
        let Some(matched) = match_rule(&rules, &answers, &quiz) else {
            return Ok(json!({ "result": null, "alternates": [] }));
        };
        Ok(json!({
            "result": serde_json::to_value(&matched.result).map_err(ComponentError::JsonEncode)?,
            "alternates": serde_json::to_value(&matched.alternates)
                .map_err(ComponentError::JsonEncode)?,
            "rule": serde_json::to_value(&matched.rule).map_err(ComponentError::JsonEncode)?,
        }))
    }))
}

/// Applies a click on option `index` of `question_id` and returns the
/// updated answers in wire form.
pub fn toggle_option(
    quiz_id: &str,
    config_json: &str,
    answers_json: &str,
    question_id: &str,
    index: usize,
) -> String {
    respond(ensure_runnable(quiz_id, config_json).and_then(|quiz| {
        let question = quiz
            .step(question_id)
            .and_then(|step| step.question())
            .ok_or_else(|| ComponentError::UnknownStep(question_id.to_string()))?;
        let mut answers = parse_answers(answers_json);
        if let Some(value) = question.toggle(answers.get(question_id), index) {
            answers.insert(question_id, value);
        }
        Ok(answers.to_wire())
    }))
}
