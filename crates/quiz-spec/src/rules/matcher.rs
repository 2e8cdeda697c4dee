use tracing::{debug, warn};

use crate::answers::{AnswerStore, AnswerValue, format_number};
use crate::rules::Rule;
use crate::spec::quiz::{Quiz, QuizResult};

/// Rule selected for a finished answer set, resolved against the quiz results.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule: Rule,
    pub result: QuizResult,
    pub alternates: Vec<QuizResult>,
}

/// Returns the first rule whose constraints all hold.
///
/// There is no partial-match scoring and no conflict detection: when two
/// rules fit the same answers, the earlier one in `rules` wins. `None` means
/// "no recommendation", not a failure.
pub fn match_rule(rules: &[Rule], answers: &AnswerStore, quiz: &Quiz) -> Option<RuleMatch> {
    let Some(rule) = rules.iter().find(|rule| rule_satisfied(rule, answers, quiz)) else {
        debug!(rules = rules.len(), "no recommendation rule matched");
        return None;
    };
    let Some(result) = quiz.result(rule.result.as_str()) else {
        warn!(result = %rule.result, "matched rule points at an unknown result");
        return None;
    };
    let alternates = quiz
        .results
        .iter()
        .filter(|candidate| rule.alternative_prods.contains(&candidate.id))
        .cloned()
        .collect();
    Some(RuleMatch {
        rule: rule.clone(),
        result: result.clone(),
        alternates,
    })
}

/// True when every constraint of `rule` equals the recorded answer key.
pub fn rule_satisfied(rule: &Rule, answers: &AnswerStore, quiz: &Quiz) -> bool {
    rule.constraints.iter().all(|constraint| {
        answers
            .get(constraint.question_id.as_str())
            .and_then(|answer| answer_key(quiz, constraint.question_id.as_str(), answer))
            .is_some_and(|key| key == constraint.option_index.to_string())
    })
}

/// String form of an answer compared against a rule's option index.
///
/// Option labels are translated to their index on the question; anything
/// that does not name an option (already an index, free text) is compared
/// verbatim. Multi-select answers join their keys with commas.
pub fn answer_key(quiz: &Quiz, question_id: &str, answer: &AnswerValue) -> Option<String> {
    let question = quiz.step(question_id).and_then(|step| step.question());
    let key_of = |text: &str| {
        question
            .and_then(|question| question.option_index_of(text))
            .map(|index| index.to_string())
            .unwrap_or_else(|| text.to_string())
    };
    match answer {
        AnswerValue::Choice(text) => Some(key_of(text)),
        AnswerValue::Number(number) => Some(format_number(*number)),
        AnswerValue::Choices(items) => Some(
            items
                .iter()
                .map(|item| key_of(item))
                .collect::<Vec<_>>()
                .join(","),
        ),
        AnswerValue::Fields(_) => None,
    }
}
