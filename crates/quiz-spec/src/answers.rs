use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::spec::id::StepId;

/// Normalized answer recorded for one step.
///
/// Wire payloads arrive in several nestings (`{value: {answer}}`,
/// `{answer}`, raw values); [`AnswerValue::from_wire`] collapses them once so
/// nothing downstream branches on shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Single-select label or write-in text.
    Choice(String),
    /// Numeric component output (BMI, counters).
    Number(f64),
    /// Multi-select labels.
    Choices(Vec<String>),
    /// Form input id to value.
    Fields(BTreeMap<String, String>),
}

impl AnswerValue {
    pub fn from_wire(value: &Value) -> Option<Self> {
        match unwrap_answer(value) {
            Value::Null => None,
            Value::String(text) => Some(AnswerValue::Choice(text.clone())),
            Value::Bool(flag) => Some(AnswerValue::Choice(flag.to_string())),
            Value::Number(number) => number.as_f64().map(AnswerValue::Number),
            Value::Array(items) => Some(AnswerValue::Choices(
                items.iter().filter_map(scalar_text).collect(),
            )),
            Value::Object(map) => Some(AnswerValue::Fields(
                map.iter()
                    .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
                    .collect(),
            )),
        }
    }

    pub fn to_wire(&self) -> Value {
        json!({ "answer": self })
    }

    /// True when nothing meaningful has been entered.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Choice(text) => text.trim().is_empty(),
            AnswerValue::Number(number) => !number.is_finite(),
            AnswerValue::Choices(items) => items.iter().all(|item| item.trim().is_empty()),
            AnswerValue::Fields(fields) => fields.values().all(|value| value.trim().is_empty()),
        }
    }

    /// Equality for scalars, membership for multi-select answers.
    pub fn selects(&self, expected: &str) -> bool {
        match self {
            AnswerValue::Choice(text) => text == expected,
            AnswerValue::Number(number) => format_number(*number) == expected,
            AnswerValue::Choices(items) => items.iter().any(|item| item == expected),
            AnswerValue::Fields(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(number) => Some(*number),
            AnswerValue::Choice(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Human-friendly rendering.
    pub fn display(&self) -> String {
        match self {
            AnswerValue::Choice(text) => text.clone(),
            AnswerValue::Number(number) => format_number(*number),
            AnswerValue::Choices(items) => items.join(", "),
            AnswerValue::Fields(fields) => fields
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Renders numbers the way upstream string comparison does: integral values
/// lose their fractional part.
pub fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

fn unwrap_answer(mut value: &Value) -> &Value {
    loop {
        match value.as_object() {
            Some(map) if map.contains_key("answer") => value = &map["answer"],
            Some(map) if map.len() == 1 && map.contains_key("value") => value = &map["value"],
            _ => return value,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => number.as_f64().map(format_number),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// One recorded answer, also the shape submitted on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub question_id: StepId,
    pub answer: AnswerValue,
}

/// Ordered mapping from question id to the most recent answer in a session.
///
/// Entries keep their first-insertion position; re-answering overwrites in
/// place. Nothing is ever pruned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AnswerStore {
    entries: Vec<AnswerEntry>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a persisted `{ questionId: answer }` map.
    pub fn from_wire(value: &Value) -> Self {
        let mut store = Self::new();
        if let Some(map) = value.as_object() {
            for (question_id, raw) in map {
                if let Some(answer) = AnswerValue::from_wire(raw) {
                    store.insert(question_id.as_str(), answer);
                }
            }
        }
        store
    }

    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();
        for entry in &self.entries {
            map.insert(entry.question_id.to_string(), entry.answer.to_wire());
        }
        Value::Object(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.entries
            .iter()
            .find(|entry| entry.question_id == question_id)
            .map(|entry| &entry.answer)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.get(question_id).is_some()
    }

    /// Records `answer`, returning the value it replaced.
    pub fn insert(
        &mut self,
        question_id: impl Into<StepId>,
        answer: AnswerValue,
    ) -> Option<AnswerValue> {
        let question_id = question_id.into();
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.question_id == question_id)
        {
            Some(entry) => Some(std::mem::replace(&mut entry.answer, answer)),
            None => {
                self.entries.push(AnswerEntry {
                    question_id,
                    answer,
                });
                None
            }
        }
    }

    /// Adds every entry of `other`, later values winning.
    pub fn merge(&mut self, other: AnswerStore) {
        for entry in other.entries {
            self.insert(entry.question_id, entry.answer);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnswerEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[AnswerEntry] {
        &self.entries
    }
}

impl<K: Into<StepId>> FromIterator<(K, AnswerValue)> for AnswerStore {
    fn from_iter<T: IntoIterator<Item = (K, AnswerValue)>>(iter: T) -> Self {
        let mut store = Self::new();
        for (question_id, answer) in iter {
            store.insert(question_id, answer);
        }
        store
    }
}
