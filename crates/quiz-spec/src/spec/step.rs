use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answers::AnswerValue;
use crate::spec::id::StepId;

/// Supported question widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    DropdownList,
}

impl QuestionType {
    pub fn is_multiple(&self) -> bool {
        matches!(self, QuestionType::MultipleChoice)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single-choice",
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::TrueFalse => "true-false",
            QuestionType::DropdownList => "dropdown-list",
        }
    }
}

/// One selectable option of a question step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    pub text: String,
    /// Selecting this option clears every sibling selection.
    #[serde(default)]
    pub unselect_other: bool,
    /// The option accepts a free-text answer in place of its label.
    #[serde(default)]
    pub has_textarea: bool,
}

impl OptionSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            unselect_other: false,
            has_textarea: false,
        }
    }
}

/// Question payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStep {
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
}

impl QuestionStep {
    /// Index of the option an answer text refers to.
    ///
    /// Exact label matches win, then in-range numeric indices; anything else
    /// lands on the (single) textarea option as a write-in.
    pub fn option_index_of(&self, text: &str) -> Option<usize> {
        if let Some(index) = self.options.iter().position(|option| option.text == text) {
            return Some(index);
        }
        if let Ok(index) = text.trim().parse::<usize>()
            && index < self.options.len()
        {
            return Some(index);
        }
        let mut write_ins = self
            .options
            .iter()
            .enumerate()
            .filter(|(_, option)| option.has_textarea);
        match (write_ins.next(), write_ins.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }

    /// Applies a click on option `index` to the current selection.
    ///
    /// Single-select widgets replace the answer. Multi-select widgets toggle
    /// the option, honoring `unselect_other` exclusivity in both directions.
    pub fn toggle(&self, current: Option<&AnswerValue>, index: usize) -> Option<AnswerValue> {
        let option = self.options.get(index)?;
        if !self.question_type.is_multiple() {
            return Some(AnswerValue::Choice(option.text.clone()));
        }

        let mut selected = match current {
            Some(AnswerValue::Choices(items)) => items.clone(),
            Some(AnswerValue::Choice(item)) if !item.is_empty() => vec![item.clone()],
            _ => Vec::new(),
        };

        if let Some(position) = selected.iter().position(|item| item == &option.text) {
            selected.remove(position);
            return Some(AnswerValue::Choices(selected));
        }

        if option.unselect_other {
            return Some(AnswerValue::Choices(vec![option.text.clone()]));
        }

        selected.retain(|item| !self.is_exclusive(item));
        selected.push(option.text.clone());
        Some(AnswerValue::Choices(selected))
    }

    /// Records free text against a textarea option.
    pub fn write_in(&self, index: usize, text: &str) -> Option<AnswerValue> {
        let option = self.options.get(index)?;
        if !option.has_textarea {
            return None;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if self.question_type.is_multiple() {
            Some(AnswerValue::Choices(vec![trimmed.to_string()]))
        } else {
            Some(AnswerValue::Choice(trimmed.to_string()))
        }
    }

    pub fn is_exclusive(&self, text: &str) -> bool {
        self.options
            .iter()
            .any(|option| option.unselect_other && option.text == text)
    }

    pub fn accepts_write_in(&self) -> bool {
        self.options.iter().any(|option| option.has_textarea)
    }
}

/// A single input of a form step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormInput {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Form payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormStep {
    #[serde(default)]
    pub form_inputs: Vec<FormInput>,
}

/// Closed set of custom step components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum ComponentKind {
    /// Body-mass-index calculator; the answer is the computed BMI.
    Bmi {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Numeric counter.
    Counter {
        #[serde(default)]
        min: i64,
        #[serde(default = "default_counter_max")]
        max: i64,
    },
    /// Acknowledgement popup.
    Popup {
        #[serde(default)]
        message: String,
    },
    /// Informational screen.
    Info,
}

fn default_counter_max() -> i64 {
    i64::MAX
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Bmi { .. } => "bmi",
            ComponentKind::Counter { .. } => "counter",
            ComponentKind::Popup { .. } => "popup",
            ComponentKind::Info => "info",
        }
    }

    pub fn requires_answer(&self) -> bool {
        matches!(self, ComponentKind::Bmi { .. } | ComponentKind::Counter { .. })
    }
}

/// Component payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComponentStep {
    pub component: ComponentKind,
}

/// Step payload keyed by `stepType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "stepType", rename_all = "kebab-case")]
pub enum StepKind {
    Question(QuestionStep),
    Form(FormStep),
    Component(ComponentStep),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Question(_) => "question",
            StepKind::Form(_) => "form",
            StepKind::Component(_) => "component",
        }
    }
}

/// One screen of a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub id: StepId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub should_skip: bool,
    #[serde(default)]
    pub required_login: bool,
}

impl StepSpec {
    pub fn question(&self) -> Option<&QuestionStep> {
        match &self.kind {
            StepKind::Question(question) => Some(question),
            _ => None,
        }
    }

    pub fn options(&self) -> &[OptionSpec] {
        self.question()
            .map(|question| question.options.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi() -> QuestionStep {
        QuestionStep {
            question_type: QuestionType::MultipleChoice,
            options: vec![
                OptionSpec::new("Headache"),
                OptionSpec::new("Nausea"),
                OptionSpec {
                    text: "None of the above".into(),
                    unselect_other: true,
                    has_textarea: false,
                },
            ],
        }
    }

    #[test]
    fn exclusive_option_clears_siblings() {
        let step = multi();
        let first = step.toggle(None, 0).expect("toggle");
        let second = step.toggle(Some(&first), 1).expect("toggle");
        assert_eq!(
            second,
            AnswerValue::Choices(vec!["Headache".into(), "Nausea".into()])
        );
        let exclusive = step.toggle(Some(&second), 2).expect("toggle");
        assert_eq!(
            exclusive,
            AnswerValue::Choices(vec!["None of the above".into()])
        );
        let replaced = step.toggle(Some(&exclusive), 0).expect("toggle");
        assert_eq!(replaced, AnswerValue::Choices(vec!["Headache".into()]));
    }

    #[test]
    fn toggling_selected_option_removes_it() {
        let step = multi();
        let first = step.toggle(None, 1).expect("toggle");
        let cleared = step.toggle(Some(&first), 1).expect("toggle");
        assert_eq!(cleared, AnswerValue::Choices(vec![]));
        assert!(step.toggle(None, 9).is_none());
    }

    #[test]
    fn write_in_maps_back_to_textarea_option() {
        let step = QuestionStep {
            question_type: QuestionType::SingleChoice,
            options: vec![
                OptionSpec::new("Daily"),
                OptionSpec {
                    text: "Other".into(),
                    unselect_other: false,
                    has_textarea: true,
                },
            ],
        };
        assert!(step.write_in(0, "weekly").is_none());
        let answer = step.write_in(1, " twice a week ").expect("write-in");
        assert_eq!(answer, AnswerValue::Choice("twice a week".into()));
        assert_eq!(step.option_index_of("twice a week"), Some(1));
        assert_eq!(step.option_index_of("Daily"), Some(0));
    }

    #[test]
    fn step_type_tag_selects_payload() {
        let step: StepSpec = serde_json::from_value(serde_json::json!({
            "id": 3,
            "title": "Height and weight",
            "stepType": "component",
            "component": { "name": "bmi", "min": 18.5 }
        }))
        .expect("step");
        assert_eq!(step.id, "3");
        assert!(matches!(
            step.kind,
            StepKind::Component(ComponentStep {
                component: ComponentKind::Bmi { min: Some(_), max: None }
            })
        ));
        assert!(step.options().is_empty());
    }
}
