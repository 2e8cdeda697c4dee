use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spec::flow::FlowRule;
use crate::spec::id::{Id, ResultId, StepId};
use crate::spec::step::StepSpec;

/// Catalog entry attached to a result. Only the id is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Id,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

/// Candidate recommendation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub id: ResultId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_product_id: Option<Id>,
    #[serde(default)]
    pub product_data: Vec<Product>,
}

/// Raw recommendation graph edge: answering `source` with the option at
/// `source_option_index` leads to `target` (a result or an intermediate node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: Id,
    pub source_option_index: usize,
    pub target: Id,
    /// Explicit alternates for edges that terminate at a result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_prods: Vec<ResultId>,
}

impl Edge {
    pub fn new(source: impl Into<Id>, source_option_index: usize, target: impl Into<Id>) -> Self {
        Self {
            source: source.into(),
            source_option_index,
            target: target.into(),
            alternative_prods: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LogicResults {
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Root quiz definition. Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: Id,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub flow: Vec<FlowRule>,
    #[serde(default)]
    pub logic_results: LogicResults,
    #[serde(default)]
    pub results: Vec<QuizResult>,
    #[serde(default)]
    pub pre_quiz: bool,
    #[serde(default)]
    pub require_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_quiz: Option<Id>,
}

impl Quiz {
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn result(&self, id: &str) -> Option<&QuizResult> {
        self.results.iter().find(|result| result.id == id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.logic_results.edges
    }

    /// Flags every `required_login` step as skippable for an authenticated
    /// user. Returns the ids that were flagged.
    pub fn mark_login_steps(&mut self, authenticated: bool) -> Vec<StepId> {
        if !authenticated {
            return Vec::new();
        }
        self.steps
            .iter_mut()
            .filter(|step| step.required_login && !step.should_skip)
            .map(|step| {
                step.should_skip = true;
                step.id.clone()
            })
            .collect()
    }
}
