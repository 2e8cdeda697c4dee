//! Recommendation rules derived from `logicResults.edges`.
//!
//! A rule is a conjunction of `question -> option index` constraints that
//! resolves to one result plus optional alternates. Rules are matched in
//! compiled order and the first full match wins; overlapping rules are not
//! detected, so ordering alone decides between them.

pub mod compile;
pub mod matcher;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::spec::id::{ResultId, StepId};

pub use compile::compile_rules;
pub use matcher::{RuleMatch, answer_key, match_rule, rule_satisfied};

/// Required answer for one question.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Constraint {
    pub question_id: StepId,
    pub option_index: usize,
}

/// Compiled recommendation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Ordered from the graph root toward the result.
    pub constraints: Vec<Constraint>,
    pub result: ResultId,
    pub alternative_prods: Vec<ResultId>,
}

impl Rule {
    pub fn expected(&self, question_id: &str) -> Option<usize> {
        self.constraints
            .iter()
            .find(|constraint| constraint.question_id == question_id)
            .map(|constraint| constraint.option_index)
    }
}

// Wire shape: `{ "<questionId>": <optionIndex>, ..., "result": id, "alternativeProds": [..] }`.
impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.constraints.len() + 2))?;
        for constraint in &self.constraints {
            map.serialize_entry(constraint.question_id.as_str(), &constraint.option_index)?;
        }
        map.serialize_entry("result", &self.result)?;
        map.serialize_entry("alternativeProds", &self.alternative_prods)?;
        map.end()
    }
}
