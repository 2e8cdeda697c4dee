use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::rules::{Constraint, Rule};
use crate::spec::id::{Id, ResultId};
use crate::spec::quiz::{Edge, Quiz};

struct EdgeGraph<'a> {
    questions: BTreeSet<&'a str>,
    results: BTreeSet<&'a str>,
    incoming: BTreeMap<&'a str, Vec<&'a Edge>>,
}

impl<'a> EdgeGraph<'a> {
    fn new(edges: &'a [Edge], quiz: &'a Quiz) -> Self {
        let mut incoming: BTreeMap<&str, Vec<&Edge>> = BTreeMap::new();
        for edge in edges {
            incoming.entry(edge.target.as_str()).or_default().push(edge);
        }
        Self {
            questions: quiz.steps.iter().map(|step| step.id.as_str()).collect(),
            results: quiz.results.iter().map(|result| result.id.as_str()).collect(),
            incoming,
        }
    }

    fn is_result(&self, id: &Id) -> bool {
        self.results.contains(id.as_str())
    }

    fn is_question(&self, id: &Id) -> bool {
        self.questions.contains(id.as_str())
    }

    fn predecessors(&self, node: &Id) -> &[&'a Edge] {
        self.incoming
            .get(node.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Compiles the recommendation graph into matchable rules.
///
/// Terminal edges (those targeting a result) are grouped by result in
/// first-seen order; every backward path from a terminal edge to a root
/// becomes one rule. Intermediate nodes that are not steps pass through
/// without adding a constraint. Paths that constrain one question to two
/// different options, revisit a node, or carry no constraint at all are
/// dropped. The output is stably sorted by the first constraint's question id
/// and option index, so identical input always yields identical rules.
pub fn compile_rules(edges: &[Edge], quiz: &Quiz) -> Vec<Rule> {
    let graph = EdgeGraph::new(edges, quiz);

    let mut groups: Vec<(&ResultId, Vec<&Edge>)> = Vec::new();
    for edge in edges.iter().filter(|edge| graph.is_result(&edge.target)) {
        match groups.iter_mut().find(|(target, _)| **target == edge.target) {
            Some((_, members)) => members.push(edge),
            None => groups.push((&edge.target, vec![edge])),
        }
    }

    let mut rules = Vec::new();
    for (target, terminal_edges) in groups {
        for edge in terminal_edges {
            let alternatives = alternatives_for(edge, edges, &graph);
            let mut paths = Vec::new();
            walk_back(edge, &graph, Vec::new(), Vec::new(), &mut paths);
            for constraints in paths {
                if constraints.is_empty() {
                    debug!(result = %target, "dropping unconstrained recommendation path");
                    continue;
                }
                let rule = Rule {
                    constraints,
                    result: target.clone(),
                    alternative_prods: alternatives.clone(),
                };
                if !rules.contains(&rule) {
                    rules.push(rule);
                }
            }
        }
    }

    rules.sort_by(|left, right| sort_key(left).cmp(&sort_key(right)));
    rules
}

fn sort_key(rule: &Rule) -> (&str, usize) {
    rule.constraints
        .first()
        .map(|constraint| (constraint.question_id.as_str(), constraint.option_index))
        .unwrap_or(("", 0))
}

fn walk_back<'a>(
    edge: &'a Edge,
    graph: &EdgeGraph<'a>,
    mut path: Vec<Constraint>,
    mut visited: Vec<&'a str>,
    out: &mut Vec<Vec<Constraint>>,
) {
    let source = &edge.source;
    if graph.is_question(source)
        && let Some(existing) = path
            .iter()
            .find(|constraint| &constraint.question_id == source)
        && existing.option_index != edge.source_option_index
    {
        debug!(
            question = %source,
            first = existing.option_index,
            second = edge.source_option_index,
            "dropping contradictory recommendation path"
        );
        return;
    }
    if visited.contains(&source.as_str()) {
        debug!(node = %source, "dropping cyclic recommendation path");
        return;
    }
    visited.push(source.as_str());
    if graph.is_question(source) {
        path.push(Constraint {
            question_id: source.clone(),
            option_index: edge.source_option_index,
        });
    }

    let predecessors = graph.predecessors(source);
    if predecessors.is_empty() {
        path.reverse();
        out.push(path);
        return;
    }
    for predecessor in predecessors {
        walk_back(*predecessor, graph, path.clone(), visited.clone(), out);
    }
}

/// Explicit alternates on the edge, otherwise the results reached from the
/// same source through a different option.
fn alternatives_for(edge: &Edge, edges: &[Edge], graph: &EdgeGraph<'_>) -> Vec<ResultId> {
    if !edge.alternative_prods.is_empty() {
        return edge.alternative_prods.clone();
    }
    let mut alternatives: Vec<ResultId> = Vec::new();
    for sibling in edges {
        if sibling.source == edge.source
            && sibling.source_option_index != edge.source_option_index
            && sibling.target != edge.target
            && graph.is_result(&sibling.target)
            && !alternatives.contains(&sibling.target)
        {
            alternatives.push(sibling.target.clone());
        }
    }
    alternatives
}
