#![allow(missing_docs)]

pub mod answers;
pub mod branching;
pub mod resume;
pub mod rules;
pub mod spec;
pub mod validate;

pub use answers::{AnswerEntry, AnswerStore, AnswerValue};
pub use branching::{
    NextStep, first_presentable, matching_rule, previous_presentable, resolve_next,
};
pub use resume::resume_index;
pub use rules::{Constraint, Rule, RuleMatch, answer_key, compile_rules, match_rule, rule_satisfied};
pub use spec::{
    ComponentKind, ComponentStep, Condition, ConditionContext, Edge, FlowRule, FlowSource,
    FlowTarget, FormInput, FormStep, Id, LogicResults, OptionSpec, Product, QuestionStep,
    QuestionType, Quiz, QuizResult, ResultId, StepId, StepKind, StepSpec,
};
pub use validate::{
    AnswerIssue, DefinitionProblem, QuizError, QuizValidation, StepContract, answer_optional,
    validate_quiz,
};
