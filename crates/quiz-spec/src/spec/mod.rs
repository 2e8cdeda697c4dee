pub mod flow;
pub mod id;
pub mod quiz;
pub mod step;

pub use flow::{Condition, ConditionContext, FlowRule, FlowSource, FlowTarget};
pub use id::{Id, ResultId, StepId};
pub use quiz::{Edge, LogicResults, Product, Quiz, QuizResult};
pub use step::{
    ComponentKind, ComponentStep, FormInput, FormStep, OptionSpec, QuestionStep, QuestionType,
    StepKind, StepSpec,
};
