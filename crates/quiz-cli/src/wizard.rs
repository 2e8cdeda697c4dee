use quiz_engine::{Completion, Navigation, Notice, Session};
use quiz_spec::{ComponentKind, Quiz, StepKind, StepSpec, answer_optional};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: step prompts only.
    Clean,
    /// Verbose output: progress, current answers, error details.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints prompts and outcomes while the engine drives the quiz.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_answers_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_answers_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_answers_json,
        }
    }

    pub fn show_header(&mut self, quiz: &Quiz) {
        if self.header_printed {
            return;
        }
        if quiz.title.is_empty() {
            println!("Quiz: {}", quiz.id);
        } else {
            println!("Quiz: {}", quiz.title);
        }
        if self.verbosity.is_verbose() {
            println!("Type 'back' to return to the previous step, 'exit' to stop.");
        }
        self.header_printed = true;
    }

    pub fn show_status(&self, session: &Session) {
        if self.verbosity.is_verbose() {
            println!(
                "Status: step {} ({} answered, visited {:?})",
                session.current_step_index,
                session.answers.len(),
                session.visited_steps
            );
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.title);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        if let Some(description) = &prompt.description {
            println!("{}", description);
        }
        for (index, choice) in prompt.choices.iter().enumerate() {
            println!("  {}) {}", index + 1, choice);
        }
        if self.verbosity.is_verbose()
            && let Some(current) = &prompt.current
        {
            println!("Current answer: {}", current);
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_notice(&self, notice: &Notice) {
        eprintln!("{}", notice);
    }

    pub fn show_completion(&self, completion: &Completion, session: &Session) {
        println!("Done ✅");
        match &completion.result {
            Some(result) => println!("Recommended: {} ({})", result.title, result.id),
            None => println!("No recommendation for these answers."),
        }
        for alternate in &completion.alternates {
            println!("Alternative: {} ({})", alternate.title, alternate.id);
        }
        if let Navigation::MainQuiz(main) = &completion.navigation {
            println!("Continue with quiz {}", main);
        }
        match session.to_cbor() {
            Ok(bytes) => println!("Session (CBOR hex): {}", encode_hex(&bytes)),
            Err(err) => eprintln!("Failed to serialize session to CBOR: {}", err),
        }
        if self.show_answers_json {
            match serde_json::to_string_pretty(&session.answers.to_wire()) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize answers to JSON: {}", err),
            }
        }
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<String>,
    pub current: Option<String>,
}

impl PromptContext {
    pub fn new(step: &StepSpec, index: usize, total: usize, current: Option<String>) -> Self {
        let title = if step.title.is_empty() {
            step.id.to_string()
        } else {
            step.title.clone()
        };
        Self {
            index: index + 1,
            total,
            title,
            description: step.description.clone().or_else(|| popup_message(step)),
            required: !answer_optional(step),
            hint: hint_for(step),
            choices: step
                .options()
                .iter()
                .map(|option| option.text.clone())
                .collect(),
            current,
        }
    }
}

fn popup_message(step: &StepSpec) -> Option<String> {
    match &step.kind {
        StepKind::Component(component) => match &component.component {
            ComponentKind::Popup { message } if !message.is_empty() => Some(message.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn hint_for(step: &StepSpec) -> Option<String> {
    match &step.kind {
        StepKind::Question(question) => {
            let mut hint = if question.question_type.is_multiple() {
                "(numbers or labels, comma-separated".to_string()
            } else {
                "(number or label".to_string()
            };
            if question.accepts_write_in() {
                hint.push_str(", or your own text");
            }
            hint.push(')');
            Some(hint)
        }
        StepKind::Form(_) => Some("(one value per field)".to_string()),
        StepKind::Component(component) => match &component.component {
            ComponentKind::Bmi { .. } => Some("(BMI as a number)".to_string()),
            ComponentKind::Counter { min, max } => Some(format!("(whole number {}..={})", min, max)),
            ComponentKind::Popup { .. } | ComponentKind::Info => {
                Some("(press enter to continue)".to_string())
            }
        },
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
