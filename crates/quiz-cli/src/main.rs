mod wizard;

use clap::{Parser, Subcommand};
use quiz_engine::{EngineConfig, EngineError, MemoryBackend, Notice, QuizFlowEngine, Transition};
use quiz_spec::{
    AnswerStore, AnswerValue, ComponentKind, FormStep, QuestionStep, Quiz, StepKind, StepSpec,
    resume_index, validate_quiz,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use wizard::{AnswerParseError, PromptContext, Verbosity, WizardPresenter};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const CONFIG_ENV: &str = "QUIZ_FLOW_CONFIG";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Text-based quiz flow runner",
    long_about = "Runs branching quiz definitions in a text shell and inspects their flow and recommendation rules"
)]
struct Cli {
    /// Log engine decisions to stderr.
    #[arg(long, global = true, alias = "debug")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a quiz interactively.
    Run {
        /// Path to the quiz definition JSON.
        #[arg(long, value_name = "QUIZ")]
        quiz: PathBuf,
        /// Previously saved answers to resume from.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Engine configuration JSON (defaults to $QUIZ_FLOW_CONFIG).
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Run as a signed-in user.
        #[arg(long)]
        authenticated: bool,
        /// Also print the final answers as JSON.
        #[arg(long)]
        answers_json: bool,
    },
    /// Check a quiz definition for problems.
    Validate {
        #[arg(long, value_name = "QUIZ")]
        quiz: PathBuf,
    },
    /// Print the compiled recommendation rules.
    Rules {
        #[arg(long, value_name = "QUIZ")]
        quiz: PathBuf,
    },
    /// Match an answer set against the recommendation rules.
    Recommend {
        #[arg(long, value_name = "QUIZ")]
        quiz: PathBuf,
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Show the step a saved answer set resumes at.
    Resume {
        #[arg(long, value_name = "QUIZ")]
        quiz: PathBuf,
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Print the JSON Schema of quiz definitions.
    Schema,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Run {
            quiz,
            answers,
            config,
            authenticated,
            answers_json,
        } => {
            let config = load_config(config, authenticated)?;
            run_quiz(quiz, answers, config, cli.verbose, answers_json).await
        }
        Command::Validate { quiz } => run_validate(quiz),
        Command::Rules { quiz } => run_rules(quiz),
        Command::Recommend { quiz, answers } => run_recommend(quiz, answers),
        Command::Resume { quiz, answers } => run_resume(quiz, answers),
        Command::Schema => run_schema(),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(path: Option<PathBuf>, authenticated: bool) -> CliResult<EngineConfig> {
    let path = path.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = match path {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
            EngineConfig::from_json(&raw)?
        }
        None => EngineConfig::default(),
    };
    Ok(if authenticated {
        config.authenticated(true)
    } else {
        config
    })
}

fn read_quiz(path: &PathBuf) -> CliResult<Quiz> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read quiz {}: {}", path.display(), err))?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_answers(path: &PathBuf) -> CliResult<Value> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read answers {}: {}", path.display(), err))?;
    Ok(serde_json::from_str(&raw)?)
}

fn run_validate(quiz_path: PathBuf) -> CliResult<()> {
    let quiz = read_quiz(&quiz_path)?;
    let report = validate_quiz(&quiz);
    println!(
        "Validation result: {}",
        if report.valid { "valid" } else { "invalid" }
    );
    for problem in &report.problems {
        println!("  {} - {} [{}]", problem.path, problem.message, problem.code);
    }
    if report.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

/// Wraps a quiz definition into the JSON config the component facade expects.
fn component_config(quiz_path: &PathBuf) -> CliResult<(String, String)> {
    let raw = fs::read_to_string(quiz_path)
        .map_err(|err| format!("failed to read quiz {}: {}", quiz_path.display(), err))?;
    let quiz: Quiz = serde_json::from_str(&raw)?;
    let config = json!({ "quiz_json": raw }).to_string();
    Ok((quiz.id.to_string(), config))
}

fn print_component_payload(payload: &str) -> CliResult<()> {
    let value: Value = serde_json::from_str(payload)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(error.to_string().into());
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_rules(quiz_path: PathBuf) -> CliResult<()> {
    let (quiz_id, config) = component_config(&quiz_path)?;
    print_component_payload(&quiz_component::compile_rules(&quiz_id, &config))
}

fn run_recommend(quiz_path: PathBuf, answers_path: PathBuf) -> CliResult<()> {
    let (quiz_id, config) = component_config(&quiz_path)?;
    let answers = read_answers(&answers_path)?.to_string();
    print_component_payload(&quiz_component::recommend(&quiz_id, &config, &answers))
}

fn run_resume(quiz_path: PathBuf, answers_path: PathBuf) -> CliResult<()> {
    let quiz = read_quiz(&quiz_path)?;
    let answers = AnswerStore::from_wire(&read_answers(&answers_path)?);
    let index = resume_index(&quiz.steps, &answers);
    let step_id = quiz
        .steps
        .get(index)
        .map(|step| step.id.to_string())
        .unwrap_or_default();
    println!("Resume at step {} ({})", index, step_id);
    Ok(())
}

fn run_schema() -> CliResult<()> {
    let schema = schemars::schema_for!(Quiz);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn run_quiz(
    quiz_path: PathBuf,
    answers_path: Option<PathBuf>,
    config: EngineConfig,
    verbose: bool,
    answers_json: bool,
) -> CliResult<()> {
    let quiz = read_quiz(&quiz_path)?;
    let backend = Arc::new(MemoryBackend::new());
    let ticket = match answers_path {
        Some(path) => Some(backend.seed_session(quiz.id.as_str(), read_answers(&path)?)?),
        None => None,
    };
    let mut engine = QuizFlowEngine::new(quiz, backend, config);
    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose), answers_json);
    engine.start(ticket).await?;
    presenter.show_header(engine.quiz());

    loop {
        let Some(step) = engine.current_step().cloned() else {
            return Err("quiz has no step to present".into());
        };
        presenter.show_status(engine.session());
        let prompt = PromptContext::new(
            &step,
            engine.current_index(),
            engine.quiz().steps.len(),
            engine.current_answer().map(AnswerValue::display),
        );
        presenter.show_prompt(&prompt);

        let input = match &step.kind {
            StepKind::Form(form) => prompt_form(form, &presenter)?,
            _ => prompt_step(&step, &presenter)?,
        };
        let going_back = input == StepInput::Back;
        if let Some(notice) = record_input(&mut engine, &step, input) {
            presenter.show_notice(&notice);
            continue;
        }
        if going_back {
            continue;
        }

        match engine.next().await {
            Ok(Transition::Completed(completion)) => {
                presenter.show_completion(&completion, engine.session());
                return Ok(());
            }
            Ok(Transition::Ignored(notice)) => presenter.show_notice(&notice),
            Ok(_) => {}
            Err(err @ (EngineError::Persistence { .. } | EngineError::Completion(_))) => {
                eprintln!("{}; try again.", err);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Applies parsed input to the current step, returning the notice when the
/// engine refused it.
fn record_input(
    engine: &mut QuizFlowEngine,
    step: &StepSpec,
    input: StepInput,
) -> Option<Notice> {
    let transition = match input {
        StepInput::Back => engine.back(),
        StepInput::Options(indices) => return apply_options(engine, step, &indices),
        StepInput::WriteIn(index, text) => engine.write_in(index, &text),
        StepInput::Value(value) => engine.answer(step.id.as_str(), value),
        StepInput::Continue => return None,
    };
    ignored(transition)
}

/// Sets the selection of the current question to exactly `indices`.
fn apply_options(
    engine: &mut QuizFlowEngine,
    step: &StepSpec,
    indices: &[usize],
) -> Option<Notice> {
    let multiple = step
        .question()
        .is_some_and(|question| question.question_type.is_multiple());
    if multiple {
        engine.answer(step.id.as_str(), AnswerValue::Choices(Vec::new()));
    }
    indices
        .iter()
        .find_map(|index| ignored(engine.select_option(*index)))
}

fn ignored(transition: Transition) -> Option<Notice> {
    match transition {
        Transition::Ignored(notice) => Some(notice),
        _ => None,
    }
}

/// Parsed line of user input for one step.
#[derive(Debug, PartialEq)]
enum StepInput {
    Back,
    Options(Vec<usize>),
    WriteIn(usize, String),
    Value(AnswerValue),
    Continue,
}

fn read_input() -> CliResult<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err("input closed before the quiz finished".into());
    }
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return Err("quiz aborted by user".into());
    }
    Ok(trimmed.to_string())
}

fn prompt_step(step: &StepSpec, presenter: &WizardPresenter) -> CliResult<StepInput> {
    loop {
        let input = read_input()?;
        match parse_step_input(step, &input) {
            Ok(parsed) => return Ok(parsed),
            Err(err) => presenter.show_parse_error(&err),
        }
    }
}

fn prompt_form(form: &FormStep, presenter: &WizardPresenter) -> CliResult<StepInput> {
    let mut fields = BTreeMap::new();
    for input in &form.form_inputs {
        let label = if input.label.is_empty() {
            &input.id
        } else {
            &input.label
        };
        loop {
            println!("{}{}", label, if input.required { " *" } else { "" });
            let value = read_input()?;
            if value.eq_ignore_ascii_case("back") {
                return Ok(StepInput::Back);
            }
            if value.is_empty() && input.required {
                presenter.show_parse_error(&AnswerParseError::new(
                    format!("{} is required.", label),
                    None,
                ));
                continue;
            }
            fields.insert(input.id.clone(), value);
            break;
        }
    }
    Ok(StepInput::Value(AnswerValue::Fields(fields)))
}

fn parse_step_input(step: &StepSpec, raw: &str) -> Result<StepInput, AnswerParseError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("back") {
        return Ok(StepInput::Back);
    }
    match &step.kind {
        StepKind::Question(question) => parse_choice(question, raw),
        StepKind::Form(_) => Err(AnswerParseError::new(
            "Forms are answered field by field.",
            None,
        )),
        StepKind::Component(component) => match &component.component {
            ComponentKind::Bmi { .. } => parse_number(raw).map(StepInput::Value),
            ComponentKind::Counter { .. } => parse_integer(raw).map(StepInput::Value),
            ComponentKind::Popup { .. } | ComponentKind::Info => Ok(StepInput::Continue),
        },
    }
}

fn parse_choice(question: &QuestionStep, raw: &str) -> Result<StepInput, AnswerParseError> {
    if raw.is_empty() {
        return Err(AnswerParseError::new(
            "This question requires an answer.",
            None,
        ));
    }
    let labels = question
        .options
        .iter()
        .map(|option| option.text.as_str())
        .collect::<Vec<_>>();
    let parts: Vec<&str> = if question.question_type.is_multiple() {
        raw.split(',').map(str::trim).filter(|part| !part.is_empty()).collect()
    } else {
        vec![raw]
    };

    let mut indices = Vec::new();
    for part in &parts {
        match option_for(&labels, part) {
            Some(index) => indices.push(index),
            None if parts.len() == 1 => {
                if let Some(index) = question.options.iter().position(|option| option.has_textarea) {
                    return Ok(StepInput::WriteIn(index, part.to_string()));
                }
                return Err(unknown_choice(&labels));
            }
            None => return Err(unknown_choice(&labels)),
        }
    }
    Ok(StepInput::Options(indices))
}

/// 1-based option number or case-insensitive label.
fn option_for(labels: &[&str], raw: &str) -> Option<usize> {
    if let Ok(number) = raw.parse::<usize>()
        && (1..=labels.len()).contains(&number)
    {
        return Some(number - 1);
    }
    labels
        .iter()
        .position(|label| label.eq_ignore_ascii_case(raw))
}

fn unknown_choice(labels: &[&str]) -> AnswerParseError {
    AnswerParseError::new(
        format!("Choose one of: {}.", labels.join(", ")),
        Some(format!("option numbers 1-{} or their labels", labels.len())),
    )
}

fn parse_integer(raw: &str) -> Result<AnswerValue, AnswerParseError> {
    raw.parse::<i64>()
        .map(|value| AnswerValue::Number(value as f64))
        .map_err(|_| {
            AnswerParseError::new(
                "Please enter a whole number.",
                Some("expected integer".to_string()),
            )
        })
}

fn parse_number(raw: &str) -> Result<AnswerValue, AnswerParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(AnswerValue::Number)
        .ok_or_else(|| {
            AnswerParseError::new(
                "Please enter a number.",
                Some("expected finite number".to_string()),
            )
        })
}
