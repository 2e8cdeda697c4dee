use std::sync::Arc;

use quiz_spec::{
    AnswerIssue, AnswerStore, AnswerValue, Id, NextStep, Quiz, QuizResult, Rule, StepContract,
    StepId, StepSpec, answer_optional, compile_rules, first_presentable, match_rule,
    previous_presentable, resolve_next, resume_index, validate_quiz,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{CompletionResponse, QuizBackend, SessionTicket, Upload};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::session::Session;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    NotStarted,
    InProgress,
    Completed,
}

/// User-visible reason a call changed nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Notice {
    #[error("step '{step}': {issue}")]
    InvalidAnswer { step: StepId, issue: AnswerIssue },
    #[error("the quiz is {0:?}")]
    NotInProgress(EngineState),
    #[error("already at the first step")]
    AtFirstStep,
    #[error("'{0}' is not a step of this quiz")]
    UnknownQuestion(String),
    #[error("option {index} cannot be selected on step '{step}'")]
    UnknownOption { step: StepId, index: usize },
}

/// Outcome of an engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The session is running and presents this step.
    Started(usize),
    /// An answer or upload was recorded; the step did not change.
    Recorded,
    /// The session now presents this step.
    Moved(usize),
    Completed(Box<Completion>),
    Ignored(Notice),
}

/// Where the UI should go once the quiz is done.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "quizId", rename_all = "snake_case")]
pub enum Navigation {
    Results,
    /// A pre-quiz hands over to its main quiz.
    MainQuiz(Id),
}

/// Recommendation payload returned by a successful completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// `None` means no recommendation, which is a valid outcome.
    pub result: Option<QuizResult>,
    pub alternates: Vec<QuizResult>,
    /// Locally matched rule, if the result came from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    /// Backend payload passed through.
    pub remote: Value,
    pub navigation: Navigation,
}

/// State machine over one quiz session.
pub struct QuizFlowEngine {
    quiz: Quiz,
    rules: Vec<Rule>,
    backend: Arc<dyn QuizBackend>,
    config: EngineConfig,
    session: Session,
}

impl QuizFlowEngine {
    pub fn new(quiz: Quiz, backend: Arc<dyn QuizBackend>, config: EngineConfig) -> Self {
        let session = Session::new(quiz.id.clone());
        Self {
            quiz,
            rules: Vec::new(),
            backend,
            config,
            session,
        }
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> EngineState {
        self.session.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiled recommendation rules; empty until the session starts.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.session.answers
    }

    pub fn current_index(&self) -> usize {
        self.session.current_step_index
    }

    pub fn current_step(&self) -> Option<&StepSpec> {
        self.quiz.steps.get(self.session.current_step_index)
    }

    /// Answer recorded for the step currently presented.
    pub fn current_answer(&self) -> Option<&AnswerValue> {
        self.current_step()
            .and_then(|step| self.session.answers.get(step.id.as_str()))
    }

    /// Validates the definition, opens or reopens a session and positions it.
    ///
    /// With a `ticket` the saved answers of that session are fetched and the
    /// session resumes at the last answered step; without one a fresh session
    /// is opened at step 0.
    pub async fn start(&mut self, ticket: Option<SessionTicket>) -> Result<Transition, EngineError> {
        if self.session.state != EngineState::NotStarted {
            return Ok(self.ignore(Notice::NotInProgress(self.session.state)));
        }
        validate_quiz(&self.quiz).into_result(self.quiz.id.as_str())?;
        if self.quiz.require_login && !self.config.authenticated {
            warn!(quiz = %self.quiz.id, "quiz requires login");
            return Err(EngineError::LoginRequired {
                quiz_id: self.quiz.id.to_string(),
            });
        }
        let skipped = self.quiz.mark_login_steps(self.config.authenticated);
        if !skipped.is_empty() {
            debug!(steps = ?skipped, "login steps skipped for authenticated user");
        }
        self.rules = compile_rules(self.quiz.edges(), &self.quiz);

        let (ticket, existing) = match ticket {
            Some(ticket) => {
                let existing = self
                    .backend
                    .fetch_existing_answers(&ticket.session_id)
                    .await
                    .map_err(EngineError::Session)?;
                (ticket, existing)
            }
            None => {
                let ticket = self
                    .backend
                    .start_session(self.quiz.id.as_str())
                    .await
                    .map_err(EngineError::Session)?;
                (ticket, None)
            }
        };

        let answers = existing
            .as_ref()
            .map(AnswerStore::from_wire)
            .unwrap_or_default();
        let Some(index) = self.presentable(resume_index(&self.quiz.steps, &answers)) else {
            warn!(quiz = %self.quiz.id, "every step is skipped");
            return Err(EngineError::NothingToPresent {
                quiz_id: self.quiz.id.to_string(),
            });
        };
        self.session.session_id = Some(ticket.session_id);
        self.session.response_id = Some(ticket.response_id);
        self.session.answers = answers;
        self.session.current_step_index = index;
        self.session.visited_steps = vec![index];
        self.session.state = EngineState::InProgress;
        info!(
            quiz = %self.quiz.id,
            step = index,
            answers = self.session.answers.len(),
            "session started"
        );
        Ok(Transition::Started(index))
    }

    /// Records `value` for `question_id` without moving.
    pub fn answer(&mut self, question_id: &str, value: AnswerValue) -> Transition {
        if self.session.state != EngineState::InProgress {
            return self.ignore(Notice::NotInProgress(self.session.state));
        }
        let Some(step) = self.quiz.step(question_id) else {
            return self.ignore(Notice::UnknownQuestion(question_id.to_string()));
        };
        let id = step.id.clone();
        self.session.answers.insert(id, value);
        Transition::Recorded
    }

    /// Clicks option `index` on the current question step.
    pub fn select_option(&mut self, index: usize) -> Transition {
        if self.session.state != EngineState::InProgress {
            return self.ignore(Notice::NotInProgress(self.session.state));
        }
        let Some(step) = self.current_step() else {
            return self.ignore(Notice::NotInProgress(self.session.state));
        };
        let id = step.id.clone();
        let toggled = step
            .question()
            .and_then(|question| question.toggle(self.session.answers.get(id.as_str()), index));
        match toggled {
            Some(value) => {
                self.session.answers.insert(id, value);
                Transition::Recorded
            }
            None => self.ignore(Notice::UnknownOption { step: id, index }),
        }
    }

    /// Free-text answer for the textarea option `index` of the current step.
    pub fn write_in(&mut self, index: usize, text: &str) -> Transition {
        if self.session.state != EngineState::InProgress {
            return self.ignore(Notice::NotInProgress(self.session.state));
        }
        let Some(step) = self.current_step() else {
            return self.ignore(Notice::NotInProgress(self.session.state));
        };
        let id = step.id.clone();
        let written = step
            .question()
            .and_then(|question| question.write_in(index, text));
        match written {
            Some(value) => {
                self.session.answers.insert(id, value);
                Transition::Recorded
            }
            None => self.ignore(Notice::UnknownOption { step: id, index }),
        }
    }

    pub fn attach_upload(&mut self, upload: Upload) -> Transition {
        if self.session.state != EngineState::InProgress {
            return self.ignore(Notice::NotInProgress(self.session.state));
        }
        if self.quiz.step(upload.question_id.as_str()).is_none() {
            return self.ignore(Notice::UnknownQuestion(upload.question_id.to_string()));
        }
        self.session.uploads.push(upload);
        Transition::Recorded
    }

    /// Validates and saves the current answer, then moves to the next step
    /// or completes the quiz.
    pub async fn next(&mut self) -> Result<Transition, EngineError> {
        if self.session.state != EngineState::InProgress {
            return Ok(self.ignore(Notice::NotInProgress(self.session.state)));
        }
        let current = self.session.current_step_index;
        let Some(step) = self.quiz.steps.get(current) else {
            return Ok(self.ignore(Notice::NotInProgress(self.session.state)));
        };
        let answer = self.session.answers.get(step.id.as_str()).cloned();
        if !answer_optional(step)
            && let Err(issue) = step.check_answer(answer.as_ref())
        {
            let step = step.id.clone();
            return Ok(self.ignore(Notice::InvalidAnswer { step, issue }));
        }

        if let Some(answer) = &answer {
            self.persist(step.id.as_str(), answer).await?;
        }

        match resolve_next(&self.quiz, current, answer.as_ref(), &self.session.answers) {
            NextStep::Step(index) => {
                self.session.current_step_index = index;
                self.session.visited_steps.push(index);
                debug!(from = current, to = index, "advanced");
                Ok(Transition::Moved(index))
            }
            NextStep::Complete => self.complete().await,
        }
    }

    /// Returns to the previously presented step. Answers are kept.
    ///
    /// Without a visited trail (right after a resume) the nearest earlier
    /// step that is not skipped becomes the new start of the trail.
    pub fn back(&mut self) -> Transition {
        if self.session.state != EngineState::InProgress {
            return self.ignore(Notice::NotInProgress(self.session.state));
        }
        let current = self.session.current_step_index;
        if current == 0 {
            return self.ignore(Notice::AtFirstStep);
        }
        let index = if self.session.visited_steps.len() > 1 {
            self.session.visited_steps.pop();
            self.session
                .visited_steps
                .last()
                .copied()
                .unwrap_or_default()
        } else {
            let Some(previous) = previous_presentable(&self.quiz.steps, current) else {
                return self.ignore(Notice::AtFirstStep);
            };
            self.session.visited_steps = vec![previous];
            previous
        };
        self.session.current_step_index = index;
        debug!(to = index, "moved back");
        Transition::Moved(index)
    }

    /// Merges previously saved answers and jumps to the step they resume at.
    pub fn resume(&mut self, existing: &Value) -> Transition {
        if self.session.state != EngineState::InProgress {
            return self.ignore(Notice::NotInProgress(self.session.state));
        }
        let existing = AnswerStore::from_wire(existing);
        let index = self
            .presentable(resume_index(&self.quiz.steps, &existing))
            .unwrap_or(self.session.current_step_index);
        self.session.answers.merge(existing);
        self.session.current_step_index = index;
        self.session.visited_steps = vec![index];
        info!(step = index, "session resumed");
        Transition::Moved(index)
    }

    /// Matches the answers against the compiled rules and submits them.
    ///
    /// On a backend failure the session stays in progress at the same step
    /// so the submission can be retried.
    pub async fn complete(&mut self) -> Result<Transition, EngineError> {
        if self.session.state != EngineState::InProgress {
            return Ok(self.ignore(Notice::NotInProgress(self.session.state)));
        }
        let local = match_rule(&self.rules, &self.session.answers, &self.quiz);
        let response_id = self.session.response_id.clone().unwrap_or_default();
        let response = self
            .backend
            .complete_session(
                &response_id,
                self.session.answers.entries(),
                &self.session.uploads,
            )
            .await
            .map_err(|err| {
                warn!(quiz = %self.quiz.id, error = %err, "completion failed");
                EngineError::Completion(err)
            })?;

        let completion = match local {
            Some(matched) => Completion {
                result: Some(matched.result),
                alternates: matched.alternates,
                rule: Some(matched.rule),
                remote: response.results,
                navigation: self.navigation(),
            },
            None => self.remote_completion(response),
        };
        self.session.state = EngineState::Completed;
        info!(
            quiz = %self.quiz.id,
            result = ?completion.result.as_ref().map(|result| result.id.as_str()),
            "quiz completed"
        );
        Ok(Transition::Completed(Box::new(completion)))
    }

    fn remote_completion(&self, response: CompletionResponse) -> Completion {
        let mut resolved = response
            .recommendations
            .iter()
            .filter_map(|id| self.quiz.result(id.as_str()).cloned());
        let result = resolved.next();
        let alternates = resolved.collect();
        if result.is_none() {
            debug!(quiz = %self.quiz.id, "no recommendation for these answers");
        }
        Completion {
            result,
            alternates,
            rule: None,
            remote: response.results,
            navigation: self.navigation(),
        }
    }

    fn navigation(&self) -> Navigation {
        match &self.quiz.main_quiz {
            Some(main) if self.quiz.pre_quiz => Navigation::MainQuiz(main.clone()),
            _ => Navigation::Results,
        }
    }

    async fn persist(&self, question_id: &str, answer: &AnswerValue) -> Result<(), EngineError> {
        if !self.config.persist_answers {
            return Ok(());
        }
        let response_id = self.session.response_id.as_deref().unwrap_or_default();
        let reason = match self
            .backend
            .persist_answer(response_id, question_id, &answer.to_wire())
            .await
        {
            Ok(true) => return Ok(()),
            Ok(false) => "the backend refused the answer".to_string(),
            Err(err) => err.to_string(),
        };
        warn!(question = question_id, %reason, "answer not saved");
        Err(EngineError::Persistence {
            question_id: question_id.to_string(),
            reason,
        })
    }

    /// `index` moved past skippable steps, or back to the last shown step
    /// when everything from `index` on is skipped.
    fn presentable(&self, index: usize) -> Option<usize> {
        match first_presentable(&self.quiz.steps, index) {
            NextStep::Step(next) => Some(next),
            NextStep::Complete => previous_presentable(&self.quiz.steps, index),
        }
    }

    fn ignore(&self, notice: Notice) -> Transition {
        warn!(quiz = %self.quiz.id, %notice, "transition ignored");
        Transition::Ignored(notice)
    }
}
