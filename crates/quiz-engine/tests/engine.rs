use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use quiz_engine::{
    BackendError, Completion, CompletionResponse, EngineConfig, EngineError, EngineState,
    MemoryBackend, Navigation, Notice, QuizBackend, QuizFlowEngine, SessionHandle, SessionTicket,
    Transition, Upload,
};
use quiz_spec::{AnswerEntry, AnswerIssue, AnswerValue, Quiz};

fn fixture() -> Quiz {
    serde_json::from_str(include_str!("../../quiz-spec/tests/fixtures/intake_quiz.json"))
        .expect("fixture")
}

fn quiz(value: Value) -> Quiz {
    serde_json::from_value(value).expect("quiz should deserialize")
}

fn choice(text: &str) -> AnswerValue {
    AnswerValue::Choice(text.into())
}

fn contact() -> AnswerValue {
    AnswerValue::Fields(BTreeMap::from([
        ("first_name".to_string(), "Ada".to_string()),
        ("email".to_string(), "ada@example.com".to_string()),
    ]))
}

fn completion(transition: Transition) -> Completion {
    match transition {
        Transition::Completed(completion) => *completion,
        other => panic!("expected completion, got {other:?}"),
    }
}

async fn started(quiz: Quiz, backend: Arc<MemoryBackend>, config: EngineConfig) -> QuizFlowEngine {
    let mut engine = QuizFlowEngine::new(quiz, backend, config);
    engine.start(None).await.expect("start");
    engine
}

/// Walks the fixture along the "No" branch up to the format question.
async fn answer_to_format_question(engine: &mut QuizFlowEngine) {
    engine.answer("1", choice("No"));
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(1));
    engine.answer("2", AnswerValue::Choices(vec!["Headache".into()]));
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(2));
    engine.answer("3", contact());
    let after_form = engine.next().await.expect("next");
    if after_form == Transition::Moved(3) {
        assert_eq!(engine.next().await.expect("next"), Transition::Moved(4));
    } else {
        assert_eq!(after_form, Transition::Moved(4));
    }
    engine.answer("4", AnswerValue::Number(24.0));
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(5));
}

#[tokio::test]
async fn linear_quiz_walks_every_step_then_completes() {
    let steps: Vec<Value> = (1..=3)
        .map(|id| {
            json!({
                "id": id,
                "stepType": "question",
                "questionType": "true-false",
                "options": [{ "text": "Yes" }, { "text": "No" }]
            })
        })
        .collect();
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = QuizFlowEngine::new(
        quiz(json!({ "id": "linear", "steps": steps })),
        backend.clone(),
        EngineConfig::default(),
    );
    assert_eq!(engine.state(), EngineState::NotStarted);
    assert_eq!(engine.start(None).await.expect("start"), Transition::Started(0));
    assert_eq!(engine.state(), EngineState::InProgress);

    for (index, id) in ["1", "2"].iter().enumerate() {
        assert_eq!(engine.answer(id, choice("Yes")), Transition::Recorded);
        assert_eq!(
            engine.next().await.expect("next"),
            Transition::Moved(index + 1)
        );
    }
    engine.answer("3", choice("No"));
    let done = completion(engine.next().await.expect("next"));
    assert_eq!(done.result, None);
    assert!(done.alternates.is_empty());
    assert_eq!(done.navigation, Navigation::Results);
    assert_eq!(engine.state(), EngineState::Completed);
    assert_eq!(engine.session().visited_steps, vec![0, 1, 2]);
    assert_eq!(backend.completions(), 1);
}

#[tokio::test]
async fn flow_rule_jumps_and_local_rule_recommends() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;

    engine.answer("1", choice("Yes"));
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(5));
    assert_eq!(engine.session().visited_steps, vec![0, 5]);

    assert_eq!(engine.select_option(1), Transition::Recorded);
    let done = completion(engine.next().await.expect("next"));
    let result = done.result.expect("recommendation");
    assert_eq!(result.id, "R2");
    assert_eq!(result.title, "Oral semaglutide");
    let alternates: Vec<&str> = done.alternates.iter().map(|alt| alt.id.as_str()).collect();
    assert_eq!(alternates, vec!["R1"]);
    assert_eq!(done.rule.expect("rule").expected("10"), Some(1));
}

#[tokio::test]
async fn next_without_answer_is_ignored() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    assert_eq!(
        engine.next().await.expect("next"),
        Transition::Ignored(Notice::InvalidAnswer {
            step: "1".into(),
            issue: AnswerIssue::Missing,
        })
    );
    assert_eq!(engine.current_index(), 0);
    assert_eq!(engine.state(), EngineState::InProgress);
}

#[tokio::test]
async fn invalid_form_answer_keeps_the_step() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    engine.answer("1", choice("No"));
    engine.next().await.expect("next");
    engine.answer("2", AnswerValue::Choices(vec!["Nausea".into()]));
    engine.next().await.expect("next");
    engine.answer(
        "3",
        AnswerValue::Fields(BTreeMap::from([
            ("first_name".to_string(), "  ".to_string()),
            ("email".to_string(), "ada@example.com".to_string()),
        ])),
    );
    let transition = engine.next().await.expect("next");
    assert!(matches!(
        transition,
        Transition::Ignored(Notice::InvalidAnswer {
            issue: AnswerIssue::MissingField(_),
            ..
        })
    ));
    assert_eq!(engine.current_index(), 2);
}

#[tokio::test]
async fn back_then_next_restores_the_answer() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    engine.answer("1", choice("No"));
    engine.next().await.expect("next");
    let symptoms = AnswerValue::Choices(vec!["Headache".into(), "Nausea".into()]);
    engine.answer("2", symptoms.clone());
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(2));

    assert_eq!(engine.back(), Transition::Moved(1));
    assert_eq!(engine.current_answer(), Some(&symptoms));
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(2));
    assert_eq!(engine.answers().get("2"), Some(&symptoms));
}

#[tokio::test]
async fn back_at_first_step_is_ignored() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    assert_eq!(engine.back(), Transition::Ignored(Notice::AtFirstStep));
    assert_eq!(engine.current_index(), 0);
    assert_eq!(engine.session().visited_steps, vec![0]);
}

#[tokio::test]
async fn exclusive_option_replaces_other_selections() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    engine.answer("1", choice("No"));
    engine.next().await.expect("next");
    engine.select_option(0);
    engine.select_option(1);
    assert_eq!(
        engine.current_answer(),
        Some(&AnswerValue::Choices(vec!["Headache".into(), "Nausea".into()]))
    );
    engine.select_option(2);
    assert_eq!(
        engine.current_answer(),
        Some(&AnswerValue::Choices(vec!["None of the above".into()]))
    );
    assert_eq!(
        engine.select_option(7),
        Transition::Ignored(Notice::UnknownOption {
            step: "2".into(),
            index: 7,
        })
    );
}

#[tokio::test]
async fn skipped_login_step_is_never_visited() {
    let backend = Arc::new(MemoryBackend::new());
    let config = EngineConfig::default().authenticated(true);
    let mut engine = started(fixture(), backend, config).await;
    answer_to_format_question(&mut engine).await;
    assert_eq!(engine.session().visited_steps, vec![0, 1, 2, 4, 5]);

    engine.answer("10", choice("Injection"));
    let done = completion(engine.next().await.expect("next"));
    assert_eq!(done.result.expect("recommendation").id, "R3");
    assert!(done.alternates.is_empty());
}

#[tokio::test]
async fn informational_step_needs_no_answer() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    answer_to_format_question(&mut engine).await;
    assert_eq!(engine.session().visited_steps, vec![0, 1, 2, 3, 4, 5]);
    assert!(engine.answers().get("login").is_none());
}

#[tokio::test]
async fn answers_are_saved_before_advancing() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend.clone(), EngineConfig::default()).await;
    engine.answer("1", choice("No"));
    engine.next().await.expect("next");
    let session_id = engine.session().session_id.clone().expect("session id");
    assert_eq!(
        backend.saved_answers(&session_id),
        Some(json!({ "1": { "answer": "No" } }))
    );
}

#[tokio::test]
async fn disabled_persistence_skips_the_backend() {
    let backend = Arc::new(MemoryBackend::new());
    backend.reject_persist(true);
    let config = EngineConfig {
        persist_answers: false,
        ..EngineConfig::default()
    };
    let mut engine = started(fixture(), backend, config).await;
    engine.answer("1", choice("No"));
    assert_eq!(engine.next().await.expect("next"), Transition::Moved(1));
}

#[tokio::test]
async fn refused_answer_keeps_step_and_value() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend.clone(), EngineConfig::default()).await;
    backend.reject_persist(true);
    engine.answer("1", choice("No"));
    let err = engine.next().await.expect_err("persistence should fail");
    assert!(matches!(err, EngineError::Persistence { ref question_id, .. } if question_id == "1"));
    assert_eq!(engine.current_index(), 0);
    assert_eq!(engine.current_answer(), Some(&choice("No")));

    backend.reject_persist(false);
    assert_eq!(engine.next().await.expect("retry"), Transition::Moved(1));
}

#[tokio::test]
async fn failed_completion_stays_in_progress() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend.clone(), EngineConfig::default()).await;
    engine.answer("1", choice("Yes"));
    engine.next().await.expect("next");
    engine.answer("10", choice("Injection"));

    backend.fail_completion(true);
    let err = engine.next().await.expect_err("completion should fail");
    assert!(matches!(err, EngineError::Completion(BackendError::Unavailable(_))));
    assert_eq!(engine.state(), EngineState::InProgress);
    assert_eq!(engine.current_index(), 5);

    backend.fail_completion(false);
    let done = completion(engine.next().await.expect("retry"));
    assert_eq!(done.result.expect("recommendation").id, "R1");
    assert_eq!(backend.completions(), 1);
    assert_eq!(
        engine.answer("1", choice("No")),
        Transition::Ignored(Notice::NotInProgress(EngineState::Completed))
    );
}

#[tokio::test]
async fn unmatched_answers_complete_without_recommendation() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    engine.answer("1", choice("Yes"));
    engine.next().await.expect("next");
    assert_eq!(engine.write_in(2, "a weekly patch"), Transition::Recorded);
    let done = completion(engine.next().await.expect("next"));
    assert_eq!(done.result, None);
    assert!(done.alternates.is_empty());
    assert!(done.rule.is_none());
}

#[tokio::test]
async fn remote_recommendations_fill_a_local_miss() {
    let backend = Arc::new(MemoryBackend::new().with_recommendations(["retired", "R2", "R1"]));
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    engine.answer("1", choice("Yes"));
    engine.next().await.expect("next");
    engine.write_in(2, "a weekly patch");
    let upload = Upload {
        question_id: "10".into(),
        file_name: "prescription.pdf".into(),
        content_type: Some("application/pdf".into()),
        url: None,
    };
    assert_eq!(engine.attach_upload(upload), Transition::Recorded);
    let done = completion(engine.complete().await.expect("complete"));
    assert_eq!(done.result.expect("recommendation").id, "R2");
    let alternates: Vec<&str> = done.alternates.iter().map(|alt| alt.id.as_str()).collect();
    assert_eq!(alternates, vec!["R1"]);
    assert_eq!(done.remote["uploadCount"], json!(1));
    assert_eq!(done.remote["answerCount"], json!(2));
}

#[tokio::test]
async fn pre_quiz_hands_over_to_main_quiz() {
    let backend = Arc::new(MemoryBackend::new());
    let pre = quiz(json!({
        "id": "pre",
        "preQuiz": true,
        "mainQuiz": 77,
        "steps": [{
            "id": "consent",
            "stepType": "component",
            "component": { "name": "popup", "message": "Before we start" }
        }]
    }));
    let mut engine = started(pre, backend, EngineConfig::default()).await;
    let done = completion(engine.next().await.expect("next"));
    assert_eq!(done.navigation, Navigation::MainQuiz("77".into()));
}

#[tokio::test]
async fn malformed_quiz_never_starts() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = QuizFlowEngine::new(
        quiz(json!({ "id": "empty", "steps": [] })),
        backend,
        EngineConfig::default(),
    );
    let err = engine.start(None).await.expect_err("malformed");
    assert!(matches!(err, EngineError::Malformed(_)));
    assert!(err.to_string().contains("unavailable"));
    assert_eq!(engine.state(), EngineState::NotStarted);
}

#[tokio::test]
async fn login_required_quiz_needs_authentication() {
    let mut gated = fixture();
    gated.require_login = true;

    let backend = Arc::new(MemoryBackend::new());
    let mut engine = QuizFlowEngine::new(gated.clone(), backend.clone(), EngineConfig::default());
    let err = engine.start(None).await.expect_err("login required");
    assert!(matches!(err, EngineError::LoginRequired { .. }));
    assert_eq!(engine.state(), EngineState::NotStarted);

    let mut engine =
        QuizFlowEngine::new(gated, backend, EngineConfig::default().authenticated(true));
    assert_eq!(engine.start(None).await.expect("start"), Transition::Started(0));
    assert!(engine.quiz().step("login").expect("step").should_skip);
}

#[tokio::test]
async fn saved_session_resumes_at_last_answer() {
    let backend = Arc::new(MemoryBackend::new());
    let ticket = backend
        .seed_session(
            "weight-intake",
            json!({
                "1": { "answer": "No" },
                "2": { "value": { "answer": ["Nausea"] } }
            }),
        )
        .expect("seed");
    let mut engine = QuizFlowEngine::new(fixture(), backend, EngineConfig::default());
    assert_eq!(
        engine.start(Some(ticket.clone())).await.expect("start"),
        Transition::Started(1)
    );
    assert_eq!(
        engine.current_answer(),
        Some(&AnswerValue::Choices(vec!["Nausea".into()]))
    );
    assert_eq!(engine.session().session_id, Some(ticket.session_id));
}

#[tokio::test]
async fn resume_merges_answers_and_moves() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    let transition = engine.resume(&json!({ "1": "Yes", "10": { "answer": "Tablet" } }));
    assert_eq!(transition, Transition::Moved(5));
    assert_eq!(engine.session().visited_steps, vec![5]);
    assert_eq!(engine.answers().len(), 2);
}

fn yes_no(id: u32, required_login: bool) -> Value {
    json!({
        "id": id,
        "stepType": "question",
        "questionType": "true-false",
        "options": [{ "text": "Yes" }, { "text": "No" }],
        "requiredLogin": required_login
    })
}

#[tokio::test]
async fn back_works_after_a_saved_session_resumes() {
    let backend = Arc::new(MemoryBackend::new());
    let linear = quiz(json!({
        "id": "linear",
        "steps": [yes_no(1, false), yes_no(2, false), yes_no(3, false)]
    }));
    let ticket = backend
        .seed_session("linear", json!({ "1": "Yes", "2": "No" }))
        .expect("seed");
    let mut engine = QuizFlowEngine::new(linear, backend, EngineConfig::default());
    assert_eq!(
        engine.start(Some(ticket)).await.expect("start"),
        Transition::Started(1)
    );

    assert_eq!(engine.back(), Transition::Moved(0));
    assert_eq!(engine.current_answer(), Some(&choice("Yes")));
    assert_eq!(engine.session().visited_steps, vec![0]);
    assert_eq!(engine.back(), Transition::Ignored(Notice::AtFirstStep));

    assert_eq!(engine.next().await.expect("next"), Transition::Moved(1));
    assert_eq!(engine.session().visited_steps, vec![0, 1]);
    assert_eq!(engine.current_answer(), Some(&choice("No")));
}

#[tokio::test]
async fn back_works_after_resume_with_answers() {
    let backend = Arc::new(MemoryBackend::new());
    let config = EngineConfig::default().authenticated(true);
    let mut engine = started(fixture(), backend, config).await;
    let transition = engine.resume(&json!({ "1": "No", "2": "Nausea", "3": "x", "4": 22 }));
    assert_eq!(transition, Transition::Moved(4));

    // The login step at index 3 is skipped for signed-in users.
    assert_eq!(engine.back(), Transition::Moved(2));
    assert_eq!(engine.session().visited_steps, vec![2]);
}

#[tokio::test]
async fn resume_never_lands_on_a_trailing_skipped_step() {
    let backend = Arc::new(MemoryBackend::new());
    let gated = quiz(json!({
        "id": "gated",
        "steps": [yes_no(1, false), yes_no(2, true)]
    }));
    let ticket = backend
        .seed_session("gated", json!({ "1": "Yes", "2": "No" }))
        .expect("seed");
    let config = EngineConfig::default().authenticated(true);
    let mut engine = QuizFlowEngine::new(gated, backend, config);
    assert_eq!(
        engine.start(Some(ticket)).await.expect("start"),
        Transition::Started(0)
    );
    assert!(!engine.current_step().expect("step").should_skip);
    assert_eq!(engine.session().visited_steps, vec![0]);

    let done = completion(engine.next().await.expect("next"));
    assert!(done.result.is_none());
    assert_eq!(engine.session().visited_steps, vec![0]);
    assert_eq!(engine.state(), EngineState::Completed);
}

#[tokio::test]
async fn quiz_with_every_step_skipped_does_not_start() {
    let backend = Arc::new(MemoryBackend::new());
    let login_only = quiz(json!({ "id": "login-only", "steps": [yes_no(1, true)] }));
    let config = EngineConfig::default().authenticated(true);
    let mut engine = QuizFlowEngine::new(login_only, backend, config);
    let err = engine.start(None).await.expect_err("nothing to show");
    assert!(matches!(err, EngineError::NothingToPresent { .. }));
    assert_eq!(engine.state(), EngineState::NotStarted);
}

#[tokio::test]
async fn session_snapshot_survives_cbor() {
    let backend = Arc::new(MemoryBackend::new());
    let mut engine = started(fixture(), backend, EngineConfig::default()).await;
    engine.answer("1", choice("No"));
    engine.next().await.expect("next");
    let bytes = engine.session().to_cbor().expect("encode");
    let restored = quiz_engine::Session::from_cbor(&bytes).expect("decode");
    assert_eq!(&restored, engine.session());
}

/// Backend whose answer saving blocks until released.
struct GatedBackend {
    inner: MemoryBackend,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl QuizBackend for GatedBackend {
    async fn start_session(&self, quiz_id: &str) -> Result<SessionTicket, BackendError> {
        self.inner.start_session(quiz_id).await
    }

    async fn fetch_existing_answers(
        &self,
        session_id: &str,
    ) -> Result<Option<Value>, BackendError> {
        self.inner.fetch_existing_answers(session_id).await
    }

    async fn persist_answer(
        &self,
        response_id: &str,
        question_id: &str,
        answer: &Value,
    ) -> Result<bool, BackendError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner
            .persist_answer(response_id, question_id, answer)
            .await
    }

    async fn complete_session(
        &self,
        response_id: &str,
        answers: &[AnswerEntry],
        uploads: &[Upload],
    ) -> Result<CompletionResponse, BackendError> {
        self.inner
            .complete_session(response_id, answers, uploads)
            .await
    }
}

#[tokio::test]
async fn handle_rejects_a_second_transition_in_flight() {
    let backend = Arc::new(GatedBackend {
        inner: MemoryBackend::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let handle = SessionHandle::new(QuizFlowEngine::new(
        fixture(),
        backend.clone(),
        EngineConfig::default(),
    ));
    handle.start(None).await.expect("start");
    handle.answer("1", choice("No")).expect("answer");

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.next().await }
    });
    backend.entered.notified().await;

    assert!(matches!(
        handle.answer("1", choice("Yes")),
        Err(EngineError::TransitionInFlight)
    ));
    assert!(matches!(handle.back(), Err(EngineError::TransitionInFlight)));

    backend.release.notify_one();
    let transition = pending.await.expect("join").expect("next");
    assert_eq!(transition, Transition::Moved(1));

    let session = handle.snapshot().expect("snapshot");
    assert_eq!(session.answers.get("1"), Some(&choice("No")));
    assert_eq!(session.current_step_index, 1);
}
