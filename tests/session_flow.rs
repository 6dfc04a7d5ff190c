// tests/session_flow.rs

use std::sync::Arc;

use async_trait::async_trait;
use skill_assessments::{
    config::Config,
    handlers::assessment::score_submission,
    models::{
        assessment::{Assessment, StartAssessmentResponse},
        attempt::{SubmitAssessmentRequest, SubmitAssessmentResponse},
        question::{OptionLabel, PublicQuestion, Question},
    },
    notify::LogNotifier,
    routes,
    session::{
        Advance, AssessmentApi, FileStorage, HttpAssessmentApi, MemoryStorage, SessionCommand, SessionController,
        SessionError, SessionStorage, Stage, SystemClock, answers_key, timer_key,
    },
    state::AppState,
    store::{AssessmentStore, MemoryStore},
    utils::jwt::sign_jwt,
};
use tokio::sync::mpsc;
use url::Url;

const JWT_SECRET: &str = "session_flow_secret";
const ASSESSMENT_ID: i64 = 1;
const USER_ID: i64 = 42;

/// Four questions answered A, B, C, D; pass at 75%.
fn seeded_store(time_limit: i32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let questions = OptionLabel::ALL
        .iter()
        .enumerate()
        .map(|(i, label)| Question {
            id: 11 + i as i64,
            assessment_id: ASSESSMENT_ID,
            position: i as i32,
            question: format!("Question {}", i + 1),
            option_a: "a".to_string(),
            option_b: "b".to_string(),
            option_c: "c".to_string(),
            option_d: "d".to_string(),
            correct_answer: *label,
        })
        .collect();
    store
        .insert_assessment(
            Assessment {
                id: ASSESSMENT_ID,
                title: "SQL for Analysts".to_string(),
                description: Some("Joins, grouping and window functions".to_string()),
                passing_score: 75,
                time_limit,
                created_at: None,
            },
            questions,
        )
        .unwrap();
    store
}

async fn spawn_app(store: Arc<MemoryStore>) -> Url {
    let config = Config {
        database_url: "memory".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        port: 0,
        certificate_base_url: Url::parse("http://jobs.test").unwrap(),
        notify_webhook_url: None,
        allowed_origins: Vec::new(),
    };
    let state = AppState {
        store,
        notifier: Arc::new(LogNotifier),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap()
}

fn http_api(base: Url) -> Arc<HttpAssessmentApi> {
    Arc::new(HttpAssessmentApi::new(base, sign_jwt(USER_ID, JWT_SECRET, 600).unwrap()))
}

#[tokio::test]
async fn full_attempt_over_http() {
    let store = seeded_store(30);
    let base = spawn_app(store.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
    let user = USER_ID.to_string();

    let mut session = SessionController::new(http_api(base), storage.clone(), Arc::new(SystemClock));
    session.start(Some(user.as_str()), Some(ASSESSMENT_ID)).await;

    assert_eq!(session.stage(), &Stage::Taking);
    assert_eq!(session.title(), "SQL for Analysts");
    assert_eq!(session.time_left(), 30 * 60);
    assert_eq!(session.questions().len(), 4);

    for option in [OptionLabel::A, OptionLabel::B, OptionLabel::C] {
        session.select(option);
        assert_eq!(session.next(), Advance::Moved);
    }
    session.select(OptionLabel::A);
    assert_eq!(session.next(), Advance::ConfirmSubmit);
    session.confirm_submit().await;

    let result = session.result().expect("should have results");
    assert_eq!(result.score, 75);
    assert!(result.is_passed);
    assert!(result.certificate.is_some());

    assert_eq!(storage.get(&timer_key(ASSESSMENT_ID, &user)).unwrap(), None);
    assert_eq!(storage.get(&answers_key(ASSESSMENT_ID, &user)).unwrap(), None);
}

#[tokio::test]
async fn reload_resumes_same_attempt_over_http() {
    let store = seeded_store(30);
    let base = spawn_app(store.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let user = USER_ID.to_string();

    let (deadline, attempt_key) = {
        let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
        let mut session = SessionController::new(http_api(base.clone()), storage, Arc::new(SystemClock));
        session.start(Some(user.as_str()), Some(ASSESSMENT_ID)).await;
        session.select(OptionLabel::A);
        session.next();
        session.select(OptionLabel::B);
        session.next();
        (session.deadline(), session.attempt_key())
    };

    // A new controller over the same directory stands in for a page reload.
    let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
    let mut session = SessionController::new(http_api(base), storage, Arc::new(SystemClock));
    session.start(Some(user.as_str()), Some(ASSESSMENT_ID)).await;

    assert_eq!(session.deadline(), deadline);
    assert_eq!(session.attempt_key(), attempt_key);
    assert_eq!(session.current_index(), 2);
    assert_eq!(session.answers().len(), 2);
    assert!(session.time_left() <= 30 * 60);

    session.select(OptionLabel::C);
    session.next();
    session.select(OptionLabel::D);
    session.next();
    session.confirm_submit().await;

    let result = session.result().expect("should have results");
    assert_eq!(result.score, 100);
    assert_eq!(store.attempt_count().unwrap(), 1);
}

#[tokio::test]
async fn unreachable_server_routes_start_to_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let base = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
    let mut session = SessionController::new(http_api(base), Arc::new(MemoryStorage::new()), Arc::new(SystemClock));
    session.start(Some("42"), Some(ASSESSMENT_ID)).await;

    assert_eq!(
        session.error(),
        Some(&SessionError::NetworkFailure("Failed to start assessment".to_string()))
    );
}

#[tokio::test]
async fn unknown_assessment_routes_start_to_not_found() {
    let base = spawn_app(seeded_store(30)).await;
    let mut session = SessionController::new(http_api(base), Arc::new(MemoryStorage::new()), Arc::new(SystemClock));
    session.start(Some("42"), Some(999)).await;

    assert_eq!(
        session.error(),
        Some(&SessionError::NotFound("Assessment not found".to_string()))
    );
}

/// Calls the scorer directly so the countdown can run on paused time.
struct InProcessApi {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl AssessmentApi for InProcessApi {
    async fn start(&self, assessment_id: i64) -> Result<StartAssessmentResponse, SessionError> {
        let assessment = self
            .store
            .find_assessment(assessment_id)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| SessionError::NotFound("Assessment not found".to_string()))?;
        let questions = self.store.list_questions(assessment_id).await.unwrap_or_default();

        Ok(StartAssessmentResponse {
            assessment_id,
            title: assessment.title,
            time_limit: assessment.time_limit,
            questions: questions.into_iter().map(PublicQuestion::from).collect(),
        })
    }

    async fn submit(
        &self,
        assessment_id: i64,
        request: &SubmitAssessmentRequest,
    ) -> Result<SubmitAssessmentResponse, SessionError> {
        score_submission(
            self.store.as_ref(),
            &LogNotifier,
            &Url::parse("http://jobs.test").unwrap(),
            USER_ID,
            assessment_id,
            request.clone(),
        )
        .await
        .map_err(|e| SessionError::from_status(e.status().as_u16(), e.to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_auto_submits_committed_answers() {
    let store = seeded_store(1);
    let storage = Arc::new(MemoryStorage::new());
    let api = Arc::new(InProcessApi { store: store.clone() });

    let mut session = SessionController::new(api, storage.clone(), Arc::new(SystemClock));
    session.start(Some("42"), Some(ASSESSMENT_ID)).await;
    assert_eq!(session.time_left(), 60);

    // Three correct answers committed, the last question left unanswered.
    let (tx, rx) = mpsc::channel(16);
    for option in [OptionLabel::A, OptionLabel::B, OptionLabel::C] {
        tx.send(SessionCommand::Select(option)).await.unwrap();
        tx.send(SessionCommand::Next).await.unwrap();
    }
    drop(tx);

    let started = tokio::time::Instant::now();
    session.run(rx).await;

    assert_eq!(started.elapsed().as_secs(), 60);
    assert_eq!(session.time_left(), 0);
    let result = session.result().expect("deadline should submit");
    assert_eq!(result.score, 75);
    assert!(result.is_passed);
    assert!(result.certificate.is_some());
    assert_eq!(storage.get(&timer_key(ASSESSMENT_ID, "42")).unwrap(), None);

    let attempts = store.list_attempts(USER_ID, ASSESSMENT_ID).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].time_spent, 1);
}

#[tokio::test(start_paused = true)]
async fn confirmed_submit_ends_countdown_early() {
    let store = seeded_store(10);
    let api = Arc::new(InProcessApi { store: store.clone() });

    let mut session = SessionController::new(api, Arc::new(MemoryStorage::new()), Arc::new(SystemClock));
    session.start(Some("42"), Some(ASSESSMENT_ID)).await;

    let (tx, rx) = mpsc::channel(16);
    for option in OptionLabel::ALL {
        tx.send(SessionCommand::Select(option)).await.unwrap();
        tx.send(SessionCommand::Next).await.unwrap();
    }
    tx.send(SessionCommand::ConfirmSubmit).await.unwrap();
    // Arrives after results; must not submit twice.
    tx.send(SessionCommand::ConfirmSubmit).await.unwrap();

    session.run(rx).await;

    assert_eq!(session.time_left(), 10 * 60);
    assert_eq!(session.result().map(|r| r.score), Some(100));
    assert_eq!(store.attempt_count().unwrap(), 1);
    drop(tx);
}

#[tokio::test]
async fn expired_deadline_on_resume_submits_immediately() {
    let store = seeded_store(1);
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(skill_assessments::session::ManualClock::new(chrono::Utc::now()));
    let api = Arc::new(InProcessApi { store: store.clone() });

    let mut first = SessionController::new(api.clone(), storage.clone(), clock.clone());
    first.start(Some("42"), Some(ASSESSMENT_ID)).await;
    first.select(OptionLabel::A);
    first.next();
    drop(first);

    clock.advance(chrono::Duration::minutes(5));

    let mut resumed = SessionController::new(api, storage, clock);
    resumed.start(Some("42"), Some(ASSESSMENT_ID)).await;
    assert_eq!(resumed.time_left(), 0);

    let (_tx, rx) = mpsc::channel(1);
    resumed.run(rx).await;

    assert_eq!(resumed.result().map(|r| r.score), Some(25));
    assert_eq!(store.attempt_count().unwrap(), 1);
}
