//! In-process mock of the exam service.
//!
//! Serves the fixture exam over the same REST routes as the real service
//! and records every call so tests can assert on what the client sent.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use proctor_backend::PersistAnswerRequest;
use proctor_session::{
    AnswerValue, Attempt, AttemptAnswer, AttemptStatus, Exam, QuestionResult,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Identifier of attempts created by the mock.
pub const ATTEMPT_ID: &str = "att-1";

/// Path to the fixtures directory.
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Loads the fixture exam.
pub fn fixture_exam() -> Exam {
    let raw = std::fs::read_to_string(fixture_path().join("exam.json"))
        .expect("Failed to read exam fixture");
    serde_json::from_str(&raw).expect("Failed to parse exam fixture")
}

/// Correct answers of the fixture exam.
pub fn answer_key() -> HashMap<String, AnswerValue> {
    HashMap::from([
        ("q1".to_string(), AnswerValue::text("goes")),
        ("q2".to_string(), AnswerValue::choices(["run", "eat"])),
        ("q3".to_string(), AnswerValue::text("saw")),
    ])
}

/// Everything the mock knows and has seen.
#[derive(Debug)]
pub struct Inner {
    pub exam: Exam,
    pub key: HashMap<String, AnswerValue>,
    pub can_start: bool,
    pub attempt: Option<Attempt>,
    pub persisted: Vec<(String, AnswerValue)>,
    pub can_start_users: Vec<String>,
    pub authorization: Vec<String>,
    pub submits: usize,
    pub grades: usize,
    pub fail_grades: usize,
    pub fail_persist: bool,
}

/// Shared handle on the mock state.
#[derive(Debug, Clone)]
pub struct MockState(Arc<Mutex<Inner>>);

impl MockState {
    pub fn new(exam: Exam) -> Self {
        Self(Arc::new(Mutex::new(Inner {
            exam,
            key: answer_key(),
            can_start: true,
            attempt: None,
            persisted: Vec::new(),
            can_start_users: Vec::new(),
            authorization: Vec::new(),
            submits: 0,
            grades: 0,
            fail_grades: 0,
            fail_persist: false,
        })))
    }

    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.0.lock().expect("Mock state poisoned")
    }

    fn record_auth(&self, headers: &HeaderMap) {
        if let Some(value) = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
        {
            self.lock().authorization.push(value.to_string());
        }
    }
}

/// A running mock server.
pub struct MockServer {
    pub base_url: String,
    pub state: MockState,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Starts the mock with the fixture exam.
    pub async fn start() -> Self {
        Self::start_with(fixture_exam()).await
    }

    /// Starts the mock serving `exam`.
    pub async fn start_with(exam: Exam) -> Self {
        let state = MockState::new(exam);
        let router = router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
            handle,
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: MockState) -> Router {
    let api = Router::new()
        .route("/exams/:exam_id", get(get_exam))
        .route("/exams/:exam_id/attempts", post(start_attempt))
        .route("/exams/:exam_id/attempts/can-start", get(can_start))
        .route("/exams/:exam_id/attempts/in-progress", get(in_progress))
        .route(
            "/attempts/:attempt_id/answers/:question_id",
            put(persist_answer),
        )
        .route("/attempts/:attempt_id/submit", post(submit))
        .route("/attempts/:attempt_id/grade", post(grade))
        .with_state(state);

    Router::new().nest("/api", api)
}

async fn get_exam(
    State(state): State<MockState>,
    Path(exam_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Exam>, (StatusCode, String)> {
    state.record_auth(&headers);
    let inner = state.lock();
    if inner.exam.id == exam_id {
        Ok(Json(inner.exam.clone()))
    } else {
        Err((StatusCode::NOT_FOUND, format!("exam {exam_id} not found")))
    }
}

async fn can_start(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let mut inner = state.lock();
    if let Some(user) = params.get("user_id") {
        inner.can_start_users.push(user.clone());
    }
    Json(json!({ "can_start": inner.can_start }))
}

async fn start_attempt(
    State(state): State<MockState>,
    Path(exam_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Attempt>, (StatusCode, String)> {
    state.record_auth(&headers);
    let mut inner = state.lock();
    if inner
        .attempt
        .as_ref()
        .is_some_and(|a| a.status == AttemptStatus::InProgress)
    {
        return Err((StatusCode::CONFLICT, "attempt already in progress".to_string()));
    }
    let attempt = Attempt::new(ATTEMPT_ID, exam_id);
    inner.attempt = Some(attempt.clone());
    Ok(Json(attempt))
}

async fn in_progress(State(state): State<MockState>) -> Result<Json<Attempt>, StatusCode> {
    let inner = state.lock();
    inner
        .attempt
        .clone()
        .filter(|a| a.status == AttemptStatus::InProgress)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn persist_answer(
    State(state): State<MockState>,
    Path((attempt_id, question_id)): Path<(String, String)>,
    Json(body): Json<PersistAnswerRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut inner = state.lock();
    if inner.fail_persist {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "storage offline".to_string()));
    }
    let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == attempt_id) else {
        return Err((StatusCode::NOT_FOUND, "no such attempt".to_string()));
    };
    attempt.answers.retain(|a| a.question_id != question_id);
    attempt.answers.push(AttemptAnswer {
        question_id: question_id.clone(),
        answer: body.answer.clone(),
    });
    inner.persisted.push((question_id, body.answer));
    Ok(StatusCode::NO_CONTENT)
}

async fn submit(
    State(state): State<MockState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<Attempt>, (StatusCode, String)> {
    let mut inner = state.lock();
    inner.submits += 1;
    let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == attempt_id) else {
        return Err((StatusCode::NOT_FOUND, "no such attempt".to_string()));
    };
    if attempt.status != AttemptStatus::InProgress {
        return Err((StatusCode::CONFLICT, "attempt already submitted".to_string()));
    }
    attempt.status = AttemptStatus::Submitted;
    attempt.submitted_at = Some(Utc::now());
    Ok(Json(attempt.clone()))
}

async fn grade(
    State(state): State<MockState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<Attempt>, (StatusCode, String)> {
    let mut guard = state.lock();
    let inner = &mut *guard;
    inner.grades += 1;
    if inner.fail_grades > 0 {
        inner.fail_grades -= 1;
        return Err((StatusCode::SERVICE_UNAVAILABLE, "grader unavailable".to_string()));
    }

    let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == attempt_id) else {
        return Err((StatusCode::NOT_FOUND, "no such attempt".to_string()));
    };
    if attempt.status != AttemptStatus::Submitted {
        return Err((StatusCode::CONFLICT, "attempt not submitted".to_string()));
    }

    let results: Vec<QuestionResult> = inner
        .exam
        .questions
        .iter()
        .map(|question| {
            let given = attempt
                .answers
                .iter()
                .find(|a| a.question_id == question.id)
                .map(|a| &a.answer);
            let correct = given.is_some() && given == inner.key.get(&question.id);
            QuestionResult {
                question_id: question.id.clone(),
                is_correct: Some(correct),
                points_awarded: Some(if correct { 1.0 } else { 0.0 }),
                feedback: None,
            }
        })
        .collect();

    let score: f64 = results.iter().filter_map(|r| r.points_awarded).sum();
    let max = inner.exam.questions.len() as f64;
    let percentage = if max > 0.0 { score / max * 100.0 } else { 0.0 };

    attempt.status = AttemptStatus::Graded;
    attempt.score = Some(score);
    attempt.max_score = Some(max);
    attempt.percentage = Some(percentage);
    attempt.passed = Some(percentage >= inner.exam.passing_score.unwrap_or(0.0));
    attempt.feedback = Some("Keep practising irregular verbs.".to_string());
    attempt.question_results = results;
    Ok(Json(attempt.clone()))
}
