//! Integration tests for the HTTP backend client.
//!
//! These tests run [`HttpBackend`] against an in-process mock of the exam
//! service and check routes, request bodies, headers and error mapping.

mod mock_backend;

use std::time::Duration;

use mock_backend::{MockServer, ATTEMPT_ID};
use proctor_backend::HttpBackend;
use proctor_session::{
    AnswerValue, AttemptBackend, AttemptStatus, BackendErrorKind, ProctorError, QuestionKind,
};

fn client(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&server.base_url, Duration::from_secs(5)).expect("Failed to build client")
}

#[tokio::test]
async fn test_get_exam_sends_bearer_token() {
    let server = MockServer::start().await;
    let backend = client(&server).with_token("secret");

    let exam = backend.get_exam("grammar-a2").await.expect("get exam");

    assert_eq!(exam.title, "Grammar Basics");
    assert_eq!(exam.time_limit_secs(), Some(600));
    assert_eq!(exam.questions.len(), 3);
    assert_eq!(exam.questions[1].kind, QuestionKind::MultipleChoice);
    assert_eq!(
        server.state.lock().authorization,
        vec!["Bearer secret".to_string()]
    );
}

#[tokio::test]
async fn test_unknown_exam_is_not_found() {
    let server = MockServer::start().await;
    let err = client(&server).get_exam("missing").await.unwrap_err();

    assert!(matches!(
        err,
        ProctorError::Backend {
            kind: BackendErrorKind::NotFound,
            ..
        }
    ));
    assert!(!err.is_transient());
    assert!(err.to_string().contains("exam missing not found"));
}

#[tokio::test]
async fn test_can_start_passes_user() {
    let server = MockServer::start().await;
    let backend = client(&server);

    assert!(backend
        .check_can_start_attempt("student-1", "grammar-a2")
        .await
        .expect("can start"));

    server.state.lock().can_start = false;
    assert!(!backend
        .check_can_start_attempt("student-1", "grammar-a2")
        .await
        .expect("can start"));

    assert_eq!(
        server.state.lock().can_start_users,
        vec!["student-1".to_string(), "student-1".to_string()]
    );
}

#[tokio::test]
async fn test_in_progress_is_none_until_started() {
    let server = MockServer::start().await;
    let backend = client(&server);

    assert!(backend
        .get_in_progress_attempt("grammar-a2")
        .await
        .expect("in progress")
        .is_none());

    let started = backend.start_attempt("grammar-a2").await.expect("start");
    assert_eq!(started.id, ATTEMPT_ID);
    assert_eq!(started.status, AttemptStatus::InProgress);

    let resumed = backend
        .get_in_progress_attempt("grammar-a2")
        .await
        .expect("in progress")
        .expect("attempt should be in progress");
    assert_eq!(resumed.id, ATTEMPT_ID);
    assert!(resumed.started_at.is_some());
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let server = MockServer::start().await;
    let backend = client(&server);

    backend.start_attempt("grammar-a2").await.expect("start");
    let err = backend.start_attempt("grammar-a2").await.unwrap_err();

    assert!(matches!(
        err,
        ProctorError::Backend {
            kind: BackendErrorKind::Conflict,
            ..
        }
    ));
}

#[tokio::test]
async fn test_persist_answer_replaces_previous_value() {
    let server = MockServer::start().await;
    let backend = client(&server);
    backend.start_attempt("grammar-a2").await.expect("start");

    backend
        .persist_answer(ATTEMPT_ID, "q2", &AnswerValue::choices(["run"]))
        .await
        .expect("persist");
    backend
        .persist_answer(ATTEMPT_ID, "q2", &AnswerValue::choices(["run", "eat"]))
        .await
        .expect("persist");

    let state = server.state.lock();
    assert_eq!(state.persisted.len(), 2);
    let attempt = state.attempt.as_ref().expect("attempt");
    assert_eq!(attempt.answers.len(), 1);
    assert_eq!(attempt.answers[0].answer, AnswerValue::choices(["run", "eat"]));
}

#[tokio::test]
async fn test_persist_failure_is_server_error() {
    let server = MockServer::start().await;
    let backend = client(&server);
    backend.start_attempt("grammar-a2").await.expect("start");
    server.state.lock().fail_persist = true;

    let err = backend
        .persist_answer(ATTEMPT_ID, "q3", &AnswerValue::text("saw"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(err.to_string().contains("storage offline"));
}

#[tokio::test]
async fn test_submit_then_grade() {
    let server = MockServer::start().await;
    let backend = client(&server);
    backend.start_attempt("grammar-a2").await.expect("start");
    backend
        .persist_answer(ATTEMPT_ID, "q1", &AnswerValue::text("goes"))
        .await
        .expect("persist");
    backend
        .persist_answer(ATTEMPT_ID, "q3", &AnswerValue::text("saw"))
        .await
        .expect("persist");

    let submitted = backend.submit_attempt(ATTEMPT_ID).await.expect("submit");
    assert_eq!(submitted.status, AttemptStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let graded = backend.grade_attempt(ATTEMPT_ID).await.expect("grade");
    assert!(graded.is_graded());
    assert_eq!(graded.score, Some(2.0));
    assert_eq!(graded.max_score, Some(3.0));
    assert_eq!(graded.passed, Some(true));
    assert_eq!(graded.question_results.len(), 3);
    assert_eq!(graded.question_results[1].is_correct, Some(false));
}

#[tokio::test]
async fn test_grader_outage_is_transient() {
    let server = MockServer::start().await;
    let backend = client(&server);
    backend.start_attempt("grammar-a2").await.expect("start");
    backend.submit_attempt(ATTEMPT_ID).await.expect("submit");
    server.state.lock().fail_grades = 1;

    let err = backend.grade_attempt(ATTEMPT_ID).await.unwrap_err();
    assert!(matches!(
        err,
        ProctorError::Backend {
            kind: BackendErrorKind::Server,
            ..
        }
    ));
    assert!(err.is_transient());

    let graded = backend.grade_attempt(ATTEMPT_ID).await.expect("grade");
    assert!(graded.is_graded());
    assert_eq!(server.state.lock().grades, 2);
}
