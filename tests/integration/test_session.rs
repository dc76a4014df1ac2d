//! End-to-end tests of the exam session over HTTP.
//!
//! Each test drives an [`ExamSession`] backed by the real [`HttpBackend`]
//! against the in-process mock service, feeding background signals back
//! into the session the way the CLI event loop does.

mod mock_backend;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mock_backend::{fixture_exam, fixture_path, MockServer, ATTEMPT_ID};
use proctor_backend::HttpBackend;
use proctor_report::{MarkdownGenerator, Report, ReportStatus};
use proctor_session::{
    AnswerValue, Attempt, AttemptAnswer, Config, ExamSession, FinishTrigger, ProctorError,
    SaveIndicator, SessionEvent, SessionSettings, SessionStatus, SignalReceiver,
};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn settings() -> SessionSettings {
    SessionSettings {
        debounce: Duration::from_millis(50),
        tick_period: Duration::from_millis(20),
    }
}

fn new_session(server: &MockServer) -> (ExamSession, SignalReceiver) {
    let backend =
        HttpBackend::new(&server.base_url, Duration::from_secs(5)).expect("Failed to build client");
    let (session, signals) = ExamSession::new(Arc::new(backend), settings());
    (session.with_user("student-1"), signals)
}

/// Feeds signals into the session until `done` holds, running any
/// submission a signal triggers.
async fn drive_until(
    session: &mut ExamSession,
    signals: &mut SignalReceiver,
    done: impl Fn(&ExamSession) -> bool,
) {
    while !done(session) {
        let signal = timeout(WAIT, signals.recv())
            .await
            .expect("Timed out waiting for a session signal")
            .expect("Signal channel closed");
        if let Some(ticket) = session.handle_signal(signal) {
            let outcome = session.submission(ticket).await;
            let _ = session.complete_finish(outcome);
        }
    }
}

fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_full_attempt_is_saved_submitted_and_graded() {
    let server = MockServer::start().await;
    let (mut session, mut signals) = new_session(&server);

    let exam = session.load_exam("grammar-a2").await.expect("load exam");
    session.start_exam(exam).await.expect("start");
    assert_eq!(session.status(), SessionStatus::InProgress);
    assert_eq!(session.remaining_secs(), Some(600));

    session
        .submit_answer("q1", AnswerValue::text("goes"))
        .expect("answer q1");
    session
        .submit_answer("q2", AnswerValue::choices(["run", "eat"]))
        .expect("answer q2");
    session
        .submit_answer("q3", AnswerValue::text("see"))
        .expect("answer q3");
    session
        .submit_answer("q3", AnswerValue::text("saw"))
        .expect("answer q3");
    assert!(session.is_complete());

    drive_until(&mut session, &mut signals, |s| {
        s.save_indicator() == SaveIndicator::Saved
    })
    .await;

    {
        let state = server.state.lock();
        let q3: Vec<_> = state.persisted.iter().filter(|(q, _)| q == "q3").collect();
        assert_eq!(q3.len(), 1, "typed edits should be saved once");
        assert_eq!(q3[0].1, AnswerValue::text("saw"));
        assert_eq!(state.persisted.len(), 3);
    }

    session.finish_exam().await.expect("finish");

    assert_eq!(session.status(), SessionStatus::Finished);
    let result = session.result().expect("graded result");
    assert_eq!(result.score, Some(3.0));
    assert_eq!(result.passed, Some(true));
    assert!(session.last_warning().is_none());

    let state = server.state.lock();
    assert_eq!(state.submits, 1);
    assert_eq!(state.grades, 1);
}

#[tokio::test]
async fn test_unsaved_typed_answer_is_flushed_before_submit() {
    let server = MockServer::start().await;
    let (mut session, _signals) = new_session(&server);

    session.start_exam(fixture_exam()).await.expect("start");
    session
        .submit_answer("q3", AnswerValue::text("saw"))
        .expect("answer q3");

    // Finish before the debounce fires.
    session.finish_exam().await.expect("finish");

    let result = session.result().expect("graded result");
    assert_eq!(result.score, Some(1.0));
    assert_eq!(result.question_results[2].is_correct, Some(true));
    assert_eq!(
        server.state.lock().persisted,
        vec![("q3".to_string(), AnswerValue::text("saw"))]
    );
}

#[tokio::test]
async fn test_resumed_attempt_past_its_limit_is_submitted_on_timeout() {
    let server = MockServer::start().await;
    {
        let mut state = server.state.lock();
        let mut attempt = Attempt::new(ATTEMPT_ID, "grammar-a2");
        attempt.started_at = Some(Utc::now() - chrono::Duration::minutes(11));
        attempt.answers.push(AttemptAnswer {
            question_id: "q1".to_string(),
            answer: AnswerValue::text("goes"),
        });
        state.attempt = Some(attempt);
    }

    let (mut session, mut signals) = new_session(&server);
    let mut events = session.subscribe();

    session.resume_exam(fixture_exam()).await.expect("resume");
    assert_eq!(session.answer("q1"), &AnswerValue::text("goes"));
    assert_eq!(session.remaining_secs(), Some(0));

    drive_until(&mut session, &mut signals, |s| s.status().is_finished()).await;

    let result = session.result().expect("graded result");
    assert_eq!(result.score, Some(1.0));
    assert_eq!(result.passed, Some(false));

    let seen = drain_events(&mut events);
    assert!(seen.iter().any(|event| matches!(
        event,
        SessionEvent::Started(payload) if payload.resumed
    )));
    assert!(seen.iter().any(|event| matches!(
        event,
        SessionEvent::Finishing(payload) if payload.trigger == FinishTrigger::Timeout
    )));

    let state = server.state.lock();
    assert_eq!(state.submits, 1);
    assert_eq!(state.grades, 1);
}

#[tokio::test]
async fn test_grading_failure_can_be_retried_without_resubmitting() {
    let server = MockServer::start().await;
    server.state.lock().fail_grades = 1;
    let (mut session, _signals) = new_session(&server);

    session.start_exam(fixture_exam()).await.expect("start");
    session
        .submit_answer("q1", AnswerValue::text("goes"))
        .expect("answer q1");

    let err = session.finish_exam().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(session.status(), SessionStatus::Finished);
    assert!(session.can_retry());
    assert!(session.is_submitted());
    assert!(session.result().is_none());

    session.finish_exam().await.expect("retry");

    assert!(!session.can_retry());
    assert_eq!(session.result().expect("graded").score, Some(1.0));
    let state = server.state.lock();
    assert_eq!(state.submits, 1);
    assert_eq!(state.grades, 2);
}

#[tokio::test]
async fn test_failed_save_is_reported_and_retried_at_finish() {
    let server = MockServer::start().await;
    server.state.lock().fail_persist = true;
    let (mut session, mut signals) = new_session(&server);
    let mut events = session.subscribe();

    session.start_exam(fixture_exam()).await.expect("start");
    session
        .submit_answer("q1", AnswerValue::text("goes"))
        .expect("answer q1");

    drive_until(&mut session, &mut signals, |s| {
        s.save_indicator() == SaveIndicator::Failed
    })
    .await;
    assert!(drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::SaveFailed(p) if p.question_id == "q1")));

    server.state.lock().fail_persist = false;
    session.finish_exam().await.expect("finish");

    assert!(session.last_warning().is_none());
    assert_eq!(session.result().expect("graded").score, Some(1.0));
    assert_eq!(
        server.state.lock().persisted,
        vec![("q1".to_string(), AnswerValue::text("goes"))]
    );
}

#[tokio::test]
async fn test_start_denied_leaves_session_idle() {
    let server = MockServer::start().await;
    server.state.lock().can_start = false;
    let (mut session, _signals) = new_session(&server);

    let err = session.start_exam(fixture_exam()).await.unwrap_err();

    assert!(matches!(err, ProctorError::AttemptInProgress { .. }));
    assert_eq!(session.status(), SessionStatus::NotStarted);
    assert!(session.last_error().is_some());
    assert!(server.state.lock().attempt.is_none());
}

#[tokio::test]
async fn test_resume_without_attempt_fails() {
    let server = MockServer::start().await;
    let (mut session, _signals) = new_session(&server);

    let err = session.resume_exam(fixture_exam()).await.unwrap_err();

    assert!(matches!(err, ProctorError::NothingToResume { .. }));
    assert_eq!(session.status(), SessionStatus::NotStarted);
}

#[tokio::test]
async fn test_report_from_graded_session() {
    let server = MockServer::start().await;
    let (mut session, _signals) = new_session(&server);

    session.start_exam(fixture_exam()).await.expect("start");
    session
        .submit_answer("q1", AnswerValue::text("goes"))
        .expect("answer q1");
    session
        .submit_answer("q2", AnswerValue::choices(["run", "eat"]))
        .expect("answer q2");
    session.finish_exam().await.expect("finish");

    let report = Report::from_session(&session).expect("report");
    assert_eq!(report.summary.status, ReportStatus::Passed);
    assert_eq!(report.summary.answered, 2);
    assert_eq!(report.correct_count(), 2);

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("# Exam Report: Grammar Basics"));
    assert!(markdown.contains("| Score | 2 / 3 |"));
    assert!(markdown.contains("Keep practising irregular verbs."));
}

#[tokio::test]
async fn test_reset_ignores_late_saves() {
    let server = MockServer::start().await;
    let (mut session, mut signals) = new_session(&server);

    session.start_exam(fixture_exam()).await.expect("start");
    session
        .submit_answer("q1", AnswerValue::text("goes"))
        .expect("answer q1");
    session.reset_attempt();

    // The immediate save may still complete; its signal belongs to the old epoch.
    if let Ok(Some(signal)) = timeout(Duration::from_millis(500), signals.recv()).await {
        assert!(session.handle_signal(signal).is_none());
    }

    assert_eq!(session.status(), SessionStatus::NotStarted);
    assert_eq!(session.answered_count(), 0);
    assert_eq!(session.save_indicator(), SaveIndicator::Idle);
}

#[test]
fn test_fixture_config_loads() {
    let config =
        Config::load_from_file(&fixture_path().join("proctor.json")).expect("Failed to load config");

    config.validate().expect("fixture config is valid");
    assert_eq!(config.user_id.as_deref(), Some("student-1"));
    assert_eq!(config.exam_id.as_deref(), Some("grammar-a2"));
    assert_eq!(
        config.session_settings().debounce,
        Duration::from_millis(400)
    );
    assert!(config.confirm_incomplete_submit);
}
