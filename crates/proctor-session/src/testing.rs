//! In-memory attempt backend for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::AttemptBackend;
use crate::error::{BackendErrorKind, ProctorError, Result};
use crate::model::{
    AnswerValue, Attempt, AttemptAnswer, AttemptStatus, Exam, Question, QuestionKind,
};

/// A call received by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    GetExam(String),
    CheckCanStart(String, String),
    StartAttempt(String),
    GetInProgress(String),
    Persist(String, String, AnswerValue),
    Submit(String),
    Grade(String),
}

impl BackendCall {
    pub fn persist(attempt_id: &str, question_id: &str, value: AnswerValue) -> Self {
        Self::Persist(attempt_id.to_string(), question_id.to_string(), value)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<BackendCall>,
    cannot_start: bool,
    in_progress: Option<Attempt>,
    fail_persist: bool,
    submit_failures: u32,
    grade_failures: u32,
    grade_delay: Option<Duration>,
    answers: Vec<AttemptAnswer>,
}

/// Records every call and answers from configurable canned state.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn deny_start(&self) {
        self.with_state(|s| s.cannot_start = true);
    }

    pub fn set_in_progress(&self, attempt: Attempt) {
        self.with_state(|s| s.in_progress = Some(attempt));
    }

    pub fn fail_persist(&self, fail: bool) {
        self.with_state(|s| s.fail_persist = fail);
    }

    pub fn fail_submit_times(&self, times: u32) {
        self.with_state(|s| s.submit_failures = times);
    }

    pub fn fail_grade_times(&self, times: u32) {
        self.with_state(|s| s.grade_failures = times);
    }

    pub fn delay_grade(&self, delay: Duration) {
        self.with_state(|s| s.grade_delay = Some(delay));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn persist_calls(&self) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Persist(..)))
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: BackendCall) {
        self.with_state(|s| s.calls.push(call));
    }
}

/// A three-question exam with the given time limit in minutes.
pub fn sample_exam(time_limit_minutes: Option<u32>) -> Exam {
    let mut exam = Exam::new("exam-1", "Sample Exam");
    exam.time_limit_minutes = time_limit_minutes;
    exam.questions = vec![
        Question {
            id: "q1".to_string(),
            kind: QuestionKind::SingleChoice,
            prompt: "Pick one".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            points: Some(1.0),
        },
        Question {
            id: "q2".to_string(),
            kind: QuestionKind::TrueFalse,
            prompt: "True or false".to_string(),
            options: vec!["true".to_string(), "false".to_string()],
            points: Some(1.0),
        },
        Question {
            id: "q3".to_string(),
            kind: QuestionKind::ShortAnswer,
            prompt: "Write a word".to_string(),
            options: Vec::new(),
            points: Some(1.0),
        },
    ];
    exam
}

#[async_trait]
impl AttemptBackend for FakeBackend {
    async fn get_exam(&self, exam_id: &str) -> Result<Exam> {
        self.record(BackendCall::GetExam(exam_id.to_string()));
        let mut exam = sample_exam(Some(1));
        exam.id = exam_id.to_string();
        Ok(exam)
    }

    async fn check_can_start_attempt(&self, user_id: &str, exam_id: &str) -> Result<bool> {
        self.record(BackendCall::CheckCanStart(
            user_id.to_string(),
            exam_id.to_string(),
        ));
        Ok(!self.with_state(|s| s.cannot_start))
    }

    async fn start_attempt(&self, exam_id: &str) -> Result<Attempt> {
        self.record(BackendCall::StartAttempt(exam_id.to_string()));
        Ok(Attempt::new("att-1", exam_id))
    }

    async fn get_in_progress_attempt(&self, exam_id: &str) -> Result<Option<Attempt>> {
        self.record(BackendCall::GetInProgress(exam_id.to_string()));
        Ok(self.with_state(|s| s.in_progress.clone()))
    }

    async fn persist_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: &AnswerValue,
    ) -> Result<()> {
        self.record(BackendCall::persist(attempt_id, question_id, answer.clone()));
        self.with_state(|s| {
            if s.fail_persist {
                return Err(ProctorError::backend(
                    "persist answer",
                    BackendErrorKind::Network,
                    "connection reset",
                ));
            }
            s.answers.retain(|a| a.question_id != question_id);
            s.answers.push(AttemptAnswer {
                question_id: question_id.to_string(),
                answer: answer.clone(),
            });
            Ok(())
        })
    }

    async fn submit_attempt(&self, attempt_id: &str) -> Result<Attempt> {
        self.record(BackendCall::Submit(attempt_id.to_string()));
        self.with_state(|s| {
            if s.submit_failures > 0 {
                s.submit_failures -= 1;
                return Err(ProctorError::backend(
                    "submit attempt",
                    BackendErrorKind::Server,
                    "503 Service Unavailable",
                ));
            }
            let mut attempt = Attempt::new(attempt_id, "exam-1");
            attempt.status = AttemptStatus::Submitted;
            attempt.submitted_at = Some(Utc::now());
            attempt.answers = s.answers.clone();
            Ok(attempt)
        })
    }

    async fn grade_attempt(&self, attempt_id: &str) -> Result<Attempt> {
        self.record(BackendCall::Grade(attempt_id.to_string()));
        if let Some(delay) = self.with_state(|s| s.grade_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            if s.grade_failures > 0 {
                s.grade_failures -= 1;
                return Err(ProctorError::backend(
                    "grade attempt",
                    BackendErrorKind::Server,
                    "grader unavailable",
                ));
            }
            let answered = u32::try_from(s.answers.len()).unwrap_or(u32::MAX);
            let mut attempt = Attempt::new(attempt_id, "exam-1");
            attempt.status = AttemptStatus::Graded;
            attempt.submitted_at = Some(Utc::now());
            attempt.answers = s.answers.clone();
            attempt.score = Some(f64::from(answered));
            attempt.max_score = Some(3.0);
            attempt.percentage = Some(f64::from(answered) / 3.0 * 100.0);
            attempt.passed = Some(answered >= 2);
            Ok(attempt)
        })
    }
}
