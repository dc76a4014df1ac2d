//! The attempt backend the session controller talks to.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{AnswerValue, Attempt, Exam};

/// Remote operations on exams and attempts.
///
/// The controller owns the session state; the backend records it. Every
/// method is a suspension point, so implementations must not assume they
/// are called in any particular order except that `submit_attempt`
/// completes before `grade_attempt` is requested for the same attempt.
#[async_trait]
pub trait AttemptBackend: Send + Sync + 'static {
    /// Fetches an exam with its questions and settings.
    async fn get_exam(&self, exam_id: &str) -> Result<Exam>;

    /// Returns `true` if `user_id` may start a new attempt on `exam_id`.
    async fn check_can_start_attempt(&self, user_id: &str, exam_id: &str) -> Result<bool>;

    /// Creates a new in-progress attempt.
    async fn start_attempt(&self, exam_id: &str) -> Result<Attempt>;

    /// Returns the caller's in-progress attempt on `exam_id`, if any.
    async fn get_in_progress_attempt(&self, exam_id: &str) -> Result<Option<Attempt>>;

    /// Records the current answer for one question.
    async fn persist_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: &AnswerValue,
    ) -> Result<()>;

    /// Marks the attempt as submitted.
    async fn submit_attempt(&self, attempt_id: &str) -> Result<Attempt>;

    /// Grades a submitted attempt, returning score and feedback.
    async fn grade_attempt(&self, attempt_id: &str) -> Result<Attempt>;
}
