//! Paths of the exam service endpoints, relative to the base URL.

/// `GET` an exam with its questions.
#[must_use]
pub fn exam(exam_id: &str) -> String {
    format!("/exams/{exam_id}")
}

/// `GET` whether a user may start a new attempt (`?user_id=`).
#[must_use]
pub fn can_start(exam_id: &str) -> String {
    format!("/exams/{exam_id}/attempts/can-start")
}

/// `POST` to start a new attempt.
#[must_use]
pub fn attempts(exam_id: &str) -> String {
    format!("/exams/{exam_id}/attempts")
}

/// `GET` the caller's in-progress attempt.
#[must_use]
pub fn in_progress(exam_id: &str) -> String {
    format!("/exams/{exam_id}/attempts/in-progress")
}

/// `PUT` the answer to one question.
#[must_use]
pub fn answer(attempt_id: &str, question_id: &str) -> String {
    format!("/attempts/{attempt_id}/answers/{question_id}")
}

/// `POST` to submit an attempt.
#[must_use]
pub fn submit(attempt_id: &str) -> String {
    format!("/attempts/{attempt_id}/submit")
}

/// `POST` to grade a submitted attempt.
#[must_use]
pub fn grade(attempt_id: &str) -> String {
    format!("/attempts/{attempt_id}/grade")
}
