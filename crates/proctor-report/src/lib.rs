//! Proctor Report Generation
//!
//! This crate builds the result report of a finished exam attempt. Reports
//! can be serialized to JSON for programmatic access or rendered to Markdown
//! for the person who took the exam.
//!
//! # Types
//!
//! - [`Report`] - The complete report of one attempt
//! - [`ReportSummary`] - Score, pass/fail and timing of the attempt
//! - [`QuestionRow`] - The answer and grading result of one question
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Generate JSON reports with compact or pretty formatting
//! - [`MarkdownGenerator`] - Generate human-readable Markdown reports
//!
//! # Example
//!
//! ```rust
//! use proctor_report::Report;
//! use proctor_report::json::JsonGenerator;
//! use proctor_session::{Attempt, Exam};
//!
//! let exam = Exam::new("exam-1", "Grammar Basics");
//! let attempt = Attempt::new("att-1", "exam-1");
//!
//! let report = Report::from_attempt(&exam, &attempt);
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("Grammar Basics"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use proctor_session::{AnswerValue, Attempt, AttemptStatus, Exam, ExamSession, QuestionKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report Status
// ============================================================================

/// Outcome of the attempt as shown in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// The attempt was never submitted.
    #[default]
    NotSubmitted,
    /// Submitted, but grading did not complete.
    Submitted,
    /// Graded without a pass threshold.
    Graded,
    /// Graded and passed.
    Passed,
    /// Graded and failed.
    Failed,
}

impl ReportStatus {
    /// Returns `true` if a score is available.
    #[must_use]
    pub const fn is_graded(&self) -> bool {
        matches!(self, Self::Graded | Self::Passed | Self::Failed)
    }

    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NotSubmitted => "Not submitted",
            Self::Submitted => "Submitted, awaiting grading",
            Self::Graded => "Graded",
            Self::Passed => "Passed",
            Self::Failed => "Not passed",
        }
    }

    fn of(exam: &Exam, attempt: &Attempt) -> Self {
        match attempt.status {
            AttemptStatus::Graded => {
                let passed = attempt.passed.or_else(|| {
                    exam.passing_score
                        .zip(attempt.percentage)
                        .map(|(threshold, percentage)| percentage >= threshold)
                });
                match passed {
                    Some(true) => Self::Passed,
                    Some(false) => Self::Failed,
                    None => Self::Graded,
                }
            }
            AttemptStatus::Submitted => Self::Submitted,
            AttemptStatus::NotStarted | AttemptStatus::InProgress => Self::NotSubmitted,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Report
// ============================================================================

/// Result report of one exam attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Exam identifier.
    pub exam_id: String,

    /// Exam title.
    pub exam_title: String,

    /// CEFR level of the exam, if tagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cefr_level: Option<String>,

    /// Attempt identifier.
    pub attempt_id: String,

    /// Score and timing summary.
    pub summary: ReportSummary,

    /// One row per exam question, in exam order.
    pub questions: Vec<QuestionRow>,

    /// Overall feedback from the grader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// Warning attached by the session (for example unsaved answers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// Score and timing of the attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Outcome of the attempt.
    pub status: ReportStatus,

    /// Points scored.
    pub score: Option<f64>,

    /// Points available.
    pub max_score: Option<f64>,

    /// Score as a percentage.
    pub percentage: Option<f64>,

    /// Percentage required to pass.
    pub passing_score: Option<f64>,

    /// Number of answered questions.
    pub answered: usize,

    /// Number of questions.
    pub total_questions: usize,

    /// Seconds between start and submission.
    pub duration_seconds: Option<u64>,
}

/// Answer and result of one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRow {
    /// One-based position in the exam.
    pub number: usize,

    /// Question identifier.
    pub question_id: String,

    /// Question kind.
    pub kind: QuestionKind,

    /// Question text.
    pub prompt: String,

    /// The given answer, if any.
    pub answer: Option<AnswerValue>,

    /// Whether the answer was correct (graded attempts only).
    pub is_correct: Option<bool>,

    /// Points awarded (graded attempts only).
    pub points_awarded: Option<f64>,

    /// Per-question feedback from the grader.
    pub feedback: Option<String>,
}

impl Report {
    /// Builds the report of `attempt` on `exam`.
    ///
    /// Answers and grading results come from the attempt; questions the
    /// attempt has no answer for are listed as unanswered.
    #[must_use]
    pub fn from_attempt(exam: &Exam, attempt: &Attempt) -> Self {
        let questions: Vec<QuestionRow> = exam
            .questions
            .iter()
            .enumerate()
            .map(|(i, question)| {
                let answer = attempt
                    .answers
                    .iter()
                    .find(|a| a.question_id == question.id)
                    .map(|a| a.answer.clone())
                    .filter(|value| !value.is_empty());
                let result = attempt
                    .question_results
                    .iter()
                    .find(|r| r.question_id == question.id);
                QuestionRow {
                    number: i + 1,
                    question_id: question.id.clone(),
                    kind: question.kind,
                    prompt: question.prompt.clone(),
                    answer,
                    is_correct: result.and_then(|r| r.is_correct),
                    points_awarded: result.and_then(|r| r.points_awarded),
                    feedback: result.and_then(|r| r.feedback.clone()),
                }
            })
            .collect();

        let duration_seconds = attempt
            .started_at
            .zip(attempt.submitted_at)
            .and_then(|(started, submitted)| u64::try_from((submitted - started).num_seconds()).ok());

        let summary = ReportSummary {
            status: ReportStatus::of(exam, attempt),
            score: attempt.score,
            max_score: attempt.max_score,
            percentage: attempt.percentage,
            passing_score: exam.passing_score,
            answered: questions.iter().filter(|row| row.answer.is_some()).count(),
            total_questions: questions.len(),
            duration_seconds,
        };

        Self {
            exam_id: exam.id.clone(),
            exam_title: exam.title.clone(),
            cefr_level: exam.cefr_level.clone(),
            attempt_id: attempt.id.clone(),
            summary,
            questions,
            feedback: attempt.feedback.clone(),
            warning: None,
            generated_at: Utc::now(),
        }
    }

    /// Builds the report of the session's current attempt.
    ///
    /// Uses the graded attempt when available, otherwise the attempt as
    /// started, with answers filled in from the session.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the session has no exam or
    /// attempt.
    pub fn from_session(session: &ExamSession) -> Result<Self> {
        let exam = session
            .exam()
            .ok_or_else(|| ReportError::InvalidData("no exam loaded".to_string()))?;
        let attempt = session
            .result()
            .or_else(|| session.attempt())
            .ok_or_else(|| ReportError::InvalidData("no attempt started".to_string()))?;

        let mut report = Self::from_attempt(exam, attempt);
        for row in &mut report.questions {
            if row.answer.is_none() && session.is_answered(&row.question_id) {
                row.answer = Some(session.answer(&row.question_id).clone());
            }
        }
        report.summary.answered = report
            .questions
            .iter()
            .filter(|row| row.answer.is_some())
            .count();
        if session.result().is_none() && session.is_submitted() {
            report.summary.status = ReportStatus::Submitted;
        }
        report.warning = session.last_warning().map(str::to_string);
        Ok(report)
    }

    /// Serializes the report to JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Number of questions graded as correct.
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|row| row.is_correct == Some(true))
            .count()
    }
}
