//! Exam and attempt types exchanged with the exam backend.
//!
//! These types mirror the JSON documents served by the REST backend. The
//! session controller reads exams and owns one attempt at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Exam
// ============================================================================

/// The kind of a question, which decides the shape of its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick exactly one option.
    SingleChoice,
    /// Pick any number of options.
    MultipleChoice,
    /// Pick "true" or "false".
    TrueFalse,
    /// Type the missing word(s).
    FillBlank,
    /// Type a short free-text answer.
    ShortAnswer,
    /// Type a long free-text answer.
    Essay,
}

impl QuestionKind {
    /// Returns `true` for answers chosen from a fixed set of options.
    ///
    /// Discrete answers are saved immediately; everything else is typed and
    /// saved once the user pauses.
    #[must_use]
    pub const fn is_discrete(&self) -> bool {
        matches!(
            self,
            Self::SingleChoice | Self::MultipleChoice | Self::TrueFalse
        )
    }
}

/// A single exam question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier of the question.
    pub id: String,

    /// Question kind.
    #[serde(rename = "type")]
    pub kind: QuestionKind,

    /// The text shown to the user.
    pub prompt: String,

    /// Options for choice questions.
    #[serde(default)]
    pub options: Vec<String>,

    /// Points awarded for a correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

/// An exam as served by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    /// Unique identifier of the exam.
    pub id: String,

    /// Exam title.
    pub title: String,

    /// Optional description shown before starting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// CEFR level tag (A1 to C2); opaque to the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cefr_level: Option<String>,

    /// Time limit in minutes; `None` or zero means untimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,

    /// Maximum number of attempts per user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_allowed: Option<u32>,

    /// Minimum percentage required to pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_score: Option<f64>,

    /// Ordered questions.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Exam {
    /// Returns the time limit in seconds, or `None` for untimed exams.
    ///
    /// # Examples
    ///
    /// ```
    /// use proctor_session::Exam;
    ///
    /// let mut exam = Exam::new("e1", "Grammar");
    /// assert_eq!(exam.time_limit_secs(), None);
    ///
    /// exam.time_limit_minutes = Some(2);
    /// assert_eq!(exam.time_limit_secs(), Some(120));
    /// ```
    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u64> {
        self.time_limit_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| u64::from(minutes) * 60)
    }

    /// Creates an untimed exam without questions.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            cefr_level: None,
            time_limit_minutes: None,
            attempts_allowed: None,
            passing_score: None,
            questions: Vec::new(),
        }
    }

    /// Looks up a question by identifier.
    #[must_use]
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

// ============================================================================
// Answers
// ============================================================================

/// The value of one answer.
///
/// Choice and free-text questions carry a single string; multiple-choice
/// questions carry the list of selected options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// A single option or typed text.
    Text(String),
    /// Selected options of a multiple-choice question.
    Choices(Vec<String>),
}

/// The empty answer returned for untouched questions.
pub static EMPTY_ANSWER: AnswerValue = AnswerValue::Text(String::new());

impl Default for AnswerValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl AnswerValue {
    /// Creates a text answer.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Creates a multiple-choice answer.
    #[must_use]
    pub fn choices<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choices(values.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if nothing meaningful has been entered.
    ///
    /// Whitespace-only text counts as empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Choices(choices) => choices.iter().all(|c| c.trim().is_empty()),
        }
    }
}

impl std::fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Choices(choices) => write!(f, "{}", choices.join(", ")),
        }
    }
}

// ============================================================================
// Attempt
// ============================================================================

/// Server-side status of an attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Created but not yet started.
    #[default]
    NotStarted,
    /// The user is answering questions.
    InProgress,
    /// Answers were submitted; grading pending.
    Submitted,
    /// Grading completed.
    Graded,
}

impl AttemptStatus {
    /// Returns `true` once the attempt has been submitted.
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted | Self::Graded)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Submitted => write!(f, "submitted"),
            Self::Graded => write!(f, "graded"),
        }
    }
}

/// One stored answer of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptAnswer {
    /// Question the answer belongs to.
    pub question_id: String,
    /// The answer value.
    pub answer: AnswerValue,
}

/// Grading outcome for a single question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionResult {
    /// Question the result belongs to.
    pub question_id: String,

    /// Whether the answer was judged correct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,

    /// Points awarded for this question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<f64>,

    /// Feedback from the grader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// One user's pass through one exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Unique identifier of the attempt.
    pub id: String,

    /// Exam the attempt belongs to.
    pub exam_id: String,

    /// Current status.
    #[serde(default)]
    pub status: AttemptStatus,

    /// Answers recorded so far, in question order.
    #[serde(default)]
    pub answers: Vec<AttemptAnswer>,

    /// When the attempt was started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the attempt was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    /// Points scored (graded attempts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Maximum points available (graded attempts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,

    /// Score as a percentage (graded attempts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,

    /// Whether the attempt passed (graded attempts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,

    /// Overall feedback from the grader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// Per-question grading results.
    #[serde(default)]
    pub question_results: Vec<QuestionResult>,
}

impl Attempt {
    /// Creates a fresh in-progress attempt started now.
    #[must_use]
    pub fn new(id: impl Into<String>, exam_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            exam_id: exam_id.into(),
            status: AttemptStatus::InProgress,
            answers: Vec::new(),
            started_at: Some(Utc::now()),
            submitted_at: None,
            score: None,
            max_score: None,
            percentage: None,
            passed: None,
            feedback: None,
            question_results: Vec::new(),
        }
    }

    /// Returns `true` if grading has completed.
    #[must_use]
    pub fn is_graded(&self) -> bool {
        self.status == AttemptStatus::Graded
    }

    /// Seconds elapsed since the attempt started, measured at `now`.
    #[must_use]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        self.started_at
            .map_or(0, |started| {
                u64::try_from((now - started).num_seconds()).unwrap_or(0)
            })
    }
}
