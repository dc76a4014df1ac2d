//! Session event types and broadcasting.
//!
//! The controller publishes a [`SessionEvent`] for every observable change
//! so that any number of front ends (the terminal UI, a log sink, tests) can
//! follow the session without polling it.
//!
//! # Event Types
//!
//! - `started` - An attempt was started or resumed
//! - `answer_recorded` - An answer was stored locally
//! - `navigated` - The current question changed
//! - `tick` - One second of the time limit elapsed
//! - `low_time` - Remaining time crossed a warning threshold
//! - `save_failed` - An answer could not be saved
//! - `finishing` - Submission began
//! - `finished` - Submission and grading completed or failed
//! - `reset` - The session returned to its initial state
//!
//! # Example
//!
//! ```
//! use proctor_session::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::tick(59, "00:59"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "tick");
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::Attempt;
use crate::session::FinishTrigger;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    /// Exam being taken.
    pub exam_id: String,
    /// Attempt that was started or resumed.
    pub attempt_id: String,
    /// Number of questions in the exam.
    pub total_questions: usize,
    /// Time limit in seconds, if the exam is timed.
    pub remaining_secs: Option<u64>,
    /// `true` when an existing attempt was resumed.
    pub resumed: bool,
    /// When the session started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `answer_recorded` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecordedPayload {
    /// Question that was answered.
    pub question_id: String,
    /// Whether the stored value is non-empty.
    pub answered: bool,
    /// Answered questions after this change.
    pub answered_count: usize,
}

/// Payload for the `navigated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigatedPayload {
    /// New zero-based question index.
    pub index: usize,
}

/// Payload for the `tick` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    /// Seconds left.
    pub remaining_secs: u64,
    /// Remaining time formatted as a clock.
    pub display: String,
}

/// Payload for the `save_failed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFailedPayload {
    /// Question whose answer could not be saved.
    pub question_id: String,
    /// Human-readable error message.
    pub message: String,
}

/// Payload for the `finishing` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishingPayload {
    /// What started the submission.
    pub trigger: FinishTrigger,
}

/// Payload for the `finished` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedPayload {
    /// The graded attempt, when grading succeeded.
    pub result: Option<Attempt>,
    /// Error message, when submission or grading failed.
    pub error: Option<String>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Observable session events.
///
/// All events serialize as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// An attempt was started or resumed.
    Started(StartedPayload),
    /// An answer was stored locally.
    AnswerRecorded(AnswerRecordedPayload),
    /// The current question changed.
    Navigated(NavigatedPayload),
    /// One tick of the countdown elapsed.
    Tick(TickPayload),
    /// Remaining time crossed a warning threshold.
    LowTime(TickPayload),
    /// An answer could not be saved.
    SaveFailed(SaveFailedPayload),
    /// Submission began.
    Finishing(FinishingPayload),
    /// The session finished.
    Finished(FinishedPayload),
    /// The session was reset.
    Reset,
}

impl SessionEvent {
    /// Creates a `Started` event.
    #[must_use]
    pub fn started(
        exam_id: impl Into<String>,
        attempt_id: impl Into<String>,
        total_questions: usize,
        remaining_secs: Option<u64>,
        resumed: bool,
    ) -> Self {
        Self::Started(StartedPayload {
            exam_id: exam_id.into(),
            attempt_id: attempt_id.into(),
            total_questions,
            remaining_secs,
            resumed,
            timestamp: Utc::now(),
        })
    }

    /// Creates an `AnswerRecorded` event.
    #[must_use]
    pub fn answer_recorded(
        question_id: impl Into<String>,
        answered: bool,
        answered_count: usize,
    ) -> Self {
        Self::AnswerRecorded(AnswerRecordedPayload {
            question_id: question_id.into(),
            answered,
            answered_count,
        })
    }

    /// Creates a `Navigated` event.
    #[must_use]
    pub const fn navigated(index: usize) -> Self {
        Self::Navigated(NavigatedPayload { index })
    }

    /// Creates a `Tick` event.
    #[must_use]
    pub fn tick(remaining_secs: u64, display: impl Into<String>) -> Self {
        Self::Tick(TickPayload {
            remaining_secs,
            display: display.into(),
        })
    }

    /// Creates a `LowTime` event.
    #[must_use]
    pub fn low_time(remaining_secs: u64, display: impl Into<String>) -> Self {
        Self::LowTime(TickPayload {
            remaining_secs,
            display: display.into(),
        })
    }

    /// Creates a `SaveFailed` event.
    #[must_use]
    pub fn save_failed(question_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SaveFailed(SaveFailedPayload {
            question_id: question_id.into(),
            message: message.into(),
        })
    }

    /// Creates a `Finishing` event.
    #[must_use]
    pub const fn finishing(trigger: FinishTrigger) -> Self {
        Self::Finishing(FinishingPayload { trigger })
    }

    /// Creates a `Finished` event.
    #[must_use]
    pub const fn finished(result: Option<Attempt>, error: Option<String>) -> Self {
        Self::Finished(FinishedPayload { result, error })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::AnswerRecorded(_) => "answer_recorded",
            Self::Navigated(_) => "navigated",
            Self::Tick(_) => "tick",
            Self::LowTime(_) => "low_time",
            Self::SaveFailed(_) => "save_failed",
            Self::Finishing(_) => "finishing",
            Self::Finished(_) => "finished",
            Self::Reset => "reset",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Uses a tokio broadcast channel. Events are not kept for subscribers that
/// join later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// the oldest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning how many subscribers will receive it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
