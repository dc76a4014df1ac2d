//! Proctor Session Controller
//!
//! Drives one exam attempt from start to graded result: answers, navigation,
//! countdown, background saving and the submit/grade sequence.

pub mod answers;
pub mod backend;
pub mod config;
pub mod cursor;
pub mod error;
pub mod events;
pub mod model;
pub mod persist;
pub mod session;
pub mod signal;
pub mod timer;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use answers::AnswerStore;
pub use backend::AttemptBackend;
pub use config::{Config, SessionSettings, CONFIG_FILE_NAME};
pub use cursor::NavigationCursor;
pub use error::{BackendErrorKind, ProctorError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use model::{
    AnswerValue, Attempt, AttemptAnswer, AttemptStatus, Exam, Question, QuestionKind,
    QuestionResult,
};
pub use persist::{AnswerPersister, SaveIndicator, SaveState};
pub use session::{
    ExamSession, FinishTicket, FinishTrigger, SessionSnapshot, SessionStatus, SubmissionFailure,
    SubmissionOutcome, SubmissionStage, LOW_TIME_THRESHOLDS,
};
pub use signal::{SessionSignal, SignalReceiver, SignalSender};
pub use timer::{format_clock, CountdownTimer, TickOutcome, Ticker, TimerPhase};
