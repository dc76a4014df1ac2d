//! The exam session controller.
//!
//! [`ExamSession`] owns the answer store, the countdown and the navigation
//! cursor of one attempt and drives the attempt through
//! `not_started -> in_progress -> finishing -> finished`.
//!
//! The controller is single-threaded: background work (ticks, answer saves)
//! reports back through [`SessionSignal`]s that the owner feeds into
//! [`ExamSession::handle_signal`]. Finishing is split in two phases so the
//! owner can keep handling signals while submission is in flight:
//!
//! 1. [`ExamSession::begin_finish`] moves to `finishing` and returns a
//!    [`FinishTicket`]. While finishing, every other finish trigger is a
//!    silent no-op.
//! 2. [`ExamSession::submission`] turns the ticket into a `'static` future
//!    that flushes unsaved answers, submits, then grades.
//! 3. [`ExamSession::complete_finish`] applies the outcome.
//!
//! [`ExamSession::finish_exam`] runs all three phases in one call.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::answers::AnswerStore;
use crate::backend::AttemptBackend;
use crate::config::SessionSettings;
use crate::cursor::NavigationCursor;
use crate::error::{ProctorError, Result};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::model::{AnswerValue, Attempt, Exam, Question};
use crate::persist::{AnswerPersister, SaveIndicator, SaveState};
use crate::signal::{SessionSignal, SignalReceiver, SignalSender};
use crate::timer::{format_clock, CountdownTimer, TickOutcome, Ticker, TimerPhase};

/// Remaining-time thresholds, in seconds, that raise a low-time event.
pub const LOW_TIME_THRESHOLDS: [u64; 2] = [300, 60];

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No attempt is running.
    #[default]
    NotStarted,
    /// The user is answering questions.
    InProgress,
    /// Submission and grading are in flight.
    Finishing,
    /// Submission completed, with a graded result or an error.
    Finished,
}

impl SessionStatus {
    /// Returns `true` while answers are accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use proctor_session::SessionStatus;
    ///
    /// assert!(SessionStatus::InProgress.is_in_progress());
    /// assert!(!SessionStatus::Finishing.is_in_progress());
    /// ```
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Returns `true` once submission has completed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Finishing => "finishing",
            Self::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

/// What started a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishTrigger {
    /// The user asked to submit.
    User,
    /// The time limit ran out.
    Timeout,
}

impl std::fmt::Display for FinishTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Everything a submission needs, captured when finishing begins.
#[derive(Debug, Clone)]
pub struct FinishTicket {
    epoch: u64,
    attempt_id: String,
    trigger: FinishTrigger,
    unsaved: Vec<(String, AnswerValue)>,
    skip_submit: bool,
}

impl FinishTicket {
    /// What started this submission.
    #[must_use]
    pub const fn trigger(&self) -> FinishTrigger {
        self.trigger
    }

    /// Attempt being submitted.
    #[must_use]
    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }
}

/// Step of the submission that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    /// The submit call failed; the attempt is still open on the server.
    Submit,
    /// The attempt was submitted but grading failed.
    Grade,
}

/// A failed submission.
#[derive(Debug)]
pub struct SubmissionFailure {
    /// Step that failed.
    pub stage: SubmissionStage,
    /// The submitted attempt, if the submit call succeeded in this run.
    pub submitted: Option<Attempt>,
    /// The backend error.
    pub error: ProctorError,
}

/// Result of running a submission.
#[derive(Debug)]
pub struct SubmissionOutcome {
    epoch: u64,
    trigger: FinishTrigger,
    flushed: Vec<(String, bool)>,
    result: std::result::Result<Attempt, SubmissionFailure>,
}

impl SubmissionOutcome {
    /// Returns `true` if the attempt was graded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Flushes unsaved answers, submits, then grades.
///
/// Flush failures do not stop the submission; the backend keeps the last
/// version it acknowledged and the failures are reported in the outcome.
async fn run_submission(
    backend: Arc<dyn AttemptBackend>,
    ticket: FinishTicket,
) -> SubmissionOutcome {
    let FinishTicket {
        epoch,
        attempt_id,
        trigger,
        unsaved,
        skip_submit,
    } = ticket;

    let mut flushed = Vec::with_capacity(unsaved.len());
    for (question_id, value) in unsaved {
        debug!(%question_id, "Flushing unsaved answer before submission");
        let saved = match backend.persist_answer(&attempt_id, &question_id, &value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%question_id, error = %e, "Answer could not be flushed before submission");
                false
            }
        };
        flushed.push((question_id, saved));
    }

    let outcome = |result: std::result::Result<Attempt, SubmissionFailure>| SubmissionOutcome {
        epoch,
        trigger,
        flushed: flushed.clone(),
        result,
    };

    let submitted = if skip_submit {
        debug!(%attempt_id, "Attempt already submitted; grading only");
        None
    } else {
        match backend.submit_attempt(&attempt_id).await {
            Ok(attempt) => Some(attempt),
            Err(error) => {
                return outcome(Err(SubmissionFailure {
                    stage: SubmissionStage::Submit,
                    submitted: None,
                    error,
                }))
            }
        }
    };

    match backend.grade_attempt(&attempt_id).await {
        Ok(graded) => outcome(Ok(graded)),
        Err(error) => outcome(Err(SubmissionFailure {
            stage: SubmissionStage::Grade,
            submitted,
            error,
        })),
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Everything a front end displays about a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Exam being taken.
    pub exam_id: Option<String>,
    /// Exam title.
    pub exam_title: Option<String>,
    /// Current attempt.
    pub attempt_id: Option<String>,
    /// Zero-based index of the displayed question.
    pub current_index: usize,
    /// Number of questions.
    pub total_questions: usize,
    /// Answered flag per question, in exam order.
    pub answered: Vec<bool>,
    /// Number of answered questions.
    pub answered_count: usize,
    /// Answered questions as a rounded percentage.
    pub answered_percentage: u32,
    /// Seconds left, for timed exams.
    pub remaining_secs: Option<u64>,
    /// Remaining time formatted as a clock, for timed exams.
    pub remaining_display: Option<String>,
    /// Countdown phase.
    pub timer_phase: TimerPhase,
    /// Aggregate save state.
    pub save_indicator: SaveIndicator,
    /// Whether every question has an answer.
    pub is_complete: bool,
    /// Last error message shown to the user.
    pub last_error: Option<String>,
    /// Last warning shown to the user.
    pub last_warning: Option<String>,
    /// The graded attempt.
    pub result: Option<Attempt>,
}

// ============================================================================
// Controller
// ============================================================================

/// Controller of one exam-taking session.
pub struct ExamSession {
    backend: Arc<dyn AttemptBackend>,
    settings: SessionSettings,
    user_id: Option<String>,
    events: EventBroadcaster,
    signals: SignalSender,
    epoch: u64,
    status: SessionStatus,
    exam: Option<Exam>,
    attempt: Option<Attempt>,
    answers: AnswerStore,
    cursor: NavigationCursor,
    timer: CountdownTimer,
    ticker: Ticker,
    persister: AnswerPersister,
    submitted: Option<Attempt>,
    result: Option<Attempt>,
    finish_failed: bool,
    last_error: Option<String>,
    last_warning: Option<String>,
}

impl std::fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamSession")
            .field("epoch", &self.epoch)
            .field("status", &self.status)
            .field("exam", &self.exam.as_ref().map(|e| &e.id))
            .field("attempt", &self.attempt.as_ref().map(|a| &a.id))
            .field("cursor", &self.cursor)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

impl ExamSession {
    /// Creates an idle session and the receiver its background tasks report to.
    ///
    /// The caller owns the receiver and must pass every signal it yields to
    /// [`ExamSession::handle_signal`].
    #[must_use]
    pub fn new(
        backend: Arc<dyn AttemptBackend>,
        settings: SessionSettings,
    ) -> (Self, SignalReceiver) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let persister =
            AnswerPersister::new(Arc::clone(&backend), signals.clone(), settings.debounce);
        let session = Self {
            backend,
            settings,
            user_id: None,
            events: EventBroadcaster::default(),
            signals,
            epoch: 0,
            status: SessionStatus::NotStarted,
            exam: None,
            attempt: None,
            answers: AnswerStore::new(),
            cursor: NavigationCursor::new(0),
            timer: CountdownTimer::new(),
            ticker: Ticker::new(),
            persister,
            submitted: None,
            result: None,
            finish_failed: false,
            last_error: None,
            last_warning: None,
        };
        (session, receiver)
    }

    /// Attaches the authenticated user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Publishes events on `events` instead of a private broadcaster.
    #[must_use]
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------------

    /// Fetches an exam from the backend.
    pub async fn load_exam(&mut self, exam_id: &str) -> Result<Exam> {
        match self.backend.get_exam(exam_id).await {
            Ok(exam) => {
                info!(exam_id, questions = exam.questions.len(), "Exam loaded");
                Ok(exam)
            }
            Err(e) => Err(self.surface(e)),
        }
    }

    /// Starts a new attempt on `exam`.
    ///
    /// Requires an authenticated user, an exam with at least one question
    /// and the backend's permission to start. On failure the session stays
    /// `not_started`, the message is kept in `last_error` and nothing else
    /// changes.
    pub async fn start_exam(&mut self, exam: Exam) -> Result<()> {
        if self.status != SessionStatus::NotStarted {
            return Err(self.surface(ProctorError::invalid_transition(
                self.status,
                SessionStatus::InProgress,
            )));
        }

        let user_id = match self.check_start_preconditions(&exam) {
            Ok(user_id) => user_id,
            Err(e) => return Err(self.surface(e)),
        };

        match self.backend.check_can_start_attempt(&user_id, &exam.id).await {
            Ok(true) => {}
            Ok(false) => return Err(self.surface(ProctorError::attempt_in_progress(&exam.id))),
            Err(e) => return Err(self.surface(e)),
        }

        let attempt = match self.backend.start_attempt(&exam.id).await {
            Ok(attempt) => attempt,
            Err(e) => return Err(self.surface(e)),
        };

        let remaining = exam.time_limit_secs();
        self.begin_session(exam, attempt, remaining, false);
        Ok(())
    }

    /// Adopts the caller's in-progress attempt on `exam`.
    ///
    /// Stored answers for questions of the exam are restored and the
    /// countdown continues from the time left since the attempt started. If
    /// the limit has already elapsed the attempt is submitted on the first
    /// tick.
    pub async fn resume_exam(&mut self, exam: Exam) -> Result<()> {
        if self.status != SessionStatus::NotStarted {
            return Err(self.surface(ProctorError::invalid_transition(
                self.status,
                SessionStatus::InProgress,
            )));
        }

        if let Err(e) = self.check_start_preconditions(&exam) {
            return Err(self.surface(e));
        }

        let attempt = match self.backend.get_in_progress_attempt(&exam.id).await {
            Ok(Some(attempt)) => attempt,
            Ok(None) => return Err(self.surface(ProctorError::nothing_to_resume(&exam.id))),
            Err(e) => return Err(self.surface(e)),
        };

        let remaining = exam
            .time_limit_secs()
            .map(|limit| limit.saturating_sub(attempt.elapsed_secs(Utc::now())));
        self.begin_session(exam, attempt, remaining, true);
        Ok(())
    }

    fn check_start_preconditions(&self, exam: &Exam) -> Result<String> {
        let user_id = self.user_id.clone().ok_or(ProctorError::NotAuthenticated)?;
        if exam.questions.is_empty() {
            return Err(ProctorError::exam_not_loaded(&exam.id));
        }
        Ok(user_id)
    }

    fn begin_session(&mut self, exam: Exam, attempt: Attempt, remaining: Option<u64>, resumed: bool) {
        self.epoch += 1;
        self.ticker.stop();
        self.timer.reset();
        self.persister.cancel_all();

        self.answers.clear();
        if resumed {
            let known: Vec<_> = attempt
                .answers
                .iter()
                .filter(|record| exam.question(&record.question_id).is_some())
                .cloned()
                .collect();
            self.answers.restore(&known);
        }
        self.cursor.reset(exam.questions.len());

        if let Some(secs) = remaining {
            self.timer.start(secs);
            self.ticker
                .start(self.settings.tick_period, self.epoch, self.signals.clone());
        }

        info!(
            exam_id = %exam.id,
            attempt_id = %attempt.id,
            questions = exam.questions.len(),
            remaining_secs = ?remaining,
            resumed,
            "Exam session started"
        );
        self.events.send(SessionEvent::started(
            &exam.id,
            &attempt.id,
            exam.questions.len(),
            remaining,
            resumed,
        ));

        self.exam = Some(exam);
        self.attempt = Some(attempt);
        self.submitted = None;
        self.result = None;
        self.finish_failed = false;
        self.last_error = None;
        self.last_warning = None;
        self.status = SessionStatus::InProgress;
    }

    // ------------------------------------------------------------------------
    // Answers
    // ------------------------------------------------------------------------

    /// Stores an answer and saves it in the background.
    ///
    /// Choice answers are saved immediately; typed answers are saved once the
    /// user pauses. Save failures never fail this call; they show up in the
    /// save indicator.
    pub fn submit_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(ProctorError::not_in_progress(self.status));
        }
        let (Some(exam), Some(attempt)) = (&self.exam, &self.attempt) else {
            return Err(ProctorError::not_in_progress(self.status));
        };
        let discrete = exam
            .question(question_id)
            .ok_or_else(|| ProctorError::unknown_question(question_id))?
            .kind
            .is_discrete();

        let answered = !value.is_empty();
        self.answers.set_answer(question_id, value.clone());
        self.persister
            .schedule(self.epoch, &attempt.id, question_id, value, discrete);

        debug!(question_id, answered, "Answer recorded");
        self.events.send(SessionEvent::answer_recorded(
            question_id,
            answered,
            self.answers.answered_count(),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Moves to the next question. Returns `false` on the last question.
    pub fn next_question(&mut self) -> bool {
        let moved = self.cursor.advance();
        self.after_navigation(moved)
    }

    /// Moves to the previous question. Returns `false` on the first question.
    pub fn previous_question(&mut self) -> bool {
        let moved = self.cursor.retreat();
        self.after_navigation(moved)
    }

    /// Jumps to `index`. Out-of-range indices leave the cursor unchanged.
    pub fn go_to_question(&mut self, index: usize) -> bool {
        let moved = self.cursor.jump_to(index);
        self.after_navigation(moved)
    }

    fn after_navigation(&self, moved: bool) -> bool {
        if moved {
            self.events.send(SessionEvent::navigated(self.cursor.current()));
        }
        moved
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// Applies a signal from a background task.
    ///
    /// Returns a ticket when the signal expired the countdown; the caller
    /// must run it through [`ExamSession::submission`] and
    /// [`ExamSession::complete_finish`].
    pub fn handle_signal(&mut self, signal: SessionSignal) -> Option<FinishTicket> {
        if signal.epoch() != self.epoch {
            debug!(
                signal_epoch = signal.epoch(),
                epoch = self.epoch,
                "Ignoring signal from a previous session"
            );
            return None;
        }

        match signal {
            SessionSignal::Tick { .. } => self.on_tick(),
            SessionSignal::Persisted {
                question_id,
                revision,
                result,
                ..
            } => {
                self.on_persisted(&question_id, revision, result);
                None
            }
        }
    }

    fn on_tick(&mut self) -> Option<FinishTicket> {
        match self.timer.tick() {
            TickOutcome::Ignored => None,
            TickOutcome::Ticked { remaining } => {
                let display = format_clock(remaining);
                self.events.send(SessionEvent::tick(remaining, &display));
                if LOW_TIME_THRESHOLDS.contains(&remaining) && self.timer.total() > remaining {
                    info!(remaining_secs = remaining, "Time is running low");
                    self.events.send(SessionEvent::low_time(remaining, display));
                }
                None
            }
            TickOutcome::Expired => {
                self.ticker.stop();
                self.events.send(SessionEvent::tick(0, format_clock(0)));
                info!("Time limit reached");
                self.begin_finish(FinishTrigger::Timeout)
            }
        }
    }

    fn on_persisted(&mut self, question_id: &str, revision: u64, result: Result<()>) {
        let latest = self
            .persister
            .on_persisted(question_id, revision, result.is_ok());
        match result {
            Ok(()) => debug!(question_id, revision, "Answer saved"),
            Err(e) if latest => {
                warn!(question_id, error = %e, "Saving answer failed");
                self.events
                    .send(SessionEvent::save_failed(question_id, e.to_string()));
            }
            Err(_) => {}
        }
    }

    // ------------------------------------------------------------------------
    // Finish
    // ------------------------------------------------------------------------

    /// Starts finishing the attempt.
    ///
    /// Returns `None` unless the session is in progress; in particular a
    /// second trigger while finishing is ignored. The returned ticket
    /// carries every answer not yet acknowledged by the backend.
    pub fn begin_finish(&mut self, trigger: FinishTrigger) -> Option<FinishTicket> {
        match self.status {
            SessionStatus::InProgress => {}
            SessionStatus::Finishing => {
                debug!(%trigger, "Finish already in progress; ignoring trigger");
                return None;
            }
            status => {
                debug!(%trigger, %status, "Nothing to finish");
                return None;
            }
        }
        let attempt_id = self.attempt.as_ref()?.id.clone();

        let mut unsaved = self.persister.take_unsaved();
        for question_id in self.persister.failed_questions() {
            if !unsaved.iter().any(|(id, _)| *id == question_id) {
                let value = self.answers.get_answer(&question_id).clone();
                unsaved.push((question_id, value));
            }
        }

        info!(%trigger, %attempt_id, unsaved = unsaved.len(), "Finishing attempt");
        self.status = SessionStatus::Finishing;
        self.last_error = None;
        self.last_warning = None;
        self.events.send(SessionEvent::finishing(trigger));

        Some(FinishTicket {
            epoch: self.epoch,
            attempt_id,
            trigger,
            unsaved,
            skip_submit: false,
        })
    }

    /// Retries a failed finish.
    ///
    /// Only valid from `finished` after an error. If the attempt was already
    /// submitted only grading is repeated.
    pub fn retry_finish(&mut self) -> Option<FinishTicket> {
        if self.status != SessionStatus::Finished || !self.finish_failed {
            debug!(status = %self.status, "Nothing to retry");
            return None;
        }
        let attempt_id = self.attempt.as_ref()?.id.clone();
        let skip_submit = self.submitted.is_some();

        let unsaved = if skip_submit {
            Vec::new()
        } else {
            self.persister
                .failed_questions()
                .into_iter()
                .map(|question_id| {
                    let value = self.answers.get_answer(&question_id).clone();
                    (question_id, value)
                })
                .collect()
        };

        info!(%attempt_id, skip_submit, "Retrying submission");
        self.status = SessionStatus::Finishing;
        self.finish_failed = false;
        self.last_error = None;
        // A submitted attempt keeps whatever the warning said about its answers.
        if !skip_submit {
            self.last_warning = None;
        }
        self.events.send(SessionEvent::finishing(FinishTrigger::User));

        Some(FinishTicket {
            epoch: self.epoch,
            attempt_id,
            trigger: FinishTrigger::User,
            unsaved,
            skip_submit,
        })
    }

    /// Returns the future that performs the submission described by `ticket`.
    ///
    /// The future does not borrow the session, so it can be spawned while
    /// the session keeps handling signals.
    pub fn submission(
        &self,
        ticket: FinishTicket,
    ) -> impl Future<Output = SubmissionOutcome> + Send + 'static {
        run_submission(Arc::clone(&self.backend), ticket)
    }

    /// Applies the outcome of a submission.
    ///
    /// Outcomes from an earlier session (after a reset) are ignored. On
    /// failure the session is still `finished`, the error is kept in
    /// `last_error` and [`ExamSession::retry_finish`] becomes available.
    pub fn complete_finish(&mut self, outcome: SubmissionOutcome) -> Result<()> {
        if outcome.epoch != self.epoch || self.status != SessionStatus::Finishing {
            debug!(
                outcome_epoch = outcome.epoch,
                epoch = self.epoch,
                status = %self.status,
                "Ignoring stale submission outcome"
            );
            return Ok(());
        }

        self.ticker.stop();
        self.timer.stop();
        self.status = SessionStatus::Finished;

        for (question_id, saved) in &outcome.flushed {
            self.persister.record_flush(question_id, *saved);
        }
        let count = outcome.flushed.iter().filter(|(_, saved)| !saved).count();
        if count > 0 {
            let submitted = match &outcome.result {
                Ok(_) => true,
                Err(failure) => failure.stage == SubmissionStage::Grade,
            };
            if submitted {
                warn!(count, "Submitted with answers the backend never acknowledged");
                self.last_warning = Some(format!(
                    "{count} answer(s) could not be saved before submission; the last saved version was submitted"
                ));
            } else {
                warn!(count, "Answers could not be saved and the attempt was not submitted");
                self.last_warning = Some(format!(
                    "{count} answer(s) could not be saved; they will be sent again when you retry"
                ));
            }
        }

        match outcome.result {
            Ok(graded) => {
                info!(
                    trigger = %outcome.trigger,
                    attempt_id = %graded.id,
                    score = ?graded.score,
                    percentage = ?graded.percentage,
                    passed = ?graded.passed,
                    "Attempt graded"
                );
                self.submitted = Some(graded.clone());
                self.finish_failed = false;
                self.events
                    .send(SessionEvent::finished(Some(graded.clone()), None));
                self.result = Some(graded);
                Ok(())
            }
            Err(failure) => {
                if let Some(submitted) = failure.submitted {
                    self.submitted = Some(submitted);
                }
                warn!(
                    stage = ?failure.stage,
                    error = %failure.error,
                    "Submission failed"
                );
                let message = failure.error.to_string();
                self.finish_failed = true;
                self.last_error = Some(message.clone());
                self.events.send(SessionEvent::finished(None, Some(message)));
                Err(failure.error)
            }
        }
    }

    /// Submits and grades the attempt in one call.
    ///
    /// From `in_progress` this finishes the attempt; from a failed
    /// `finished` it retries. While another finish is in flight it returns
    /// immediately without doing anything.
    pub async fn finish_exam(&mut self) -> Result<()> {
        let ticket = match self.status {
            SessionStatus::InProgress => self.begin_finish(FinishTrigger::User),
            SessionStatus::Finished if self.finish_failed => self.retry_finish(),
            SessionStatus::Finishing => {
                debug!("Finish already in progress; ignoring request");
                return Ok(());
            }
            status => {
                return Err(ProctorError::invalid_transition(
                    status,
                    SessionStatus::Finishing,
                ))
            }
        };
        let Some(ticket) = ticket else {
            return Ok(());
        };

        let outcome = self.submission(ticket).await;
        self.complete_finish(outcome)
    }

    // ------------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------------

    /// Returns the session to `not_started`, discarding all local state.
    ///
    /// Cancels the countdown and pending saves. Signals and submission
    /// outcomes from before the reset are ignored. Calling it twice is the
    /// same as calling it once.
    pub fn reset_attempt(&mut self) {
        self.epoch += 1;
        self.ticker.stop();
        self.timer.reset();
        self.persister.cancel_all();
        self.answers.clear();
        self.cursor.reset(0);

        self.status = SessionStatus::NotStarted;
        self.exam = None;
        self.attempt = None;
        self.submitted = None;
        self.result = None;
        self.finish_failed = false;
        self.last_error = None;
        self.last_warning = None;

        info!("Exam session reset");
        self.events.send(SessionEvent::Reset);
    }

    fn surface(&mut self, error: ProctorError) -> ProctorError {
        warn!(error = %error, "Session operation failed");
        self.last_error = Some(error.to_string());
        error
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Counter identifying the current session; bumped on start and reset.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The exam being taken.
    #[must_use]
    pub const fn exam(&self) -> Option<&Exam> {
        self.exam.as_ref()
    }

    /// The current attempt as returned by the backend when it started.
    #[must_use]
    pub const fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    /// Zero-based index of the displayed question.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.cursor.current()
    }

    /// The displayed question.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.exam
            .as_ref()
            .and_then(|exam| exam.questions.get(self.cursor.current()))
    }

    /// Current answer for a question, empty if none was given.
    #[must_use]
    pub fn answer(&self, question_id: &str) -> &AnswerValue {
        self.answers.get_answer(question_id)
    }

    /// Returns `true` if the question has a non-empty answer.
    #[must_use]
    pub fn is_answered(&self, question_id: &str) -> bool {
        self.answers.is_answered(question_id)
    }

    /// Number of answered questions.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.answered_count()
    }

    /// Answered questions as a percentage, rounded to the nearest integer.
    #[must_use]
    pub fn answered_percentage(&self) -> u32 {
        let total = self.cursor.total();
        if total == 0 {
            return 0;
        }
        let rounded = (self.answered_count() * 100 + total / 2) / total;
        u32::try_from(rounded).unwrap_or(100)
    }

    /// Returns `true` if every question of the exam has an answer.
    ///
    /// Advisory only: incomplete attempts may still be submitted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.exam.as_ref().is_some_and(|exam| {
            exam.questions
                .iter()
                .all(|question| self.answers.is_answered(&question.id))
        })
    }

    /// Questions without an answer, in exam order.
    #[must_use]
    pub fn unanswered_questions(&self) -> Vec<&Question> {
        self.exam.as_ref().map_or_else(Vec::new, |exam| {
            exam.questions
                .iter()
                .filter(|question| !self.answers.is_answered(&question.id))
                .collect()
        })
    }

    /// Seconds left, or `None` for untimed exams.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u64> {
        self.exam
            .as_ref()
            .and_then(Exam::time_limit_secs)
            .map(|_| self.timer.remaining())
    }

    /// Remaining time formatted as a clock, or `None` for untimed exams.
    #[must_use]
    pub fn remaining_display(&self) -> Option<String> {
        self.remaining_secs().map(|_| self.timer.display())
    }

    /// Save state of one answer.
    #[must_use]
    pub fn save_state(&self, question_id: &str) -> Option<SaveState> {
        self.persister.state(question_id)
    }

    /// Aggregate save indicator.
    #[must_use]
    pub fn save_indicator(&self) -> SaveIndicator {
        self.persister.indicator()
    }

    /// Last error message.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Last warning message.
    #[must_use]
    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    /// The graded attempt, once grading succeeded.
    #[must_use]
    pub const fn result(&self) -> Option<&Attempt> {
        self.result.as_ref()
    }

    /// Returns `true` if the last finish failed and can be retried.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.finish_failed
    }

    /// Returns `true` if the backend has confirmed the submission.
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    /// Captures everything a front end displays.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let answered = self.exam.as_ref().map_or_else(Vec::new, |exam| {
            exam.questions
                .iter()
                .map(|question| self.answers.is_answered(&question.id))
                .collect()
        });

        SessionSnapshot {
            status: self.status,
            exam_id: self.exam.as_ref().map(|exam| exam.id.clone()),
            exam_title: self.exam.as_ref().map(|exam| exam.title.clone()),
            attempt_id: self.attempt.as_ref().map(|attempt| attempt.id.clone()),
            current_index: self.cursor.current(),
            total_questions: self.cursor.total(),
            answered,
            answered_count: self.answered_count(),
            answered_percentage: self.answered_percentage(),
            remaining_secs: self.remaining_secs(),
            remaining_display: self.remaining_display(),
            timer_phase: self.timer.phase(),
            save_indicator: self.save_indicator(),
            is_complete: self.is_complete(),
            last_error: self.last_error.clone(),
            last_warning: self.last_warning.clone(),
            result: self.result.clone(),
        }
    }
}
