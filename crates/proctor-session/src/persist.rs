//! Background saving of answers.
//!
//! Choice answers are sent as soon as they change. Typed answers are
//! debounced per question: each change cancels the pending save for that
//! question and schedules a new one carrying the latest value, so a burst
//! of keystrokes produces a single call once the user pauses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::AttemptBackend;
use crate::model::AnswerValue;
use crate::signal::{SessionSignal, SignalSender};

/// Save state of a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    /// A save is scheduled or in flight.
    Pending,
    /// The latest value was acknowledged by the backend.
    Saved,
    /// The latest save failed; the next change retries it.
    Failed,
}

/// Aggregate save indicator shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveIndicator {
    /// Nothing has been saved yet.
    #[default]
    Idle,
    /// At least one save is pending.
    Saving,
    /// Every answer is saved.
    Saved,
    /// At least one answer failed to save.
    Failed,
}

/// A debounced save that has not fired yet.
#[derive(Debug)]
struct PendingSave {
    handle: JoinHandle<()>,
    value: AnswerValue,
}

/// Dispatches persist calls and tracks their outcome per question.
pub struct AnswerPersister {
    backend: Arc<dyn AttemptBackend>,
    signals: SignalSender,
    debounce: Duration,
    pending: HashMap<String, PendingSave>,
    revisions: HashMap<String, u64>,
    states: HashMap<String, SaveState>,
}

impl std::fmt::Debug for AnswerPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerPersister")
            .field("debounce", &self.debounce)
            .field("pending", &self.pending.len())
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl AnswerPersister {
    /// Creates a persister that reports outcomes on `signals`.
    #[must_use]
    pub fn new(backend: Arc<dyn AttemptBackend>, signals: SignalSender, debounce: Duration) -> Self {
        Self {
            backend,
            signals,
            debounce,
            pending: HashMap::new(),
            revisions: HashMap::new(),
            states: HashMap::new(),
        }
    }

    /// Schedules a save of `value`.
    ///
    /// Discrete answers are sent immediately and never cancelled. Typed
    /// answers replace any pending save for the same question. Must be
    /// called from within a Tokio runtime.
    pub fn schedule(
        &mut self,
        epoch: u64,
        attempt_id: &str,
        question_id: &str,
        value: AnswerValue,
        discrete: bool,
    ) {
        let revision = {
            let counter = self.revisions.entry(question_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        self.states
            .insert(question_id.to_string(), SaveState::Pending);

        if let Some(previous) = self.pending.remove(question_id) {
            previous.handle.abort();
        }

        let delay = if discrete { None } else { Some(self.debounce) };
        debug!(
            question_id,
            revision,
            debounced = !discrete,
            "Scheduling answer save"
        );

        let handle = self.spawn_save(epoch, attempt_id, question_id, value.clone(), revision, delay);
        if !discrete {
            self.pending
                .insert(question_id.to_string(), PendingSave { handle, value });
        }
    }

    fn spawn_save(
        &self,
        epoch: u64,
        attempt_id: &str,
        question_id: &str,
        value: AnswerValue,
        revision: u64,
        delay: Option<Duration>,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let signals = self.signals.clone();
        let attempt_id = attempt_id.to_string();
        let question_id = question_id.to_string();

        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = backend
                .persist_answer(&attempt_id, &question_id, &value)
                .await;
            let signal = SessionSignal::Persisted {
                epoch,
                question_id,
                revision,
                result,
            };
            if signals.send(signal).is_err() {
                debug!("Session closed before answer save completed");
            }
        })
    }

    /// Records the outcome of a save.
    ///
    /// Returns `true` if the outcome belongs to the latest revision of the
    /// answer; outcomes of superseded revisions leave the state untouched.
    pub fn on_persisted(&mut self, question_id: &str, revision: u64, succeeded: bool) -> bool {
        let latest = self.revisions.get(question_id).copied().unwrap_or(0);
        if revision != latest {
            debug!(question_id, revision, latest, "Ignoring outcome of superseded save");
            return false;
        }

        self.pending.remove(question_id);
        let state = if succeeded {
            SaveState::Saved
        } else {
            warn!(question_id, revision, "Answer could not be saved");
            SaveState::Failed
        };
        self.states.insert(question_id.to_string(), state);
        true
    }

    /// Cancels every pending save and returns the values they carried.
    ///
    /// Used before submission so the latest typed values can be flushed
    /// in order.
    pub fn take_unsaved(&mut self) -> Vec<(String, AnswerValue)> {
        let mut unsaved: Vec<(String, AnswerValue)> = self
            .pending
            .drain()
            .map(|(question_id, pending)| {
                pending.handle.abort();
                (question_id, pending.value)
            })
            .collect();
        unsaved.sort_by(|a, b| a.0.cmp(&b.0));
        unsaved
    }

    /// Records the outcome of flushing an answer before submission.
    ///
    /// The flush supersedes every earlier save of the answer, so outcomes
    /// of saves still in flight no longer change its state.
    pub fn record_flush(&mut self, question_id: &str, succeeded: bool) {
        *self.revisions.entry(question_id.to_string()).or_insert(0) += 1;
        if let Some(pending) = self.pending.remove(question_id) {
            pending.handle.abort();
        }
        let state = if succeeded {
            SaveState::Saved
        } else {
            SaveState::Failed
        };
        debug!(question_id, ?state, "Recorded flush outcome");
        self.states.insert(question_id.to_string(), state);
    }

    /// Cancels every pending save and forgets all save states.
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
        self.revisions.clear();
        self.states.clear();
    }

    /// Save state of one answer.
    #[must_use]
    pub fn state(&self, question_id: &str) -> Option<SaveState> {
        self.states.get(question_id).copied()
    }

    /// Questions whose latest save failed, in identifier order.
    #[must_use]
    pub fn failed_questions(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| **state == SaveState::Failed)
            .map(|(question_id, _)| question_id.clone())
            .collect();
        failed.sort();
        failed
    }

    /// Number of debounced saves that have not completed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Aggregate indicator over every answer.
    #[must_use]
    pub fn indicator(&self) -> SaveIndicator {
        let states = self.states.values();
        let mut indicator = SaveIndicator::Idle;
        for state in states {
            match state {
                SaveState::Failed => return SaveIndicator::Failed,
                SaveState::Pending => indicator = SaveIndicator::Saving,
                SaveState::Saved if indicator == SaveIndicator::Idle => {
                    indicator = SaveIndicator::Saved;
                }
                SaveState::Saved => {}
            }
        }
        indicator
    }
}

impl Drop for AnswerPersister {
    fn drop(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }
}
