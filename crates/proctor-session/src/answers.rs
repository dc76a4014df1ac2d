//! In-memory answers of the current attempt.

use std::collections::HashMap;

use crate::model::{AnswerValue, AttemptAnswer, EMPTY_ANSWER};

/// Current answer for every question touched so far.
///
/// The store is a plain mapping with overwrite semantics and no notion of
/// correctness. It is independent of which question is displayed.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    answers: HashMap<String, AnswerValue>,
}

impl AnswerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `question_id`, replacing any previous value.
    pub fn set_answer(&mut self, question_id: impl Into<String>, value: AnswerValue) {
        self.answers.insert(question_id.into(), value);
    }

    /// Returns the stored value, or the empty answer if none was stored.
    #[must_use]
    pub fn get_answer(&self, question_id: &str) -> &AnswerValue {
        self.answers.get(question_id).unwrap_or(&EMPTY_ANSWER)
    }

    /// Returns `true` iff a non-empty value is stored for `question_id`.
    #[must_use]
    pub fn is_answered(&self, question_id: &str) -> bool {
        self.answers
            .get(question_id)
            .is_some_and(|value| !value.is_empty())
    }

    /// Number of questions with a non-empty stored value.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|v| !v.is_empty()).count()
    }

    /// Drops every stored answer.
    pub fn clear(&mut self) {
        self.answers.clear();
    }

    /// Seeds the store from answers recorded on the server.
    pub fn restore(&mut self, answers: &[AttemptAnswer]) {
        self.answers.clear();
        for record in answers {
            self.answers
                .insert(record.question_id.clone(), record.answer.clone());
        }
    }
}
