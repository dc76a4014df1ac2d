//! Position of the displayed question.

/// Zero-based index of the current question, bounded by the question count.
///
/// Moves past either end are clamped and out-of-range jumps are ignored, so
/// the index stays in `[0, total - 1]` whenever `total > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationCursor {
    index: usize,
    total: usize,
}

impl NavigationCursor {
    /// Creates a cursor at the first of `total` questions.
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self { index: 0, total }
    }

    /// The current index.
    #[must_use]
    pub const fn current(&self) -> usize {
        self.index
    }

    /// Number of questions the cursor ranges over.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Moves to the next question. Returns `false` at the last question.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.total {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Moves to the previous question. Returns `false` at the first question.
    pub fn retreat(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// Jumps to `index`. Out-of-range indices leave the cursor unchanged
    /// and return `false`.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.total {
            self.index = index;
            true
        } else {
            false
        }
    }

    /// Resets to the first of `total` questions.
    pub fn reset(&mut self, total: usize) {
        *self = Self::new(total);
    }
}
