//! Markdown report generation.
//!
//! This module provides the [`MarkdownGenerator`] struct for converting a
//! [`Report`] into a Markdown document with a summary table, one row per
//! question and the grader's feedback.
//!
//! # Example
//!
//! ```rust
//! use proctor_report::{MarkdownGenerator, Report};
//! use proctor_session::{Attempt, Exam};
//!
//! let report = Report::from_attempt(&Exam::new("e1", "Reading"), &Attempt::new("a1", "e1"));
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Exam Report: Reading"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{QuestionRow, Report};

/// Maximum length of an answer or prompt in the questions table.
const MAX_CELL_LENGTH: usize = 80;

/// Generates Markdown reports.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_warning(&mut output);
        self.write_questions(&mut output);
        self.write_feedback(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Exam Report: {}\n",
            escape_markdown(&self.report.exam_title)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", summary.status.description());
        if let Some(level) = &self.report.cefr_level {
            let _ = writeln!(output, "| Level | {} |", escape_markdown(level));
        }
        if let Some(score) = summary.score {
            let max = summary
                .max_score
                .map_or_else(String::new, |max| format!(" / {}", format_number(max)));
            let _ = writeln!(output, "| Score | {}{max} |", format_number(score));
        }
        if let Some(percentage) = summary.percentage {
            let _ = writeln!(output, "| Percentage | {percentage:.1}% |");
        }
        if let Some(passing) = summary.passing_score {
            let _ = writeln!(output, "| Passing Score | {passing:.1}% |");
        }
        let _ = writeln!(
            output,
            "| Answered | {} / {} |",
            summary.answered, summary.total_questions
        );
        if let Some(duration) = summary.duration_seconds {
            let _ = writeln!(output, "| Duration | {} |", format_duration(duration));
        }
        let _ = writeln!(
            output,
            "| Attempt | `{}` |",
            self.report.attempt_id.replace('`', "'")
        );
        let _ = writeln!(output);
    }

    fn write_warning(&self, output: &mut String) {
        if let Some(warning) = &self.report.warning {
            let _ = writeln!(output, "> **Warning**: {}\n", escape_markdown(warning));
        }
    }

    fn write_questions(&self, output: &mut String) {
        let _ = writeln!(output, "## Questions\n");

        if self.report.questions.is_empty() {
            let _ = writeln!(output, "*This exam has no questions.*\n");
            return;
        }

        let _ = writeln!(output, "| # | Question | Answer | Result | Points |");
        let _ = writeln!(output, "|---|----------|--------|--------|--------|");
        for row in &self.report.questions {
            Self::write_question_row(output, row);
        }
        let _ = writeln!(output);

        let with_feedback: Vec<_> = self
            .report
            .questions
            .iter()
            .filter(|row| row.feedback.is_some())
            .collect();
        if with_feedback.is_empty() {
            return;
        }

        let _ = writeln!(output, "### Question Feedback\n");
        for row in with_feedback {
            if let Some(feedback) = &row.feedback {
                let _ = writeln!(output, "- **Q{}**: {}", row.number, escape_markdown(feedback));
            }
        }
        let _ = writeln!(output);
    }

    fn write_question_row(output: &mut String, row: &QuestionRow) {
        let prompt = escape_markdown(&truncate(&row.prompt, MAX_CELL_LENGTH));
        let answer = row.answer.as_ref().map_or_else(
            || "*unanswered*".to_string(),
            |value| escape_markdown(&truncate(&value.to_string(), MAX_CELL_LENGTH)),
        );
        let result = match row.is_correct {
            Some(true) => "Correct",
            Some(false) => "Incorrect",
            None => "-",
        };
        let points = row
            .points_awarded
            .map_or_else(|| "-".to_string(), format_number);

        let _ = writeln!(
            output,
            "| {} | {prompt} | {answer} | {result} | {points} |",
            row.number
        );
    }

    fn write_feedback(&self, output: &mut String) {
        if let Some(feedback) = &self.report.feedback {
            let _ = writeln!(output, "## Feedback\n");
            let _ = writeln!(output, "{}\n", escape_markdown(feedback));
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by Proctor at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a duration in seconds to a human-readable string.
///
/// Examples:
/// - 65 seconds -> "1m 5s"
/// - 3661 seconds -> "1h 1m 1s"
/// - 45 seconds -> "45s"
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Formats points without a trailing `.0` for whole numbers.
fn format_number(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// Escapes special Markdown characters so user content renders literally.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            // Table cells cannot contain raw newlines.
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

/// Truncates to `max_length` characters of the first line, adding an ellipsis.
fn truncate(text: &str, max_length: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_length {
        first_line.to_string()
    } else {
        let kept: String = first_line.chars().take(max_length).collect();
        format!("{kept}...")
    }
}
