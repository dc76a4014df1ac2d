//! Commands typed at the exam prompt.

use proctor_session::{AnswerValue, Question, QuestionKind};
use thiserror::Error;

/// Help text listing every command.
pub const HELP: &str = "\
Commands:
  next | n              Go to the next question
  prev | p              Go to the previous question
  goto N | g N          Go to question N
  show                  Show the current question
  answer TEXT | a TEXT  Answer the current question
                        (choice questions take option numbers, e.g. `a 2` or `a 1,3`)
  status                Show progress, time and save state
  submit                Submit the attempt for grading
  submit!               Submit even if questions are unanswered
  retry                 Retry a failed submission
  reset                 Discard the local session
  start                 Start a new attempt after a reset
  help                  Show this help
  quit                  Leave without submitting";

/// A parsed prompt command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move to the next question.
    Next,
    /// Move to the previous question.
    Previous,
    /// Jump to a zero-based question index.
    GoTo(usize),
    /// Print the current question.
    Show,
    /// Answer the current question with the raw input.
    Answer(String),
    /// Print the session status.
    Status,
    /// Submit the attempt.
    Submit {
        /// Skip the unanswered-questions confirmation.
        force: bool,
    },
    /// Retry a failed submission.
    Retry,
    /// Reset the session.
    Reset,
    /// Start a new attempt on the loaded exam.
    Start,
    /// Print the help text.
    Help,
    /// Leave the program.
    Quit,
}

/// Errors from parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The command word is not known.
    #[error("unknown command '{0}' (type `help` for a list)")]
    Unknown(String),

    /// The command needs an argument.
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    /// The question number is not a positive integer.
    #[error("'{0}' is not a question number; numbers start at 1")]
    InvalidQuestionNumber(String),
}

/// Errors from turning raw input into an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    /// No option was given for a choice question.
    #[error("choose at least one option")]
    NoOption,

    /// The input matches none of the question's options.
    #[error("'{input}' is not an option; choose 1 to {count} or type the option text")]
    UnknownOption {
        /// The unmatched input.
        input: String,
        /// Number of options on the question.
        count: usize,
    },

    /// A single-choice question got more than one option.
    #[error("this question takes exactly one option")]
    TooManyOptions,
}

impl Command {
    /// Parses one line of input.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "next" | "n" => Ok(Self::Next),
            "prev" | "previous" | "p" => Ok(Self::Previous),
            "goto" | "g" => parse_question_number(rest).map(Self::GoTo),
            "show" => Ok(Self::Show),
            "answer" | "a" => {
                if rest.is_empty() {
                    Err(ParseError::MissingArgument("answer"))
                } else {
                    Ok(Self::Answer(rest.to_string()))
                }
            }
            "status" => Ok(Self::Status),
            "submit" => Ok(Self::Submit {
                force: rest == "--force",
            }),
            "submit!" => Ok(Self::Submit { force: true }),
            "retry" => Ok(Self::Retry),
            "reset" => Ok(Self::Reset),
            "start" => Ok(Self::Start),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Parses a one-based question number into a zero-based index.
fn parse_question_number(input: &str) -> Result<usize, ParseError> {
    if input.is_empty() {
        return Err(ParseError::MissingArgument("goto"));
    }
    match input.parse::<usize>() {
        Ok(number) if number > 0 => Ok(number - 1),
        _ => Err(ParseError::InvalidQuestionNumber(input.to_string())),
    }
}

/// Turns raw input into an answer for `question`.
///
/// Choice questions accept option numbers or option text, comma separated
/// for multiple choice. Typed questions take the input as is.
pub fn resolve_answer(question: &Question, input: &str) -> Result<AnswerValue, AnswerError> {
    match question.kind {
        QuestionKind::SingleChoice | QuestionKind::TrueFalse => {
            let mut picked = pick_options(question, input)?;
            if picked.len() > 1 {
                return Err(AnswerError::TooManyOptions);
            }
            picked.pop().map(AnswerValue::Text).ok_or(AnswerError::NoOption)
        }
        QuestionKind::MultipleChoice => {
            let picked = pick_options(question, input)?;
            Ok(AnswerValue::choices(picked))
        }
        QuestionKind::FillBlank | QuestionKind::ShortAnswer | QuestionKind::Essay => {
            Ok(AnswerValue::text(input))
        }
    }
}

fn pick_options(question: &Question, input: &str) -> Result<Vec<String>, AnswerError> {
    let options = options_of(question);
    let mut picked: Vec<String> = Vec::new();

    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let option = match token.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => Some(options[n - 1].clone()),
            _ => options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(token))
                .cloned(),
        };
        let option = option.ok_or_else(|| AnswerError::UnknownOption {
            input: token.to_string(),
            count: options.len(),
        })?;
        if !picked.contains(&option) {
            picked.push(option);
        }
    }

    if picked.is_empty() {
        return Err(AnswerError::NoOption);
    }
    Ok(picked)
}

/// Options of a question; true/false questions without options get both.
fn options_of(question: &Question) -> Vec<String> {
    if question.options.is_empty() && question.kind == QuestionKind::TrueFalse {
        vec!["true".to_string(), "false".to_string()]
    } else {
        question.options.clone()
    }
}
