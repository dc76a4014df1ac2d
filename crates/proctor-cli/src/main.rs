//! Proctor CLI
//!
//! Runs one timed exam attempt in the terminal against the exam service.

mod command;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures::future::OptionFuture;
use proctor_backend::HttpBackend;
use proctor_report::{json::JsonGenerator, MarkdownGenerator, Report};
use proctor_session::events::StartedPayload;
use proctor_session::{
    format_clock, Attempt, Config, Exam, ExamSession, FinishTicket, FinishTrigger, SaveIndicator,
    SessionEvent, SessionSnapshot, SessionStatus, SignalReceiver, SubmissionOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

use crate::command::{resolve_answer, Command, ParseError, HELP};

/// Markdown report file written after grading.
const MARKDOWN_REPORT: &str = "proctor-report.md";

/// JSON report file written after grading.
const JSON_REPORT: &str = "proctor-report.json";

/// Proctor - Timed Exam Client
///
/// Takes an exam attempt against the exam service: answer questions, watch
/// the countdown and submit for grading. Answers are saved as you go and the
/// attempt is submitted automatically when time runs out.
#[derive(Parser, Debug)]
#[command(name = "proctor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Identifier of the exam to take (overrides examId in the config)
    #[arg(short, long, value_name = "ID")]
    exam: Option<String>,

    /// Path to configuration file (default: proctor.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Base URL of the exam service
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// User taking the exam
    #[arg(short, long, value_name = "USER")]
    user: Option<String>,

    /// Output directory for reports
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Continue the attempt already in progress instead of starting a new one
    #[arg(long)]
    resume: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so they do not interleave with the prompt.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Proctor starting");
    tracing::debug!(config = ?args.config, "Config file");
    tracing::debug!(exam = ?args.exam, resume = args.resume, "Exam selection");

    match run_exam(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs one exam attempt.
///
/// 1. Load and validate config
/// 2. Load the exam
/// 3. Start or resume the attempt
/// 4. Run the interactive loop until graded or the user quits
async fn run_exam(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    print_config(&config);

    let exam_id = config.exam_id.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "No exam selected\n\nSuggestion: Pass --exam ID or set examId in your proctor.json"
        )
    })?;

    let backend = HttpBackend::from_config(&config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let (session, signals) = ExamSession::new(Arc::new(backend), config.session_settings());
    let mut session = match &config.user_id {
        Some(user_id) => session.with_user(user_id),
        None => session,
    };
    let events = session.subscribe();

    let exam = session
        .load_exam(&exam_id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    print_exam_info(&exam);

    if args.resume {
        session.resume_exam(exam.clone()).await
    } else {
        session.start_exam(exam.clone()).await
    }
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!();
    println!("Type `help` for commands.");

    let mut runner = ExamRunner::new(session, exam, config);
    runner.run(signals, events).await
}

/// Whether the interactive loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Owns the session and the in-flight submission for the interactive loop.
struct ExamRunner {
    session: ExamSession,
    exam: Exam,
    config: Config,
    submission: Option<JoinHandle<SubmissionOutcome>>,
}

impl ExamRunner {
    const fn new(session: ExamSession, exam: Exam, config: Config) -> Self {
        Self {
            session,
            exam,
            config,
            submission: None,
        }
    }

    /// Multiplexes user input, timer and save signals, session events and
    /// the submission task until the attempt is graded or the user leaves.
    async fn run(
        &mut self,
        mut signals: SignalReceiver,
        mut events: broadcast::Receiver<SessionEvent>,
    ) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut input_open = true;

        loop {
            tokio::select! {
                Some(signal) = signals.recv() => {
                    if let Some(ticket) = self.session.handle_signal(signal) {
                        self.spawn_submission(ticket);
                    }
                }
                Some(joined) = OptionFuture::from(self.submission.as_mut()) => {
                    self.submission = None;
                    let outcome = joined
                        .map_err(|e| anyhow::anyhow!("Submission task failed: {e}"))?;
                    if self.on_submission(outcome)? {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.print_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
                line = lines.next_line(), if input_open => match line? {
                    Some(line) => {
                        if self.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("Input closed");
                        input_open = false;
                    }
                },
                Ok(()) = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }

            if !input_open && self.submission.is_none() {
                break;
            }
        }

        self.leave(&mut signals).await
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(ParseError::Empty) => return Flow::Continue,
            Err(e) => {
                println!("{e}");
                return Flow::Continue;
            }
        };
        tracing::debug!(?command, "Command");

        match command {
            Command::Next => {
                if self.session.next_question() {
                    self.show_current();
                } else {
                    println!("Already at the last question.");
                }
            }
            Command::Previous => {
                if self.session.previous_question() {
                    self.show_current();
                } else {
                    println!("Already at the first question.");
                }
            }
            Command::GoTo(index) => {
                if self.session.go_to_question(index) {
                    self.show_current();
                } else {
                    println!(
                        "There is no question {}; the exam has {} questions.",
                        index + 1,
                        self.exam.questions.len()
                    );
                }
            }
            Command::Show => self.show_current(),
            Command::Answer(input) => self.answer(&input),
            Command::Status => print_status(&self.session.snapshot()),
            Command::Submit { force } => self.submit(force),
            Command::Retry => match self.session.retry_finish() {
                Some(ticket) => self.spawn_submission(ticket),
                None => println!("Nothing to retry."),
            },
            Command::Reset => {
                if let Some(handle) = self.submission.take() {
                    handle.abort();
                }
                self.session.reset_attempt();
                println!("Session reset. Type `start` for a new attempt or `quit` to leave.");
            }
            Command::Start => {
                if let Err(e) = self.session.start_exam(self.exam.clone()).await {
                    println!("Could not start: {e}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn answer(&mut self, input: &str) {
        let Some(question) = self.session.current_question() else {
            println!("No attempt in progress.");
            return;
        };
        let question_id = question.id.clone();

        let value = match resolve_answer(question, input) {
            Ok(value) => value,
            Err(e) => {
                println!("{e}");
                return;
            }
        };

        match self.session.submit_answer(&question_id, value) {
            Ok(()) => println!(
                "Answer recorded ({} of {} answered).",
                self.session.answered_count(),
                self.exam.questions.len()
            ),
            Err(e) => println!("{e}"),
        }
    }

    fn submit(&mut self, force: bool) {
        let status = self.session.status();
        if !status.is_in_progress() {
            println!("No attempt in progress (status: {status}).");
            return;
        }

        if !force && self.config.confirm_incomplete_submit && !self.session.is_complete() {
            let snapshot = self.session.snapshot();
            let unanswered: Vec<String> = snapshot
                .answered
                .iter()
                .enumerate()
                .filter(|(_, answered)| !**answered)
                .map(|(index, _)| (index + 1).to_string())
                .collect();
            println!(
                "{} question(s) unanswered: {}. Type `submit!` to submit anyway.",
                unanswered.len(),
                unanswered.join(", ")
            );
            return;
        }

        if let Some(ticket) = self.session.begin_finish(FinishTrigger::User) {
            self.spawn_submission(ticket);
        }
    }

    fn spawn_submission(&mut self, ticket: FinishTicket) {
        tracing::debug!(
            attempt_id = ticket.attempt_id(),
            trigger = %ticket.trigger(),
            "Spawning submission"
        );
        if let Some(previous) = self.submission.take() {
            previous.abort();
        }
        self.submission = Some(tokio::spawn(self.session.submission(ticket)));
    }

    /// Applies a submission outcome. Returns `true` once the attempt is graded.
    fn on_submission(&mut self, outcome: SubmissionOutcome) -> anyhow::Result<bool> {
        if let Err(e) = self.session.complete_finish(outcome) {
            println!("Submission failed: {e}");
            println!("Type `retry` to try again.");
            return Ok(false);
        }

        let Some(result) = self.session.result().cloned() else {
            return Ok(false);
        };

        println!();
        print_result(&result);
        if let Some(warning) = self.session.last_warning() {
            println!("Warning: {warning}");
        }
        write_reports(&self.session, Path::new(&self.config.output_dir))?;
        Ok(true)
    }

    /// Waits for outstanding saves, then explains what happens to the attempt.
    async fn leave(&mut self, signals: &mut SignalReceiver) -> anyhow::Result<()> {
        if let Some(handle) = self.submission.take() {
            println!("Waiting for the submission to finish...");
            let outcome = handle
                .await
                .map_err(|e| anyhow::anyhow!("Submission task failed: {e}"))?;
            self.on_submission(outcome)?;
        }

        self.settle_saves(signals).await;

        match self.session.status() {
            SessionStatus::InProgress => {
                println!();
                println!("Attempt left in progress. Continue later with --resume.");
                if let Some(remaining) = self.session.remaining_display() {
                    println!("Time keeps running on the server ({remaining} left now).");
                }
            }
            SessionStatus::Finished if self.session.can_retry() => {
                let error = self.session.last_error().unwrap_or("unknown error");
                anyhow::bail!(
                    "The attempt was not graded: {error}\n\nSuggestion: Run again with --resume to retry"
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Drains signals until no typed answer is waiting to be saved.
    async fn settle_saves(&mut self, signals: &mut SignalReceiver) {
        let limit = self.config.session_settings().debounce + self.config.request_timeout();

        while self.session.save_indicator() == SaveIndicator::Saving {
            match timeout(limit, signals.recv()).await {
                Ok(Some(signal)) => {
                    if let Some(ticket) = self.session.handle_signal(signal) {
                        let outcome = self.session.submission(ticket).await;
                        if let Err(e) = self.on_submission(outcome) {
                            tracing::warn!(error = %e, "Failed to write reports");
                        }
                    }
                }
                Ok(None) | Err(_) => {
                    tracing::warn!("Gave up waiting for answers to save");
                    break;
                }
            }
        }
    }

    fn print_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Started(payload) => {
                print_started(payload);
                self.show_current();
            }
            SessionEvent::LowTime(payload) => {
                println!();
                println!("*** {} remaining ***", payload.display);
            }
            SessionEvent::SaveFailed(payload) => {
                println!(
                    "Warning: answer to {} was not saved: {}",
                    payload.question_id, payload.message
                );
            }
            SessionEvent::Finishing(payload) => match payload.trigger {
                FinishTrigger::Timeout => println!("\nTime is up. Submitting your answers..."),
                FinishTrigger::User => println!("Submitting your answers..."),
            },
            SessionEvent::AnswerRecorded(_)
            | SessionEvent::Navigated(_)
            | SessionEvent::Tick(_)
            | SessionEvent::Finished(_)
            | SessionEvent::Reset => {}
        }
    }

    fn show_current(&self) {
        let Some(question) = self.session.current_question() else {
            return;
        };
        let index = self.session.current_index();

        println!();
        print!("Question {} of {}", index + 1, self.exam.questions.len());
        if let Some(remaining) = self.session.remaining_display() {
            print!("  [{remaining}]");
        }
        println!();
        println!("  {}", question.prompt);
        for (number, option) in question.options.iter().enumerate() {
            println!("    {}. {option}", number + 1);
        }
        if self.session.is_answered(&question.id) {
            println!("  Your answer: {}", self.session.answer(&question.id));
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Applies command line overrides on top of the loaded config.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(exam) = &args.exam {
        config.exam_id = Some(exam.clone());
    }
    if let Some(url) = &args.backend_url {
        config.backend_url.clone_from(url);
    }
    if let Some(user) = &args.user {
        config.user_id = Some(user.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir.clone_from(dir);
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Backend: {}", config.backend_url);
    println!(
        "  User: {}",
        config.user_id.as_deref().unwrap_or("(not signed in)")
    );
    println!("  Output directory: {}", config.output_dir);
    println!("  Request timeout: {}s", config.request_timeout_secs);
}

fn print_exam_info(exam: &Exam) {
    println!();
    println!("Exam loaded: {}", exam.title);
    if let Some(description) = &exam.description {
        println!("  {description}");
    }
    println!("  Questions: {}", exam.questions.len());
    match exam.time_limit_secs() {
        Some(secs) => println!("  Time limit: {}", format_clock(secs)),
        None => println!("  Time limit: none"),
    }
}

fn print_started(payload: &StartedPayload) {
    let verb = if payload.resumed { "resumed" } else { "started" };
    println!();
    println!("Attempt {} {verb}.", payload.attempt_id);
    match payload.remaining_secs {
        Some(secs) => println!("  Time remaining: {}", format_clock(secs)),
        None => println!("  No time limit"),
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    println!("Status: {}", snapshot.status);
    if snapshot.total_questions > 0 {
        println!(
            "  Question: {} of {}",
            snapshot.current_index + 1,
            snapshot.total_questions
        );
    }
    println!(
        "  Answered: {} of {} ({}%)",
        snapshot.answered_count, snapshot.total_questions, snapshot.answered_percentage
    );
    if let Some(remaining) = &snapshot.remaining_display {
        println!("  Time remaining: {remaining}");
    }
    let saves = match snapshot.save_indicator {
        SaveIndicator::Idle => "nothing to save",
        SaveIndicator::Saving => "saving...",
        SaveIndicator::Saved => "all answers saved",
        SaveIndicator::Failed => "some answers failed to save",
    };
    println!("  Saves: {saves}");
    if let Some(error) = &snapshot.last_error {
        println!("  Last error: {error}");
    }
    if let Some(warning) = &snapshot.last_warning {
        println!("  Warning: {warning}");
    }
}

fn print_result(attempt: &Attempt) {
    println!("=== Exam Result ===");
    if let (Some(score), Some(max)) = (attempt.score, attempt.max_score) {
        println!("Score: {score} / {max}");
    }
    if let Some(percentage) = attempt.percentage {
        println!("Percentage: {percentage:.1}%");
    }
    match attempt.passed {
        Some(true) => println!("Result: passed"),
        Some(false) => println!("Result: not passed"),
        None => {}
    }
    if let Some(feedback) = &attempt.feedback {
        println!();
        println!("{feedback}");
    }
}

/// Writes the Markdown and JSON reports of the graded attempt.
fn write_reports(session: &ExamSession, output_dir: &Path) -> anyhow::Result<()> {
    println!();
    println!("Generating reports...");

    let report = Report::from_session(session)?;

    std::fs::create_dir_all(output_dir)?;

    let md_path: PathBuf = output_dir.join(MARKDOWN_REPORT);
    std::fs::write(&md_path, MarkdownGenerator::new(&report).generate())?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join(JSON_REPORT);
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    Ok(())
}
