use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use exam_core::model::{AttemptId, ExamData, ExamSettings};
use services::{
    Clock, ExamGenerator, ExamSessionService, GenerationRequest, HistoryService, JsonExamSource,
    ResumeOutcome,
};
use storage::repository::Storage;

mod console;

use console::Console;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingExam,
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidAttemptId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingExam => write!(f, "take requires --exam <file>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidAttemptId { raw } => write!(f, "invalid attempt id: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: raw.clone() })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take    --exam <file.json> [--shuffle] [options]");
    eprintln!("  cargo run -p app -- resume  [--exam <file.json>] [options]");
    eprintln!("  cargo run -p app -- history [--limit <n>] [options]");
    eprintln!("  cargo run -p app -- review  <attempt-id> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>              default sqlite://exam.sqlite3");
    eprintln!("  --snapshots <dir>              default .exam-snapshots");
    eprintln!("  --seconds-per-question <n>     default 90");
    eprintln!("  -v, --verbose");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_SNAPSHOT_DIR, EXAM_SECONDS_PER_QUESTION, EXAM_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Resume,
    History,
    Review,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "resume" => Some(Self::Resume),
            "history" => Some(Self::History),
            "review" => Some(Self::Review),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    snapshot_dir: PathBuf,
    seconds_per_question: Option<u32>,
    shuffle: bool,
    exam: Option<PathBuf>,
    limit: u32,
    attempt: Option<AttemptId>,
    verbose: bool,
}

impl Args {
    fn from_env() -> Self {
        Self {
            db_url: std::env::var("EXAM_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url),
            snapshot_dir: std::env::var("EXAM_SNAPSHOT_DIR")
                .map_or_else(|_| PathBuf::from(".exam-snapshots"), PathBuf::from),
            seconds_per_question: std::env::var("EXAM_SECONDS_PER_QUESTION")
                .ok()
                .and_then(|value| value.parse().ok()),
            shuffle: false,
            exam: None,
            limit: 20,
            attempt: None,
            verbose: false,
        }
    }

    fn parse(
        command: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut parsed = Self::from_env();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--snapshots" => {
                    parsed.snapshot_dir = PathBuf::from(require_value(args, "--snapshots")?);
                }
                "--seconds-per-question" => {
                    let value = require_value(args, "--seconds-per-question")?;
                    parsed.seconds_per_question =
                        Some(parse_number(value, "--seconds-per-question")?);
                }
                "--exam" => parsed.exam = Some(PathBuf::from(require_value(args, "--exam")?)),
                "--shuffle" => parsed.shuffle = true,
                "--limit" => {
                    parsed.limit = parse_number(require_value(args, "--limit")?, "--limit")?;
                }
                "-v" | "--verbose" => parsed.verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                raw if command == Command::Review && parsed.attempt.is_none() => {
                    let id = raw.parse().map_err(|_| ArgsError::InvalidAttemptId {
                        raw: raw.to_string(),
                    })?;
                    parsed.attempt = Some(id);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if command == Command::Take && parsed.exam.is_none() {
            return Err(ArgsError::MissingExam);
        }
        if command == Command::Review && parsed.attempt.is_none() {
            return Err(ArgsError::MissingValue { flag: "review" });
        }
        Ok(parsed)
    }

    fn settings(&self) -> Result<ExamSettings, Box<dyn std::error::Error>> {
        let defaults = ExamSettings::default();
        Ok(ExamSettings::new(
            self.seconds_per_question
                .unwrap_or(defaults.seconds_per_question()),
            defaults.warning_thresholds().to_vec(),
            self.shuffle,
        )?)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("EXAM_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to initialize tracing subscriber: {error}"))?;
    Ok(())
}

async fn load_exam(path: PathBuf) -> Result<ExamData, Box<dyn std::error::Error>> {
    let source = JsonExamSource::new(path);
    let exam = source.generate(&GenerationRequest::new("")).await?;
    Ok(exam)
}

async fn take(
    console: &mut Console,
    service: &ExamSessionService,
    exam: ExamData,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(offer) = service.pending_session()? {
        let prompt = format!(
            "Resume saved {} session ({}/{} answered, {} left)?",
            offer.exam_code,
            offer.answered,
            offer.total,
            services::format_time_left(offer.time_left_seconds),
        );
        if console.confirm(&prompt).await? {
            let outcome = if offer.exam_code == exam.exam_code {
                service.resume_session(exam.clone()).await?
            } else {
                service.resume_saved_exam().await?
            };
            if finish_resume(console, service, outcome).await? {
                return Ok(());
            }
        } else {
            service.decline_resume()?;
        }
    }

    let session = service.start_session(exam)?;
    console.drive(service, session).await
}

/// Returns true once the outcome has been fully handled.
async fn finish_resume(
    console: &mut Console,
    service: &ExamSessionService,
    outcome: ResumeOutcome,
) -> Result<bool, Box<dyn std::error::Error>> {
    match outcome {
        ResumeOutcome::Resumed(session) => {
            console.drive(service, session).await?;
            Ok(true)
        }
        ResumeOutcome::Expired(attempt) => {
            println!("time ran out while the session was closed");
            console::print_attempt(&attempt);
            Ok(true)
        }
        ResumeOutcome::Stale(reason) => {
            println!("saved session discarded: {reason}");
            Ok(false)
        }
        ResumeOutcome::Absent => {
            println!("no saved session");
            Ok(false)
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Take,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().peekable();
    if iter.peek().is_some_and(|first| !first.starts_with("--")) {
        iter.next();
    }
    let parsed = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing(parsed.verbose)?;
    tracing::debug!(?parsed, "starting");

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url, &parsed.snapshot_dir).await?;
    let service = ExamSessionService::from_storage(Clock::system(), parsed.settings()?, &storage);
    let history = HistoryService::new(Arc::clone(&storage.attempts));
    let mut console = Console::new();

    match cmd {
        Command::Take => {
            let Some(path) = parsed.exam else {
                return Err(ArgsError::MissingExam.into());
            };
            let exam = load_exam(path).await?;
            take(&mut console, &service, exam).await
        }
        Command::Resume => {
            let outcome = match parsed.exam {
                Some(path) => service.resume_session(load_exam(path).await?).await?,
                None => service.resume_saved_exam().await?,
            };
            finish_resume(&mut console, &service, outcome).await?;
            Ok(())
        }
        Command::History => {
            console::print_history(&history.list(parsed.limit).await?);
            Ok(())
        }
        Command::Review => {
            let Some(id) = parsed.attempt else {
                return Err(ArgsError::MissingValue { flag: "review" }.into());
            };
            console::print_review(&history.review(id).await?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
