use std::error::Error;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use exam_core::model::{Attempt, OptionId};
use exam_core::{QuestionFilter, QuestionOutcome, StatusFilter};
use services::{
    AlertSink, AttemptListItem, AttemptReview, ExamSession, ExamSessionService, FilteredEntry,
    Intent, RunOutcome, SessionEvent, SessionRunner, SessionView, format_time_left,
};

/// Rings the terminal bell on countdown warnings.
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn time_warning(&self, remaining_seconds: u32) {
        eprintln!("\x07{} left", format_time_left(remaining_seconds));
    }
}

#[derive(Debug)]
enum Command {
    Intent(Intent),
    List(QuestionFilter),
    Show,
    Help,
    Quit,
}

fn parse_index(raw: Option<&str>, what: &str) -> Result<usize, String> {
    let raw = raw.ok_or_else(|| format!("{what} needs a question number"))?;
    let number: usize = raw
        .parse()
        .map_err(|_| format!("not a question number: {raw}"))?;
    number
        .checked_sub(1)
        .ok_or_else(|| "question numbers start at 1".to_string())
}

fn parse_filter<'a>(words: impl Iterator<Item = &'a str>) -> QuestionFilter {
    let mut filter = QuestionFilter::new();
    let mut text = Vec::new();
    for word in words {
        match word {
            "all" => filter = filter.with_status(StatusFilter::All),
            "answered" => filter = filter.with_status(StatusFilter::Answered),
            "unanswered" => filter = filter.with_status(StatusFilter::Unanswered),
            "flagged" => filter = filter.with_status(StatusFilter::Flagged),
            other => match other.strip_prefix("domain=") {
                Some(domain) => filter = filter.with_domain(domain),
                None => text.push(other),
            },
        }
    }
    if !text.is_empty() {
        filter = filter.with_text(text.join(" "));
    }
    filter
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Command::Show);
    };
    let intent = match head {
        "a" | "answer" => {
            let options: Vec<OptionId> = words.map(OptionId::new).collect();
            Intent::AnswerCurrent(options)
        }
        "n" | "next" => Intent::Next,
        "p" | "prev" => Intent::Previous,
        "j" | "jump" => Intent::Jump(parse_index(words.next(), "jump")?),
        "f" | "flag" => Intent::ToggleCurrentFlag,
        "m" | "move" => {
            let from = parse_index(words.next(), "move")?;
            let to = parse_index(words.next(), "move")?;
            Intent::Reorder { from, to }
        }
        "pause" | "read" => Intent::Suspend,
        "go" | "continue" => Intent::ResumeCountdown,
        "submit" => Intent::Finish,
        "abandon" => Intent::Abandon,
        "l" | "list" => return Ok(Command::List(parse_filter(words))),
        "s" | "show" => return Ok(Command::Show),
        "h" | "help" | "?" => return Ok(Command::Help),
        "q" | "quit" => return Ok(Command::Quit),
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Command::Intent(intent))
}

fn print_help() {
    println!("Commands:");
    println!("  a <option ids...>    answer the current question (no ids clears it)");
    println!("  n | p                next / previous question");
    println!("  j <n>                jump to question n");
    println!("  f                    toggle flag on the current question");
    println!("  m <from> <to>        move a question in the order");
    println!("  l [status] [domain=X] [text]   list questions");
    println!("  pause | go           enter / leave reading mode");
    println!("  s                    show the current question");
    println!("  submit               finish and score");
    println!("  abandon              drop the session without scoring");
    println!("  q                    quit, keeping the session for `resume`");
}

fn render(view: &SessionView) {
    println!();
    println!(
        "[{}/{}] {} left | answered {}/{}",
        view.current_index + 1,
        view.total,
        format_time_left(view.time_left_seconds),
        view.answered,
        view.total,
    );
    let Some(current) = &view.current else {
        return;
    };
    let flag = if current.flagged { " [flagged]" } else { "" };
    println!("{} ({}){flag}", current.domain, current.id);
    if let Some(scenario) = &current.scenario {
        println!("{scenario}");
    }
    println!("{}", current.text);
    if current.allows_multiple {
        println!("(select all that apply)");
    }
    for (id, text) in &current.options {
        let mark = if current.selected.contains(id) { "x" } else { " " };
        println!("  [{mark}] {id}: {text}");
    }
}

fn print_entries(entries: &[FilteredEntry]) {
    if entries.is_empty() {
        println!("no matching questions");
        return;
    }
    for entry in entries {
        let answered = if entry.answered { "answered" } else { "open" };
        let flag = if entry.flagged { " *" } else { "" };
        println!(
            "{:>3}. [{answered}]{flag} {} ({})",
            entry.position + 1,
            entry.text,
            entry.domain
        );
    }
}

pub fn print_attempt(attempt: &Attempt) {
    println!(
        "{}: {:.1}% ({}/{} correct, {})",
        attempt.exam_code(),
        attempt.report().rounded(),
        attempt.correct_answers(),
        attempt.total_questions(),
        attempt.reason(),
    );
    println!("attempt id: {}", attempt.id());
}

pub fn print_history(items: &[AttemptListItem]) {
    if items.is_empty() {
        println!("no attempts yet");
        return;
    }
    for item in items {
        println!(
            "{}  {}  {:<12} {:>5.1}%  {}/{}  {}",
            item.id,
            item.finished_at.format("%Y-%m-%d %H:%M"),
            item.exam_code.as_str(),
            item.score,
            item.correct,
            item.total,
            item.reason,
        );
    }
}

pub fn print_review(review: &AttemptReview) {
    let summary = &review.summary;
    println!(
        "{} ({}) finished {} by {}: {:.1}%",
        summary.exam_name,
        summary.exam_code,
        summary.finished_at.format("%Y-%m-%d %H:%M"),
        summary.reason,
        summary.score
    );
    for domain in &review.domains {
        println!(
            "  {:<24} {}/{} ({:.0}%)",
            domain.domain,
            domain.correct,
            domain.total,
            domain.percentage()
        );
    }
    println!();
    for item in &review.items {
        let mark = match item.outcome {
            QuestionOutcome::Correct => "ok",
            QuestionOutcome::Incorrect => "wrong",
            QuestionOutcome::Unanswered => "skipped",
        };
        println!("{:>3}. [{mark}] {}", item.position + 1, item.question.text);
        if item.outcome != QuestionOutcome::Correct {
            let correct: Vec<&str> = item
                .question
                .correct_answers
                .iter()
                .map(OptionId::as_str)
                .collect();
            let selected: Vec<&str> = item.selected.iter().map(OptionId::as_str).collect();
            println!(
                "     chose [{}], answer [{}]",
                selected.join(", "),
                correct.join(", ")
            );
            if !item.question.explanation.is_empty() {
                println!("     {}", item.question.explanation);
            }
        }
    }
}

/// Line-oriented terminal front end.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Ask a yes/no question; anything but `y`/`yes` is a no.
    pub async fn confirm(&mut self, prompt: &str) -> std::io::Result<bool> {
        println!("{prompt} [y/N]");
        let answer = self.lines.next_line().await?.unwrap_or_default();
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    /// Run `session` until it is finished, abandoned, or detached.
    pub async fn drive(
        &mut self,
        service: &ExamSessionService,
        session: ExamSession,
    ) -> Result<(), Box<dyn Error>> {
        render(&session.view());
        println!("type `help` for commands");
        let (handle, mut events) = SessionRunner::new(service.clone(), session)
            .with_alerts(Arc::new(TerminalBell))
            .spawn();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::Updated(view)) => render(&view),
                    Some(SessionEvent::Rejected(reason)) => eprintln!("ignored: {reason}"),
                    Some(SessionEvent::Tick { .. } | SessionEvent::TimeWarning { .. }) => {}
                    Some(SessionEvent::ArchiveFailed { error, .. }) => {
                        eprintln!("could not save the result yet: {error}");
                        break;
                    }
                    Some(SessionEvent::AbandonFailed { error }) => {
                        eprintln!("could not abandon, the session is still running: {error}");
                    }
                    Some(SessionEvent::Finished(_) | SessionEvent::Abandoned) | None => break,
                },
                line = self.lines.next_line() => {
                    let Some(line) = line? else {
                        handle.send(Intent::Detach);
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Command::Intent(intent)) => {
                            handle.send(intent);
                        }
                        Ok(Command::List(filter)) => {
                            if let Some(entries) = handle.filter(filter).await {
                                print_entries(&entries);
                            }
                        }
                        Ok(Command::Show) => {
                            if let Some(view) = handle.view().await {
                                render(&view);
                            }
                        }
                        Ok(Command::Help) => print_help(),
                        Ok(Command::Quit) => {
                            handle.send(Intent::Detach);
                            break;
                        }
                        Err(message) => eprintln!("{message}"),
                    }
                }
            }
        }

        match handle.join().await? {
            RunOutcome::Finished(attempt) => print_attempt(&attempt),
            RunOutcome::Unarchived(mut session) => {
                let attempt = service.finalize_attempt(&mut session).await?;
                print_attempt(&attempt);
            }
            RunOutcome::Abandoned => println!("session abandoned"),
            RunOutcome::Detached(_) => println!("session saved; run `resume` to continue"),
        }
        Ok(())
    }
}
