//! Log output for the `repokit` binary.
//!
//! Library crates attach the repository to their events as a `repo` field;
//! the terminal formatter turns it into a `[repo]` prefix.

use std::{fmt, io};

use nu_ansi_term::Color::{Blue, Cyan, Magenta, Red, Yellow};
use tracing::{
    field::{Field, Visit},
    Event, Level, Metadata, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    registry::LookupSpan,
    EnvFilter,
};

use crate::{cli::Args, utils::Colored};

/// Extra filter directives appended to the command line level,
/// e.g. `REPOKIT_LOG=repokit_dl=trace`.
pub const LOG_ENV: &str = "REPOKIT_LOG";

/// Fields of an event the terminal formatter shows.
#[derive(Default, Debug, PartialEq, Eq)]
struct EventFields {
    message: Option<String>,
    repo: Option<String>,
}

impl EventFields {
    fn set(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            "repo" => self.repo = Some(value),
            _ => {}
        }
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field, format!("{value:?}"));
    }
}

fn level_tag(level: Level) -> Option<Colored<&'static str>> {
    match level {
        Level::TRACE => Some(Colored(Magenta, "[TRACE]")),
        Level::DEBUG => Some(Colored(Blue, "[DEBUG]")),
        Level::INFO => None,
        Level::WARN => Some(Colored(Yellow, "[WARN]")),
        Level::ERROR => Some(Colored(Red, "[ERROR]")),
    }
}

/// `[LEVEL] [repo] message`; info lines carry no level tag.
fn render_line(level: Level, fields: &EventFields) -> String {
    let mut line = String::new();
    if let Some(tag) = level_tag(level) {
        line.push_str(&format!("{tag} "));
    }
    if let Some(repo) = &fields.repo {
        line.push_str(&format!("[{}] ", Colored(Cyan, repo)));
    }
    if let Some(message) = &fields.message {
        line.push_str(message);
    }
    line
}

pub struct RepoFormatter;

impl<S, N> FormatEvent<S, N> for RepoFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        writeln!(writer, "{}", render_line(*event.metadata().level(), &fields))
    }
}

/// One formatted event, printed on drop with progress bars suspended.
/// Info goes to stdout, every other level to stderr.
struct TerminalLine {
    buffer: Vec<u8>,
    stderr: bool,
}

impl io::Write for TerminalLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for TerminalLine {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let output = String::from_utf8_lossy(&self.buffer)
            .trim_end_matches('\n')
            .to_string();
        let stderr = self.stderr;
        crate::progress::suspend(|| {
            if stderr {
                eprintln!("{output}");
            } else {
                println!("{output}");
            }
        });
    }
}

struct Terminal;

impl<'a> MakeWriter<'a> for Terminal {
    type Writer = TerminalLine;

    fn make_writer(&'a self) -> Self::Writer {
        TerminalLine {
            buffer: Vec::new(),
            stderr: false,
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        TerminalLine {
            buffer: Vec::new(),
            stderr: *meta.level() != Level::INFO,
        }
    }
}

fn filter_level(args: &Args) -> Level {
    if args.quiet {
        Level::ERROR
    } else if args.verbose >= 2 {
        Level::TRACE
    } else if args.verbose == 1 {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// repokit crates log at the requested level; dependencies stay at warnings
/// unless tracing, where the HTTP client is shown at debug.
fn filter_directives(args: &Args, extra: Option<&str>) -> String {
    let level = filter_level(args);
    let mut directives = vec![
        level.min(Level::WARN).to_string().to_lowercase(),
        format!("repokit={}", level.to_string().to_lowercase()),
    ];
    if level == Level::TRACE {
        directives.push("ureq=debug".to_string());
    }
    directives.extend(
        extra
            .into_iter()
            .flat_map(|extra| extra.split(','))
            .map(str::trim)
            .filter(|directive| !directive.is_empty())
            .map(String::from),
    );
    directives.join(",")
}

pub fn setup_logging(args: &Args) {
    let extra = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::new(filter_directives(args, extra.as_deref()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(Terminal)
        .without_time();

    let subscriber: Box<dyn Subscriber + Send + Sync> = if args.json {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.event_format(RepoFormatter).finish())
    };

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {err}");
    }
}
