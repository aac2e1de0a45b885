//! Progress reporting for an install transaction.
//!
//! The packaging library drives the transaction and reports lifecycle events;
//! [`InstallProgressTracker`] turns them into progress lines and a log of
//! installed packages. It never fails: unexpected events are logged and ignored.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    os::fd::{AsRawFd, RawFd},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use repokit_events::{emit_log, EventSinkHandle, LogLevel, RepoEvent};
use tracing::{debug, info, warn};

static PKGNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)-(\d+.*)-(\d+\.\d+)\.(.+)\.rpm").unwrap());

const HEAD: &str = "Installing";
const MARK: char = '+';
const MARKS: usize = 40;

/// Header fields of a package being installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: Option<u32>,
    pub arch: String,
}

impl PackageHeader {
    fn handle(&self) -> String {
        format!(
            "{}:{}-{}-{}-{}",
            self.epoch.unwrap_or(0),
            self.name,
            self.version,
            self.release,
            self.arch
        )
    }

    /// `name.arch version-release`, with `epoch:` before the version when
    /// the epoch is not zero.
    fn summary(&self) -> String {
        match self.epoch {
            Some(epoch) if epoch != 0 => {
                format!(
                    "{}.{} {}:{}-{}",
                    self.name, self.arch, epoch, self.version, self.release
                )
            }
            _ => format!("{}.{} {}-{}", self.name, self.arch, self.version, self.release),
        }
    }
}

/// Package reference carried by install events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHandle {
    pub header: Option<PackageHeader>,
    pub location: PathBuf,
}

impl PackageHandle {
    pub fn new(header: PackageHeader, location: impl Into<PathBuf>) -> Self {
        Self {
            header: Some(header),
            location: location.into(),
        }
    }

    /// Display name derived from the artifact file name.
    pub fn pkgname(&self) -> String {
        pkgname(&self.location)
    }
}

fn pkgname(location: &Path) -> String {
    let basename = location
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match PKGNAME_RE.captures(&basename) {
        Some(caps) => caps[1].to_string(),
        None => basename,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    TransactionStart { total: u64 },
    TransactionProgress,
    TransactionStop,
    OpenFile(Option<PackageHandle>),
    CloseFile(Option<PackageHandle>),
    InstallStart(Option<PackageHandle>),
    InstallProgress {
        pkg: Option<PackageHandle>,
        amount: u64,
        total: u64,
    },
    UninstallStart,
    UninstallProgress,
    UninstallStop,
    ScriptError(Option<PackageHandle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    TransactionStarted,
    FileOpened,
    Installing,
    FileClosed,
    TransactionStopped,
}

pub struct InstallProgressTracker {
    state: TransactionState,
    total: u64,
    installed: u64,
    installing: u64,
    removed: u64,
    installed_names: HashSet<String>,
    files: HashMap<String, File>,
    log: Vec<String>,
    last_line: Option<String>,
    events: EventSinkHandle,
}

impl InstallProgressTracker {
    pub fn new(events: EventSinkHandle) -> Self {
        Self {
            state: TransactionState::Idle,
            total: 0,
            installed: 0,
            installing: 0,
            removed: 0,
            installed_names: HashSet::new(),
            files: HashMap::new(),
            log: Vec::new(),
            last_line: None,
            events,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn installed(&self) -> u64 {
        self.installed
    }

    pub fn installing(&self) -> u64 {
        self.installing
    }

    pub fn removed(&self) -> u64 {
        self.removed
    }

    /// Summaries of the packages whose files were closed, in order.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Feeds every event of `events` through [`Self::handle`].
    pub fn run<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = InstallEvent>,
    {
        for event in events {
            self.handle(event);
        }
    }

    /// Processes one event. `OpenFile` returns the descriptor the packaging
    /// library should read the artifact from.
    pub fn handle(&mut self, event: InstallEvent) -> Option<RawFd> {
        match event {
            InstallEvent::TransactionStart { total } => {
                self.total = total;
                self.state = TransactionState::TransactionStarted;
            }
            InstallEvent::TransactionStop => {
                self.state = TransactionState::TransactionStopped;
            }
            InstallEvent::OpenFile(pkg) => return self.open_file(pkg),
            InstallEvent::CloseFile(pkg) => self.close_file(pkg),
            InstallEvent::InstallStart(pkg) => {
                if let Some(pkg) = pkg {
                    self.installing += 1;
                    self.state = TransactionState::Installing;
                    self.render(&pkg.pkgname());
                }
            }
            InstallEvent::InstallProgress { pkg, .. } => {
                if let Some(pkg) = pkg {
                    self.state = TransactionState::Installing;
                    self.render(&pkg.pkgname());
                }
            }
            InstallEvent::UninstallStop => self.removed += 1,
            InstallEvent::ScriptError(pkg) => {
                if let Some(pkg) = pkg {
                    self.warn(format!("({}) Post script failed", pkg.pkgname()));
                }
            }
            InstallEvent::TransactionProgress
            | InstallEvent::UninstallStart
            | InstallEvent::UninstallProgress => {}
        }
        None
    }

    fn open_file(&mut self, pkg: Option<PackageHandle>) -> Option<RawFd> {
        self.last_line = None;
        let Some(pkg) = pkg else {
            self.warn("No header - huh?".to_string());
            return None;
        };
        let Some(header) = pkg.header.as_ref() else {
            self.warn(format!("No header for {}", pkg.location.display()));
            return None;
        };

        let pkgname = pkg.pkgname();
        info!("Next install: {pkgname}");
        emit_log(&self.events, LogLevel::Info, format!("Next install: {pkgname}"));

        let file = match File::open(&pkg.location) {
            Ok(file) => file,
            Err(err) => {
                self.warn(format!("Cannot open {}: {}", pkg.location.display(), err));
                return None;
            }
        };
        let fd = file.as_raw_fd();
        self.files.insert(header.handle(), file);

        if self.installed_names.insert(header.name.clone()) {
            self.installed += 1;
        }
        self.state = TransactionState::FileOpened;
        Some(fd)
    }

    fn close_file(&mut self, pkg: Option<PackageHandle>) {
        let Some(header) = pkg.and_then(|p| p.header) else {
            return;
        };
        if self.files.remove(&header.handle()).is_none() {
            debug!("no open file for {}", header.handle());
            return;
        }
        self.log.push(header.summary());
        self.state = TransactionState::FileClosed;
    }

    /// Emits the progress line for `pkgname` unless it repeats the last one.
    /// The first new line once every package is in also emits the log.
    fn render(&mut self, pkgname: &str) {
        let line = progress_line(pkgname, self.installed, self.installing, self.total);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return;
        }
        info!("{line}");
        self.events.emit(RepoEvent::InstallProgress { line: line.clone() });
        self.last_line = Some(line);

        if self.installed == self.total {
            let message = self.log.join("\n");
            debug!("{message}");
            emit_log(&self.events, LogLevel::Debug, message);
        }
    }

    fn warn(&self, message: String) {
        warn!("{message}");
        emit_log(&self.events, LogLevel::Warning, message);
    }
}

/// `Installing: {pkgname} {bar} [{installing}/{total}]`, with fixed-width
/// columns and a bar filled in proportion to `installed / total`.
pub fn progress_line(pkgname: &str, installed: u64, installing: u64, total: u64) -> String {
    let digits = total.to_string().len();
    let marks = MARKS.saturating_sub(2 * digits);
    let percent = if total == 0 {
        0
    } else {
        (installed.min(total) * 100 / total) as usize
    };
    let bar = MARK.to_string().repeat(marks * percent / 100);

    format!(
        "{HEAD:<10.10}: {pkgname:<50.50} {bar:<marks$.marks$} [{installing:>digits$}/{total:>digits$}]"
    )
}
