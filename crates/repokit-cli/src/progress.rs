use std::{
    collections::HashMap,
    sync::{mpsc::Receiver, Arc, LazyLock},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::{Cyan, Green, Red};
use repokit_events::{LogLevel, MetadataStage, RepoEvent, VerifyStage};
use tracing::{debug, error, info, warn};

use crate::utils::{progress_enabled, Colored};

/// Shared MultiProgress instance for suspend/stop from other modules.
static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

/// Owns the background thread started by [`spawn_event_handler`].
///
/// Drop every clone of the sender side (the session holding the sink) before
/// calling [`ProgressGuard::finish`], or the thread keeps waiting for events.
pub struct ProgressGuard {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ProgressGuard {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {bytes}/{total_bytes}  {bytes_per_sec}  {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━━─")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn new_bar(len: Option<u64>) -> ProgressBar {
    let pb = match len {
        _ if !progress_enabled() => ProgressBar::hidden(),
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    MULTI.add(pb)
}

/// File name part of a download URL, used as the bar prefix.
fn url_label(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

/// Spawn a background thread that maps [`RepoEvent`]s to indicatif bars and
/// log lines.
///
/// Each download URL gets its own bar; each repository gets a spinner while
/// its metadata is fetched.
pub fn spawn_event_handler(receiver: Receiver<RepoEvent>) -> ProgressGuard {
    let handle = std::thread::spawn(move || {
        let mut downloads: HashMap<String, ProgressBar> = HashMap::new();
        let mut repos: HashMap<String, ProgressBar> = HashMap::new();

        while let Ok(event) = receiver.recv() {
            match event {
                RepoEvent::MetadataProgress {
                    repo_name,
                    stage,
                } => {
                    let message = match stage {
                        MetadataStage::Manifest => "fetching repomd.xml".to_string(),
                        MetadataStage::Fetching(artifact) => format!("fetching {artifact}"),
                        MetadataStage::CacheHit(artifact) => {
                            debug!("[{repo_name}] {artifact} is up to date");
                            continue;
                        }
                        MetadataStage::Complete => {
                            if let Some(pb) = repos.remove(&repo_name) {
                                pb.finish_and_clear();
                            }
                            info!("{} {repo_name}", Colored(Green, "Loaded"));
                            continue;
                        }
                        MetadataStage::Failed(_) => {
                            if let Some(pb) = repos.remove(&repo_name) {
                                pb.finish_and_clear();
                            }
                            continue;
                        }
                    };
                    let pb = repos.entry(repo_name.clone()).or_insert_with(|| {
                        let pb = new_bar(None);
                        pb.set_style(spinner_style());
                        pb.enable_steady_tick(Duration::from_millis(100));
                        pb
                    });
                    pb.set_message(format!("{}: {message}", Colored(Cyan, &repo_name)));
                }

                RepoEvent::DownloadStarting {
                    url,
                    total,
                } => {
                    let pb = new_bar(Some(total));
                    pb.set_style(download_style());
                    pb.set_prefix(Colored(Cyan, url_label(&url)).to_string());
                    pb.enable_steady_tick(Duration::from_millis(100));
                    if let Some(old) = downloads.insert(url, pb) {
                        old.finish_and_clear();
                    }
                }
                RepoEvent::DownloadProgress {
                    url,
                    current,
                    total,
                } => {
                    if let Some(pb) = downloads.get(&url) {
                        pb.set_length(total);
                        pb.set_position(current);
                    }
                }
                RepoEvent::DownloadComplete {
                    url, ..
                } => {
                    if let Some(pb) = downloads.remove(&url) {
                        pb.finish_and_clear();
                    }
                }

                RepoEvent::Verifying {
                    pkg_name,
                    stage,
                } => {
                    match stage {
                        VerifyStage::Failed(reason) => {
                            warn!("{} {pkg_name}: {reason}", Colored(Red, "Rejected"));
                        }
                        stage => debug!("{pkg_name}: verify {stage:?}"),
                    }
                }
                RepoEvent::PackageResolved {
                    pkg_name,
                    repo_name,
                    cached,
                } => {
                    let how = if cached { "cached" } else { "downloaded" };
                    debug!("{pkg_name} from {repo_name} ({how})");
                }
                RepoEvent::InstallProgress {
                    line,
                } => {
                    suspend(|| println!("{line}"));
                }
                // Warnings and below are already logged by the emitting crate.
                RepoEvent::Log {
                    level,
                    message,
                } => {
                    if level == LogLevel::Error {
                        error!("{message}");
                    }
                }
            }
        }

        for pb in downloads.into_values().chain(repos.into_values()) {
            pb.finish_and_clear();
        }
    });

    ProgressGuard {
        handle: Some(handle),
    }
}
