/// All event types emitted by repokit operations.
#[derive(Debug, Clone)]
pub enum RepoEvent {
    /// Repository metadata fetch progress.
    MetadataProgress {
        repo_name: String,
        stage: MetadataStage,
    },
    /// Download is starting.
    DownloadStarting { url: String, total: u64 },
    /// Download progress update.
    DownloadProgress {
        url: String,
        current: u64,
        total: u64,
    },
    /// Download completed successfully.
    DownloadComplete { url: String, total: u64 },
    /// Verification stage for a fetched package.
    Verifying { pkg_name: String, stage: VerifyStage },
    /// A package request resolved to a local artifact.
    PackageResolved {
        pkg_name: String,
        repo_name: String,
        cached: bool,
    },
    /// Rendered install progress line.
    InstallProgress { line: String },
    /// Log message.
    Log { level: LogLevel, message: String },
}

/// Metadata fetch stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataStage {
    /// Fetching the repository manifest.
    Manifest,
    /// Cached artifact matched its checksum.
    CacheHit(String),
    /// Downloading an artifact.
    Fetching(String),
    /// All artifacts available.
    Complete,
    /// Repository skipped.
    Failed(String),
}

/// Verification stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStage {
    /// Comparing the advertised checksum.
    Checksum,
    /// Checking header and payload digests.
    Integrity,
    /// Checking signature presence and validity.
    Signature,
    Passed,
    Failed(String),
}

/// Log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
