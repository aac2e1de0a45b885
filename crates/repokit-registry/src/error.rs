//! Error types for the registry crate.

use std::path::PathBuf;

use miette::Diagnostic;
use repokit_config::error::ConfigError;
use repokit_dl::error::DownloadError;
use repokit_utils::error::HashError;
use thiserror::Error;

/// Errors raised while fetching or reading repository metadata.
///
/// All variants are scoped to a single repository; callers skip that
/// repository and continue with the others.
#[derive(Error, Diagnostic, Debug)]
pub enum MetadataError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(repokit_registry::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(repokit_registry::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(repokit_registry::hash))]
    Hash(#[from] HashError),

    #[error("[{repo}] repository manifest is unreachable")]
    #[diagnostic(
        code(repokit_registry::manifest_unreachable),
        help("Verify the repository base URL and your network or proxy settings")
    )]
    ManifestUnreachable {
        repo: String,
        #[source]
        source: DownloadError,
    },

    #[error("[{repo}] repomd.xml syntax error: {reason}")]
    #[diagnostic(
        code(repokit_registry::manifest_malformed),
        help("The repository metadata is broken or the URL does not point at a repository")
    )]
    ManifestMalformed { repo: String, reason: String },

    #[error("[{repo}] repository has no primary package index")]
    #[diagnostic(code(repokit_registry::missing_primary))]
    MissingPrimary { repo: String },

    #[error("[{repo}] failed to fetch {artifact}")]
    #[diagnostic(code(repokit_registry::artifact_unreachable))]
    ArtifactUnreachable {
        repo: String,
        artifact: String,
        #[source]
        source: DownloadError,
    },

    #[error("[{repo}] failed to decompress {artifact}")]
    #[diagnostic(code(repokit_registry::unpack))]
    Unpack {
        repo: String,
        artifact: String,
        #[source]
        source: DownloadError,
    },

    #[error("[{repo}] checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(repokit_registry::checksum_mismatch),
        help("The mirror may be out of sync. Try again later or use another mirror.")
    )]
    ChecksumMismatch {
        repo: String,
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("{path} syntax error: {reason}")]
    #[diagnostic(code(repokit_registry::group_file))]
    GroupFile { path: PathBuf, reason: String },
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            MetadataError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MetadataError::MissingPrimary {
            repo: "oss".into(),
        };
        assert_eq!(err.to_string(), "[oss] repository has no primary package index");

        let err = MetadataError::ChecksumMismatch {
            repo: "oss".into(),
            artifact: "primary.xml".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(
            err.to_string(),
            "[oss] checksum mismatch for primary.xml: expected aa, got bb"
        );
    }

    #[test]
    fn test_with_context() {
        let res: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = res.with_context(|| "creating /cache/oss".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Error while creating /cache/oss: boom");
    }
}
