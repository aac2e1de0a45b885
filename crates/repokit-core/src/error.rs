//! Error types for repokit-core.

use std::path::PathBuf;

use miette::Diagnostic;
use repokit_config::error::ConfigError;
use repokit_db::DbError;
use repokit_dl::error::DownloadError;
use repokit_registry::MetadataError;
use repokit_utils::error::{FileSystemError, HashError, LockError};
use thiserror::Error;

use crate::verify::SignatureStatus;

/// Failures loading or querying a primary package index.
#[derive(Error, Diagnostic, Debug)]
pub enum IndexError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),

    #[error("{path} syntax error: {reason}")]
    #[diagnostic(
        code(repokit::index::xml),
        help("The cached primary index may be damaged. Remove it to force a re-fetch.")
    )]
    Xml { path: PathBuf, reason: String },

    #[error("Error while {action}")]
    #[diagnostic(code(repokit::index::io))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

/// A package file that failed verification.
#[derive(Error, Diagnostic, Debug)]
pub enum IntegrityError {
    #[error("{path}: checksum mismatch, expected {expected}, got {actual}")]
    #[diagnostic(code(repokit::integrity::checksum))]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{path}: {tag} digest mismatch, expected {expected}, got {actual}")]
    #[diagnostic(code(repokit::integrity::digest))]
    DigestMismatch {
        path: PathBuf,
        tag: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{path}: size mismatch, header says {expected} bytes, found {actual}")]
    #[diagnostic(code(repokit::integrity::size))]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("{path}: malformed package: {reason}")]
    #[diagnostic(code(repokit::integrity::malformed))]
    Malformed { path: PathBuf, reason: String },

    #[error("{path}: damaged package header")]
    #[diagnostic(code(repokit::integrity::header))]
    HeaderDamaged { path: PathBuf },

    #[error("{path}: rpm -K failed: {message}")]
    #[diagnostic(
        code(repokit::integrity::command),
        help("Make sure the `rpm` binary is installed, or use the native verifier")
    )]
    Command { path: PathBuf, message: String },

    #[error(transparent)]
    #[diagnostic(code(repokit::integrity::hash))]
    Hash(#[from] HashError),
}

/// Failures resolving a package request to a local artifact.
#[derive(Error, Diagnostic, Debug)]
pub enum FetchError {
    #[error("Package '{name}' not found (arches: {arches})")]
    #[diagnostic(
        code(repokit::fetch::not_found),
        help("Check the package name, the target arch and the configured repositories")
    )]
    PackageNotFound { name: String, arches: String },

    #[error("[{repo}] package {name} failed verification")]
    #[diagnostic(
        code(repokit::fetch::integrity),
        help("The mirror may be serving a broken file. Try again later or use another mirror.")
    )]
    Integrity {
        repo: String,
        name: String,
        #[source]
        source: IntegrityError,
    },

    #[error("[{repo}] package {name} has an untrusted signature: {status}")]
    #[diagnostic(
        code(repokit::fetch::signature),
        help("Import the repository key or set `signature_policy = \"warn\"`")
    )]
    Signature {
        repo: String,
        name: String,
        status: SignatureStatus,
    },

    #[error("[{repo}] failed to download {name}")]
    #[diagnostic(code(repokit::fetch::download))]
    Download {
        repo: String,
        name: String,
        #[source]
        source: DownloadError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(code(repokit::fetch::fs))]
    FileSystem(#[from] FileSystemError),

    #[error("Error while {action}")]
    #[diagnostic(code(repokit::fetch::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Diagnostic, Debug)]
pub enum EmulatorError {
    #[error("No statically linked qemu emulator found for {arch}")]
    #[diagnostic(
        code(repokit::emulator::not_found),
        help("Install qemu-user-static")
    )]
    NotFound { arch: String },

    #[error(transparent)]
    #[diagnostic(code(repokit::emulator::fs))]
    FileSystem(#[from] FileSystemError),
}

/// Top-level error type.
#[derive(Error, Diagnostic, Debug)]
pub enum RepokitError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Emulator(#[from] EmulatorError),

    #[error(transparent)]
    #[diagnostic(
        code(repokit::lock),
        help("Another repokit process is using this cache directory")
    )]
    Lock(#[from] LockError),

    #[error(transparent)]
    #[diagnostic(code(repokit::fs))]
    FileSystem(#[from] FileSystemError),

    #[error("No usable repositories")]
    #[diagnostic(
        code(repokit::no_repositories),
        help("Add an enabled [[repositories]] entry to the configuration")
    )]
    NoRepositories,
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, FetchError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, FetchError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            FetchError::IoError {
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
    fn test_not_found_names_package_and_arches() {
        let err = FetchError::PackageNotFound {
            name: "vim".into(),
            arches: "aarch64, noarch".into(),
        };
        assert_eq!(
            err.to_string(),
            "Package 'vim' not found (arches: aarch64, noarch)"
        );
    }

    #[test]
    fn test_with_context() {
        let res: std::io::Result<()> = Err(std::io::Error::other("denied"));
        let err = res.with_context(|| "copying a.src.rpm".into()).unwrap_err();
        assert_eq!(err.to_string(), "Error while copying a.src.rpm");
        assert!(std::error::Error::source(&err).is_some());
    }
}
