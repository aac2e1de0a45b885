use miette::Diagnostic;
use repokit_utils::error::{FileSystemError, PathError, UtilsError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(repokit_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(repokit_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Invalid repository name: {0}")]
    #[diagnostic(
        code(repokit_config::invalid_repository),
        help("Repository names are used as cache directory names and cannot contain `/`")
    )]
    InvalidRepository(String),

    #[error("Repository '{0}' has no baseurl")]
    #[diagnostic(
        code(repokit_config::missing_baseurl),
        help("Set `baseurl` for every [[repositories]] entry")
    )]
    MissingBaseUrl(String),

    #[error("Invalid repository URL: {0}")]
    #[diagnostic(code(repokit_config::invalid_repository_url))]
    InvalidRepositoryUrl(String),

    #[error("Duplicate repository name: {0}")]
    #[diagnostic(
        code(repokit_config::duplicate_repo),
        help("Each repository must have a unique name")
    )]
    DuplicateRepositoryName(String),

    #[error("Invalid timeout: {0}")]
    #[diagnostic(
        code(repokit_config::invalid_timeout),
        help("Use a duration such as \"30s\", \"2m\" or \"1m30s\"")
    )]
    InvalidTimeout(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(repokit_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(repokit_config::utils))]
    Utils(#[from] UtilsError),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
