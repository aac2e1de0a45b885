use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(repokit_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{scheme}': {url}")]
    #[diagnostic(
        code(repokit_dl::unsupported_scheme),
        help("Use an http://, https:// or file:// base URL")
    )]
    UnsupportedScheme { scheme: String, url: String },

    #[error("Invalid proxy: {proxy}")]
    #[diagnostic(code(repokit_dl::invalid_proxy))]
    InvalidProxy {
        proxy: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Failed to fetch {url}")]
    #[diagnostic(
        code(repokit_dl::network),
        help("Check your internet connection or proxy settings")
    )]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Timed out fetching {url}")]
    #[diagnostic(
        code(repokit_dl::timeout),
        help("Increase `timeout` in the configuration")
    )]
    Timeout { url: String },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(repokit_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("File not found: {url}")]
    #[diagnostic(code(repokit_dl::not_found))]
    NotFound { url: String },

    #[error("Failed to decompress {path}")]
    #[diagnostic(code(repokit_dl::decompress))]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(repokit_dl::io))]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Classifies a `ureq` failure for `url`.
    pub fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => {
                DownloadError::HttpError {
                    status,
                    url: url.to_string(),
                }
            }
            ureq::Error::Timeout(_) => {
                DownloadError::Timeout {
                    url: url.to_string(),
                }
            }
            other => {
                DownloadError::Network {
                    url: url.to_string(),
                    source: Box::new(other),
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ureq_status_code() {
        let err = DownloadError::from_ureq("http://x/repomd.xml", ureq::Error::StatusCode(404));
        assert!(matches!(err, DownloadError::HttpError { status: 404, .. }));
        assert_eq!(err.to_string(), "HTTP 404: http://x/repomd.xml");
    }

    #[test]
    fn test_from_ureq_other_is_network() {
        let err = DownloadError::from_ureq("http://x/a.rpm", ureq::Error::ConnectionFailed);
        assert!(matches!(err, DownloadError::Network { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unsupported_scheme_message() {
        let err = DownloadError::UnsupportedScheme {
            scheme: "ftp".into(),
            url: "ftp://mirror/repo".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported URL scheme 'ftp': ftp://mirror/repo"
        );
    }
}
