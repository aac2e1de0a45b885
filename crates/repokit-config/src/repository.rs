use std::path::{Path, PathBuf};

use repokit_utils::hash::{checksum_bytes, ChecksumAlgorithm};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Suffix that marks a repository as carrying source packages.
pub const SOURCE_REPO_SUFFIX: &str = "-source";

/// A remote package repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Repository {
    /// Unique name of the repository. Also the name of its cache directory.
    /// Default: hex MD5 of `baseurl`
    #[serde(default)]
    pub name: String,

    /// Base URL; `repodata/repomd.xml` is resolved relative to it.
    pub baseurl: String,

    /// Proxy used for every request to this repository.
    /// Default: the global `proxy`
    pub proxy: Option<String>,

    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,

    /// Credentials embedded into request URLs.
    pub username: Option<String>,
    pub password: Option<String>,

    /// Default: true
    pub enabled: Option<bool>,
}

impl Repository {
    pub fn new(name: impl Into<String>, baseurl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            baseurl: baseurl.into(),
            ..Default::default()
        }
    }

    /// Name given to a repository configured without one.
    pub fn anonymous_name(baseurl: &str) -> String {
        checksum_bytes(ChecksumAlgorithm::Md5, baseurl.as_bytes())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn is_source(&self) -> bool {
        self.name.ends_with(SOURCE_REPO_SUFFIX)
    }

    /// Per-repository cache directory under the session cache root.
    pub fn cache_dir<P: AsRef<Path>>(&self, cache_root: P) -> PathBuf {
        cache_root.as_ref().join(&self.name)
    }

    /// Joins `path` onto the base URL, embedding credentials when configured.
    ///
    /// Plain string joining is used so a base URL without a trailing slash keeps
    /// its last segment.
    pub fn url_for(&self, path: &str) -> Result<String> {
        let base = self.baseurl.trim_end_matches('/');
        let joined = if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{}", path.trim_start_matches('/'))
        };

        match self.username.as_deref() {
            Some(user) => with_credentials(&joined, user, self.password.as_deref()),
            None => Ok(joined),
        }
    }

    /// The proxy URL for this repository with proxy credentials applied.
    pub fn proxy_url(&self) -> Result<Option<String>> {
        let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        match self.proxy_username.as_deref() {
            Some(user) => with_credentials(proxy, user, self.proxy_password.as_deref()).map(Some),
            None => Ok(Some(proxy.to_string())),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.baseurl.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl(self.name.clone()));
        }
        if self.name.is_empty() || self.name.contains('/') || self.name == "." || self.name == ".."
        {
            return Err(ConfigError::InvalidRepository(self.name.clone()));
        }
        Url::parse(&self.baseurl)
            .map_err(|err| ConfigError::InvalidRepositoryUrl(format!("{}: {err}", self.baseurl)))?;
        Ok(())
    }
}

fn with_credentials(url: &str, user: &str, password: Option<&str>) -> Result<String> {
    let mut parsed =
        Url::parse(url).map_err(|err| ConfigError::InvalidRepositoryUrl(format!("{url}: {err}")))?;
    parsed
        .set_username(user)
        .and_then(|_| parsed.set_password(password))
        .map_err(|_| ConfigError::InvalidRepositoryUrl(format!("{url}: cannot carry credentials")))?;
    Ok(parsed.to_string())
}
