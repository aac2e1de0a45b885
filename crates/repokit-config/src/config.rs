use std::{collections::HashSet, fs, path::Path, path::PathBuf, time::Duration};

use repokit_utils::{
    path::{resolve_path, xdg_cache_home, xdg_config_home},
    time::parse_duration,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    repository::Repository,
};

pub const CONFIG_ENV: &str = "REPOKIT_CONFIG";
pub const CACHE_ENV: &str = "REPOKIT_CACHE";

pub const DEFAULT_USER_AGENT: &str = concat!("repokit/", env!("CARGO_PKG_VERSION"));

/// What to do when a package signature cannot be verified against a trusted key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePolicy {
    /// Record the result at debug level only.
    Ignore,
    #[default]
    Warn,
    /// Refuse the package.
    Enforce,
}

/// Which verifier checks downloaded packages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// Built-in RPM header inspection.
    #[default]
    Native,
    /// Shell out to `rpm -K`.
    Rpm,
}

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Root directory for cached metadata and packages.
    /// Default: $XDG_CACHE_HOME/repokit
    pub cache_path: Option<String>,

    /// Target architecture for package selection. Unset means any arch.
    pub arch: Option<String>,

    /// Network timeout for a whole request (e.g. "30s").
    pub timeout: Option<String>,

    pub user_agent: Option<String>,

    /// Proxy used by repositories that do not set their own.
    pub proxy: Option<String>,

    /// Fetch metadata and packages in parallel.
    /// Default: true
    pub parallel: Option<bool>,

    /// Maximum number of parallel fetches.
    /// Default: 4
    pub parallel_limit: Option<u32>,

    /// Default: warn
    pub signature_policy: Option<SignaturePolicy>,

    /// Default: native
    pub verifier: Option<VerifierKind>,

    #[serde(default)]
    pub repositories: Vec<Repository>,
}

/// Location of the config file: `$REPOKIT_CONFIG` or `$XDG_CONFIG_HOME/repokit/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => PathBuf::from(path),
        Err(_) => xdg_config_home().join("repokit").join("config.toml"),
    }
}

impl Config {
    /// Loads and resolves the config at `path` (or the default location).
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        let mut config = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.resolve()?;
        Ok(config)
    }

    /// Fills defaults and validates repositories.
    pub fn resolve(&mut self) -> Result<()> {
        if self.parallel.unwrap_or(true) {
            self.parallel_limit.get_or_insert(4);
        }
        self.signature_policy.get_or_insert_with(SignaturePolicy::default);
        self.verifier.get_or_insert_with(VerifierKind::default);

        if let Some(timeout) = self.timeout.as_deref() {
            if parse_duration(timeout).is_none() {
                return Err(ConfigError::InvalidTimeout(timeout.to_string()));
            }
        }

        let mut seen = HashSet::new();
        for repo in &mut self.repositories {
            if repo.name.is_empty() {
                repo.name = Repository::anonymous_name(&repo.baseurl);
            }
            repo.validate()?;
            if !seen.insert(repo.name.clone()) {
                return Err(ConfigError::DuplicateRepositoryName(repo.name.clone()));
            }
            repo.enabled.get_or_insert(true);
            if repo.proxy.is_none() {
                repo.proxy.clone_from(&self.proxy);
            }
        }

        Ok(())
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var(CACHE_ENV) {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.cache_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_cache_home().join("repokit")),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.as_deref().and_then(parse_duration)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn signature_policy(&self) -> SignaturePolicy {
        self.signature_policy.unwrap_or_default()
    }

    pub fn verifier(&self) -> VerifierKind {
        self.verifier.unwrap_or_default()
    }

    /// Parallel fetch width; 1 when parallelism is disabled.
    pub fn parallel_limit(&self) -> usize {
        if self.parallel.unwrap_or(true) {
            self.parallel_limit.unwrap_or(4).max(1) as usize
        } else {
            1
        }
    }

    pub fn enabled_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.iter().filter(|repo| repo.is_enabled())
    }

    pub fn get_repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repo| repo.name == name)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
