//! A resolution session over the enabled repositories of a [`Config`].
//!
//! Opening a session fetches the metadata of every enabled repository and
//! loads its primary index. Repositories that fail are skipped with a
//! warning; a session without any usable index is an error.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::{ThreadPool, ThreadPoolBuilder};
use repokit_config::{config::Config, repository::Repository};
use repokit_dl::{
    http_client::{ClientConfig, HttpClient},
    transport::{HttpTransport, Transport},
};
use repokit_events::{emit_log, EventSinkHandle, LogLevel};
use repokit_registry::{packages_in_comps, packages_in_pattern, MetadataCache};
use tracing::{debug, warn};

use crate::{
    arch,
    error::{FetchError, IndexError, RepokitError},
    fetcher::PackageFetcher,
    index::PackageIndex,
    progress::create_progress_bridge,
    source,
    verify::verifier_for,
};

pub struct ResolveSession {
    cache_root: PathBuf,
    target_arch: Option<String>,
    indexes: Vec<PackageIndex>,
    fetcher: PackageFetcher,
    pool: Option<ThreadPool>,
}

impl ResolveSession {
    /// Opens a session using an HTTP transport configured from `config`.
    pub fn open(config: &Config, events: EventSinkHandle) -> Result<Self, RepokitError> {
        let client = HttpClient::new(ClientConfig {
            user_agent: Some(config.user_agent().to_string()),
            headers: None,
            timeout: config.timeout(),
        });
        let transport =
            HttpTransport::new(client).with_progress(create_progress_bridge(events.clone()));
        Self::with_transport(config, Arc::new(transport), events)
    }

    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn Transport>,
        events: EventSinkHandle,
    ) -> Result<Self, RepokitError> {
        let cache_root = config.get_cache_path()?;
        let pool = build_pool(config.parallel_limit());
        let repos: Vec<Repository> = config.enabled_repositories().cloned().collect();
        debug!(
            repos = repos.len(),
            cache = %cache_root.display(),
            parallel = pool.is_some(),
            "opening resolve session"
        );

        let cache = MetadataCache::new(&cache_root, transport.clone())
            .with_events(events.clone())
            .parallel(pool.is_some());
        let metadata = match &pool {
            Some(pool) => pool.install(|| cache.fetch_all(&repos)),
            None => cache.fetch_all(&repos),
        };

        let mut indexes = Vec::with_capacity(metadata.len());
        for meta in &metadata {
            match PackageIndex::load(meta) {
                Ok(index) => indexes.push(index),
                Err(err) => {
                    warn!(repo = meta.repo_name(), "skipping repository: {err}");
                    let message = format!("skipping repository {}: {err}", meta.repo_name());
                    emit_log(&events, LogLevel::Warning, message);
                }
            }
        }
        if indexes.is_empty() {
            return Err(RepokitError::NoRepositories);
        }

        let fetcher = PackageFetcher::new(transport, verifier_for(config.verifier()))
            .signature_policy(config.signature_policy())
            .with_events(events)
            .parallel(pool.is_some());

        Ok(Self {
            cache_root,
            target_arch: config.arch.clone(),
            indexes,
            fetcher,
            pool,
        })
    }

    /// Overrides the target architecture taken from the configuration.
    pub fn target_arch(mut self, arch: Option<String>) -> Self {
        if arch.is_some() {
            self.target_arch = arch;
        }
        self
    }

    pub fn arch(&self) -> Option<&str> {
        self.target_arch.as_deref()
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Loaded indexes, in configuration order.
    pub fn indexes(&self) -> &[PackageIndex] {
        &self.indexes
    }

    pub fn fetcher(&self) -> &PackageFetcher {
        &self.fetcher
    }

    fn run<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, FetchError> {
        self.fetcher.resolve(name, &self.indexes, self.arch())
    }

    pub fn resolve_many(&self, names: &[String]) -> Vec<(String, Result<PathBuf, FetchError>)> {
        self.run(|| self.fetcher.resolve_many(names, &self.indexes, self.arch()))
    }

    /// Copies the source packages of `packages` into `dest_dir`.
    pub fn collect_sources(
        &self,
        packages: &[String],
        dest_dir: &Path,
    ) -> Result<Vec<String>, FetchError> {
        source::collect_sources(&self.fetcher, packages, &self.indexes, dest_dir)
    }

    /// Minimal set of arches covering every package in every index.
    pub fn supported_arches(&self) -> Result<Vec<String>, IndexError> {
        let mut observed = Vec::new();
        for index in &self.indexes {
            for arch in index.arches()? {
                if !observed.contains(&arch) {
                    observed.push(arch);
                }
            }
        }
        Ok(arch::supported_arches(observed))
    }

    /// Version of `rpm` shipped by the first repository.
    pub fn rpm_version_in_repos(&self) -> Result<Option<String>, IndexError> {
        match self.indexes.first() {
            Some(index) => index.latest_numeric_version("rpm"),
            None => Ok(None),
        }
    }

    /// Packages of a pattern or comps group, from the first repository that
    /// knows it.
    pub fn group_packages(&self, group: &str) -> Result<Vec<String>, RepokitError> {
        for index in &self.indexes {
            let meta = index.metadata();
            if let Some(patterns) = &meta.patterns_path {
                let packages = packages_in_pattern(group, patterns)?;
                if !packages.is_empty() {
                    return Ok(packages);
                }
            }
            if let Some(comps) = &meta.comps_path {
                let packages = packages_in_comps(group, comps)?;
                if !packages.is_empty() {
                    return Ok(packages);
                }
            }
        }
        debug!("group {group} not found in any repository");
        Ok(Vec::new())
    }
}

fn build_pool(limit: usize) -> Option<ThreadPool> {
    if limit <= 1 {
        return None;
    }
    match ThreadPoolBuilder::new().num_threads(limit).build() {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!("can't start {limit} fetch threads, fetching sequentially: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use repokit_events::{CollectorSink, NullSink};
    use tempfile::tempdir;

    use super::*;
    use crate::testing::{publish_repo, Pkg};

    const PATTERNS: &str = r#"<?xml version="1.0"?>
<patterns xmlns="http://novell.com/package/metadata/suse/pattern" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <pattern>
    <name>minimal</name>
    <summary>Minimal System</summary>
    <rpm:requires>
      <rpm:entry name="bash"/>
      <rpm:entry name="rpm"/>
    </rpm:requires>
  </pattern>
</patterns>"#;

    fn config(root: &Path, arch: Option<&str>, repos: Vec<Repository>) -> Config {
        let mut config = Config {
            cache_path: Some(root.join("cache").to_string_lossy().into_owned()),
            arch: arch.map(String::from),
            parallel: Some(false),
            repositories: repos,
            ..Default::default()
        };
        config.resolve().unwrap();
        config
    }

    fn publish(root: &Path, name: &str, pkgs: &[Pkg], patterns: Option<&str>) -> Repository {
        let baseurl = publish_repo(&root.join("remote").join(name), pkgs, patterns);
        Repository::new(name, baseurl)
    }

    #[test]
    fn test_session_resolves_across_repositories() {
        let root = tempdir().unwrap();
        let repos = vec![
            publish(
                root.path(),
                "oss",
                &[
                    Pkg::new("rpm", "4.14.3", "1", "x86_64"),
                    Pkg::new("bash", "5.1", "1", "x86_64"),
                    Pkg::new("bash", "5.1", "1", "i586"),
                ],
                Some(PATTERNS),
            ),
            publish(
                root.path(),
                "update",
                &[
                    Pkg::new("bash", "5.1", "2", "x86_64"),
                    Pkg::new("rpm", "4.16.1", "1", "x86_64"),
                ],
                None,
            ),
        ];
        let config = config(root.path(), Some("x86_64"), repos);

        let session = ResolveSession::open(&config, Arc::new(NullSink)).unwrap();
        assert_eq!(session.indexes().len(), 2);
        assert_eq!(session.arch(), Some("x86_64"));

        let bash = session.resolve("bash").unwrap();
        assert_eq!(
            bash,
            root.path()
                .join("cache/update/packages/bash-5.1-2.x86_64.rpm")
        );

        assert_eq!(session.supported_arches().unwrap(), ["x86_64"]);
        assert_eq!(
            session.rpm_version_in_repos().unwrap().as_deref(),
            Some("4.14.3")
        );
        assert_eq!(session.group_packages("Minimal System").unwrap(), ["bash", "rpm"]);
        assert!(session.group_packages("devel").unwrap().is_empty());
    }

    #[test]
    fn test_session_skips_unreachable_repositories() {
        let root = tempdir().unwrap();
        let good = publish(root.path(), "oss", &[Pkg::new("vim", "9.0", "1", "x86_64")], None);
        let missing = Repository::new(
            "gone",
            url::Url::from_directory_path(root.path().join("nowhere"))
                .unwrap()
                .to_string(),
        );
        let config = config(root.path(), None, vec![missing, good]);

        let sink = Arc::new(CollectorSink::default());
        let session = ResolveSession::open(&config, sink.clone()).unwrap();
        assert_eq!(session.indexes().len(), 1);
        assert_eq!(session.indexes()[0].repo_name(), "oss");
        assert!(sink
            .messages(LogLevel::Warning)
            .iter()
            .any(|m| m.starts_with("skipping repository gone")));

        let results = session.resolve_many(&["vim".to_string(), "emacs".to_string()]);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1,
            Err(FetchError::PackageNotFound { .. })
        ));
    }

    #[test]
    fn test_session_without_repositories() {
        let root = tempdir().unwrap();
        let config = config(root.path(), None, Vec::new());
        assert!(matches!(
            ResolveSession::open(&config, Arc::new(NullSink)),
            Err(RepokitError::NoRepositories)
        ));
    }

    #[test]
    fn test_session_parallel_fetch() {
        let root = tempdir().unwrap();
        let repos = vec![
            publish(root.path(), "a", &[Pkg::new("one", "1", "1", "noarch")], None),
            publish(root.path(), "b", &[Pkg::new("two", "1", "1", "noarch")], None),
        ];
        let mut config = config(root.path(), Some("aarch64"), repos);
        config.parallel = Some(true);
        config.parallel_limit = Some(2);

        let session = ResolveSession::open(&config, Arc::new(NullSink))
            .unwrap()
            .target_arch(Some("i686".into()));
        assert_eq!(session.arch(), Some("i686"));

        let names: Vec<String> = ["two", "one"].iter().map(|s| s.to_string()).collect();
        let results = session.resolve_many(&names);
        assert_eq!(results[0].0, "two");
        assert_eq!(results[1].0, "one");
        for (_, result) in results {
            assert!(fs::metadata(result.unwrap()).unwrap().is_file());
        }
    }
}
