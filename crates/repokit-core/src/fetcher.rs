//! Resolves package names to verified local artifacts.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use repokit_config::config::SignaturePolicy;
use repokit_dl::{transport::Transport, types::FetchRequest};
use repokit_events::{
    emit_log, EventSinkHandle, LogLevel, NullSink, RepoEvent, VerifyStage,
};
use repokit_utils::{
    fs::{ensure_dir_exists, safe_remove},
    hash::calculate_checksum_with,
};
use tracing::{debug, warn};

use crate::{
    arch::ArchFilter,
    error::{FetchError, IntegrityError},
    index::{PackageIndex, PackageRecord},
    verify::{PackageVerifier, SignatureStatus},
};

pub type Result<T> = std::result::Result<T, FetchError>;

/// Best record for a request and the index it came from.
pub struct Candidate<'a> {
    pub index: &'a PackageIndex,
    pub record: PackageRecord,
}

/// Picks the best record across `indexes`.
///
/// Indexes are consulted in order; a later record replaces the current one only
/// with a strictly greater version key, so the first repository wins ties.
pub fn find_best<'a, I>(
    name: &str,
    indexes: I,
    filter: &ArchFilter,
) -> Result<Option<Candidate<'a>>>
where
    I: IntoIterator<Item = &'a PackageIndex>,
{
    let mut best: Option<Candidate<'a>> = None;
    for index in indexes {
        let Some(record) = index.best(name, filter)? else {
            continue;
        };
        let replace = match &best {
            Some(current) => record.version_key() > current.record.version_key(),
            None => true,
        };
        if replace {
            best = Some(Candidate { index, record });
        }
    }
    Ok(best)
}

/// Downloads, caches and verifies package artifacts.
pub struct PackageFetcher {
    transport: Arc<dyn Transport>,
    verifier: Arc<dyn PackageVerifier>,
    policy: SignaturePolicy,
    events: EventSinkHandle,
    parallel: bool,
}

impl PackageFetcher {
    pub fn new(transport: Arc<dyn Transport>, verifier: Arc<dyn PackageVerifier>) -> Self {
        Self {
            transport,
            verifier,
            policy: SignaturePolicy::default(),
            events: Arc::new(NullSink),
            parallel: false,
        }
    }

    pub fn signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventSinkHandle {
        &self.events
    }

    /// Resolve independent packages concurrently in [`Self::resolve_many`].
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Resolves `name` to a verified file in the package cache.
    ///
    /// `target_arch` restricts candidates to its compatible arches; `None`
    /// accepts any arch.
    pub fn resolve(
        &self,
        name: &str,
        indexes: &[PackageIndex],
        target_arch: Option<&str>,
    ) -> Result<PathBuf> {
        self.resolve_in(name, indexes, target_arch)
    }

    /// [`Self::resolve`] over any sequence of indexes.
    pub fn resolve_in<'a, I>(
        &self,
        name: &str,
        indexes: I,
        target_arch: Option<&str>,
    ) -> Result<PathBuf>
    where
        I: IntoIterator<Item = &'a PackageIndex>,
    {
        let filter = ArchFilter::for_target(target_arch);
        let Some(Candidate { index, record }) = find_best(name, indexes, &filter)? else {
            return Err(FetchError::PackageNotFound {
                name: name.to_string(),
                arches: filter.describe(),
            });
        };

        let metadata = index.metadata();
        let repo = metadata.repo_name();
        let path = metadata.package_cache_path(&record.location);
        debug!(
            pkg_name = %record.name,
            repo,
            version = %record.version_key(),
            arch = %record.arch,
            "selected package"
        );

        let mut failures = 0;
        if path.is_file() {
            match self.verify(&record, &path) {
                Ok(status) => {
                    self.apply_policy(repo, &record, status)?;
                    debug!(repo, "using cached {}", path.display());
                    self.resolved(&record, repo, true);
                    return Ok(path);
                }
                Err(err) => {
                    warn!(repo, "cached {} is corrupt: {}", record.filename(), err);
                    safe_remove(&path)?;
                    failures += 1;
                }
            }
        }

        ensure_dir_exists(metadata.packages_dir())?;
        let url = metadata.url_for(&record.location)?;
        loop {
            let request = FetchRequest::new(&url, &path).proxy(metadata.proxy.clone());
            self.transport.fetch(&request).map_err(|err| {
                FetchError::Download {
                    repo: repo.to_string(),
                    name: record.name.clone(),
                    source: err,
                }
            })?;

            match self.verify(&record, &path) {
                Ok(status) => {
                    self.apply_policy(repo, &record, status)?;
                    self.resolved(&record, repo, false);
                    return Ok(path);
                }
                Err(err) => {
                    safe_remove(&path)?;
                    failures += 1;
                    if failures >= 2 {
                        return Err(FetchError::Integrity {
                            repo: repo.to_string(),
                            name: record.name.clone(),
                            source: err,
                        });
                    }
                    warn!(
                        repo,
                        "downloaded {} is corrupt ({}), fetching again",
                        record.filename(),
                        err
                    );
                }
            }
        }
    }

    /// Resolves each distinct name once, in input order.
    pub fn resolve_many(
        &self,
        names: &[String],
        indexes: &[PackageIndex],
        target_arch: Option<&str>,
    ) -> Vec<(String, Result<PathBuf>)> {
        let mut seen = HashSet::new();
        let names: Vec<&String> = names.iter().filter(|n| seen.insert(*n)).collect();

        let resolve = |name: &&String| {
            ((*name).clone(), self.resolve(name, indexes, target_arch))
        };
        if self.parallel {
            names.par_iter().map(resolve).collect()
        } else {
            names.iter().map(resolve).collect()
        }
    }

    /// Record checksum, then integrity, then signature readability.
    fn verify(
        &self,
        record: &PackageRecord,
        path: &Path,
    ) -> std::result::Result<SignatureStatus, IntegrityError> {
        let result = self.check(record, path);
        let stage = match &result {
            Ok(_) => VerifyStage::Passed,
            Err(err) => VerifyStage::Failed(err.to_string()),
        };
        self.events.emit(RepoEvent::Verifying {
            pkg_name: record.name.clone(),
            stage,
        });
        result
    }

    fn check(
        &self,
        record: &PackageRecord,
        path: &Path,
    ) -> std::result::Result<SignatureStatus, IntegrityError> {
        if let Some(expected) = &record.checksum {
            self.stage(record, VerifyStage::Checksum);
            let actual = calculate_checksum_with(path, expected.algorithm)?;
            if actual != expected.digest {
                return Err(IntegrityError::ChecksumMismatch {
                    path: path.to_path_buf(),
                    expected: expected.digest.clone(),
                    actual,
                });
            }
        }

        self.stage(record, VerifyStage::Integrity);
        self.verifier.check_integrity(path)?;

        self.stage(record, VerifyStage::Signature);
        match self.verifier.check_signature(path) {
            SignatureStatus::HeaderDamaged => {
                Err(IntegrityError::HeaderDamaged {
                    path: path.to_path_buf(),
                })
            }
            status => Ok(status),
        }
    }

    fn stage(&self, record: &PackageRecord, stage: VerifyStage) {
        self.events.emit(RepoEvent::Verifying {
            pkg_name: record.name.clone(),
            stage,
        });
    }

    fn apply_policy(
        &self,
        repo: &str,
        record: &PackageRecord,
        status: SignatureStatus,
    ) -> Result<()> {
        match status {
            SignatureStatus::Valid => Ok(()),
            SignatureStatus::Unsigned | SignatureStatus::HeaderDamaged => {
                debug!(repo, "{} is not signed", record.nvra());
                Ok(())
            }
            SignatureStatus::KeyUnavailable | SignatureStatus::KeyUntrusted => {
                match self.policy {
                    SignaturePolicy::Ignore => {
                        debug!(repo, "{}: {}", record.nvra(), status);
                        Ok(())
                    }
                    SignaturePolicy::Warn => {
                        warn!(repo, "{}: {}", record.nvra(), status);
                        let message = format!("[{}] {}: {}", repo, record.nvra(), status);
                        emit_log(&self.events, LogLevel::Warning, message);
                        Ok(())
                    }
                    SignaturePolicy::Enforce => {
                        Err(FetchError::Signature {
                            repo: repo.to_string(),
                            name: record.name.clone(),
                            status,
                        })
                    }
                }
            }
        }
    }

    fn resolved(&self, record: &PackageRecord, repo: &str, cached: bool) {
        self.events.emit(RepoEvent::PackageResolved {
            pkg_name: record.name.clone(),
            repo_name: repo.to_string(),
            cached,
        });
    }
}
