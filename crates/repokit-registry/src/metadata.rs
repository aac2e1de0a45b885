//! Per-repository metadata fetching with checksum-keyed caching.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::prelude::*;
use repokit_config::repository::Repository;
use repokit_dl::{
    compression::{strip_compression_suffix, unpack_file, Compression},
    transport::Transport,
    types::FetchRequest,
};
use repokit_events::{EventSinkHandle, LogLevel, MetadataStage, NullSink, RepoEvent};
use repokit_utils::{
    fs::safe_remove,
    hash::{calculate_checksum_with, Checksum, ChecksumAlgorithm},
};
use tracing::{debug, warn};

use crate::{
    error::{ErrorContext, MetadataError, Result},
    repomd::{ArtifactKind, PrimaryFormat, Repomd, RepomdEntry},
};

const REPOMD_PATH: &str = "repodata/repomd.xml";
const REPOKEY_PATH: &str = "repodata/repomd.xml.key";

/// Locally cached metadata of one repository.
#[derive(Debug, Clone)]
pub struct RepoMetadata {
    pub repo: Repository,
    /// `{cache_dir}/{repo_name}`
    pub cache_dir: PathBuf,
    pub proxy: Option<String>,
    pub repomd_path: PathBuf,
    pub primary_path: PathBuf,
    pub primary_format: PrimaryFormat,
    pub patterns_path: Option<PathBuf>,
    pub comps_path: Option<PathBuf>,
    pub repokey_path: Option<PathBuf>,
    pub checksums: HashMap<ArtifactKind, Checksum>,
}

impl RepoMetadata {
    pub fn repo_name(&self) -> &str {
        &self.repo.name
    }

    pub fn base_url(&self) -> &str {
        &self.repo.baseurl
    }

    pub fn is_source(&self) -> bool {
        self.repo.is_source()
    }

    /// Directory holding downloaded packages of this repository.
    pub fn packages_dir(&self) -> PathBuf {
        self.cache_dir.join("packages")
    }

    /// Cache location for a package at `location` (relative to the base URL).
    pub fn package_cache_path(&self, location: &str) -> PathBuf {
        let basename = location.rsplit('/').next().unwrap_or(location);
        self.packages_dir().join(basename)
    }

    /// Full URL of `location`, with repository credentials applied.
    pub fn url_for(&self, location: &str) -> Result<String> {
        Ok(self.repo.url_for(location)?)
    }
}

/// Fetches and caches repository metadata.
pub struct MetadataCache {
    cache_root: PathBuf,
    transport: Arc<dyn Transport>,
    events: EventSinkHandle,
    parallel: bool,
}

impl MetadataCache {
    pub fn new<P: AsRef<Path>>(cache_root: P, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache_root: cache_root.as_ref().to_path_buf(),
            transport,
            events: Arc::new(NullSink),
            parallel: false,
        }
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    /// Fetch independent repositories concurrently in [`MetadataCache::fetch_all`].
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    fn stage(&self, repo: &Repository, stage: MetadataStage) {
        self.events.emit(RepoEvent::MetadataProgress {
            repo_name: repo.name.clone(),
            stage,
        });
    }

    /// Fetches metadata of every repository, skipping (with a warning) the ones that fail.
    ///
    /// The result keeps the input order.
    pub fn fetch_all(&self, repos: &[Repository]) -> Vec<RepoMetadata> {
        let results: Vec<(&Repository, Result<RepoMetadata>)> = if self.parallel {
            repos
                .par_iter()
                .map(|repo| (repo, self.fetch_metadata(repo)))
                .collect()
        } else {
            repos
                .iter()
                .map(|repo| (repo, self.fetch_metadata(repo)))
                .collect()
        };

        results
            .into_iter()
            .filter_map(|(repo, result)| {
                match result {
                    Ok(metadata) => Some(metadata),
                    Err(err) => {
                        warn!(repo = %repo.name, "skipping repository: {err}");
                        self.stage(repo, MetadataStage::Failed(err.to_string()));
                        self.events.emit(RepoEvent::Log {
                            level: LogLevel::Warning,
                            message: format!("skipping repository {}: {err}", repo.name),
                        });
                        None
                    }
                }
            })
            .collect()
    }

    /// Fetches the manifest of `repo` and every artifact it advertises.
    ///
    /// Cached artifacts whose digest still matches the manifest are reused
    /// without network I/O. The manifest itself is always re-fetched.
    pub fn fetch_metadata(&self, repo: &Repository) -> Result<RepoMetadata> {
        let repo_dir = repo.cache_dir(&self.cache_root);
        fs::create_dir_all(&repo_dir)
            .with_context(|| format!("creating directory {}", repo_dir.display()))?;

        let proxy = repo.proxy_url()?;

        self.stage(repo, MetadataStage::Manifest);
        let repomd_path = repo_dir.join("repomd.xml");
        let request =
            FetchRequest::new(repo.url_for(REPOMD_PATH)?, &repomd_path).proxy(proxy.clone());
        self.transport.fetch(&request).map_err(|err| {
            MetadataError::ManifestUnreachable {
                repo: repo.name.clone(),
                source: err,
            }
        })?;

        let text = fs::read_to_string(&repomd_path)
            .with_context(|| format!("reading {}", repomd_path.display()))?;
        let repomd = Repomd::parse(&text).map_err(|reason| {
            MetadataError::ManifestMalformed {
                repo: repo.name.clone(),
                reason,
            }
        })?;

        let (Some(primary), Some(primary_format)) =
            (repomd.entry(ArtifactKind::Primary), repomd.primary_format())
        else {
            return Err(MetadataError::MissingPrimary {
                repo: repo.name.clone(),
            });
        };

        let mut checksums = HashMap::new();
        let mut paths = HashMap::new();
        for kind in ArtifactKind::ALL {
            let entry = match kind {
                ArtifactKind::Primary => Some(primary),
                other => repomd.entry(other),
            };
            let Some(entry) = entry else {
                continue;
            };
            let path = self.fetch_artifact(repo, &repo_dir, proxy.as_deref(), entry)?;
            if let Some(expected) = expected_checksum(entry) {
                checksums.insert(kind, expected.clone());
            }
            paths.insert(kind, path);
        }

        let repokey_path = self.fetch_repokey(repo, &repo_dir, proxy.as_deref());

        self.stage(repo, MetadataStage::Complete);

        Ok(RepoMetadata {
            repo: repo.clone(),
            cache_dir: repo_dir,
            proxy,
            repomd_path,
            primary_path: paths
                .remove(&ArtifactKind::Primary)
                .ok_or_else(|| MetadataError::MissingPrimary {
                    repo: repo.name.clone(),
                })?,
            primary_format,
            patterns_path: paths.remove(&ArtifactKind::Patterns),
            comps_path: paths.remove(&ArtifactKind::Comps),
            repokey_path,
            checksums,
        })
    }

    fn fetch_artifact(
        &self,
        repo: &Repository,
        repo_dir: &Path,
        proxy: Option<&str>,
        entry: &RepomdEntry,
    ) -> Result<PathBuf> {
        let basename = entry.location.rsplit('/').next().unwrap_or(&entry.location);
        let local = repo_dir.join(strip_compression_suffix(basename));

        if is_fresh(&local, entry)? {
            debug!(repo = %repo.name, "cached {} is up to date", local.display());
            self.stage(repo, MetadataStage::CacheHit(basename.to_string()));
            return Ok(local);
        }

        // Compressed artifacts are kept packed until their checksum is checked.
        let download = repo_dir.join(basename);
        let request = FetchRequest::new(repo.url_for(&entry.location)?, &download)
            .proxy(proxy.map(String::from));

        let mut retried = false;
        loop {
            self.stage(repo, MetadataStage::Fetching(basename.to_string()));
            self.transport.fetch(&request).map_err(|err| {
                MetadataError::ArtifactUnreachable {
                    repo: repo.name.clone(),
                    artifact: entry.location.clone(),
                    source: err,
                }
            })?;

            let Some((expected, actual)) = self.verify_download(repo, entry, &download)? else {
                record_stamp(&local, entry);
                return Ok(local);
            };

            discard(&download);
            discard(&local);
            if retried {
                return Err(MetadataError::ChecksumMismatch {
                    repo: repo.name.clone(),
                    artifact: entry.location.clone(),
                    expected: expected.digest.clone(),
                    actual,
                });
            }
            warn!(
                repo = %repo.name,
                "checksum mismatch for {}, fetching again",
                entry.location
            );
            retried = true;
        }
    }

    /// Checks a fresh download and unpacks it when compressed.
    ///
    /// Returns the failed checksum and the actual digest on a mismatch.
    fn verify_download<'e>(
        &self,
        repo: &Repository,
        entry: &'e RepomdEntry,
        download: &Path,
    ) -> Result<Option<(&'e Checksum, String)>> {
        if Compression::from_path(download) == Compression::None {
            return match expected_checksum(entry) {
                Some(expected) => Ok(digest_mismatch(download, expected)?.map(|a| (expected, a))),
                None => {
                    debug!(repo = %repo.name, "no usable checksum for {}", entry.location);
                    Ok(None)
                }
            };
        }

        if let Some(expected) = &entry.checksum {
            if let Some(actual) = digest_mismatch(download, expected)? {
                return Ok(Some((expected, actual)));
            }
        }
        let local = unpack_file(download).map_err(|err| {
            MetadataError::Unpack {
                repo: repo.name.clone(),
                artifact: entry.location.clone(),
                source: err,
            }
        })?;
        discard(download);

        match &entry.open_checksum {
            Some(expected) => Ok(digest_mismatch(&local, expected)?.map(|a| (expected, a))),
            None => Ok(None),
        }
    }

    fn fetch_repokey(
        &self,
        repo: &Repository,
        repo_dir: &Path,
        proxy: Option<&str>,
    ) -> Option<PathBuf> {
        let dest = repo_dir.join("repomd.xml.key");
        let url = repo.url_for(REPOKEY_PATH).ok()?;
        match self
            .transport
            .fetch(&FetchRequest::new(&url, &dest).proxy(proxy.map(String::from)))
        {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(repo = %repo.name, "can't get {url}: {err}");
                None
            }
        }
    }
}

/// Digest the cached (decompressed) artifact must have.
fn expected_checksum(entry: &RepomdEntry) -> Option<&Checksum> {
    if Compression::from_path(&entry.location) == Compression::None {
        entry.open_checksum.as_ref().or(entry.checksum.as_ref())
    } else {
        entry.open_checksum.as_ref()
    }
}

/// Recomputes the digest of `path`; `Some(actual)` when it differs.
fn digest_mismatch(path: &Path, expected: &Checksum) -> Result<Option<String>> {
    let actual = calculate_checksum_with(path, expected.algorithm)?;
    Ok((actual != expected.digest).then_some(actual))
}

/// Stamp file recording which packed artifact a decompressed file came from.
fn stamp_path(local: &Path) -> PathBuf {
    let mut name = local.file_name().unwrap_or_default().to_os_string();
    name.push(".stamp");
    local.with_file_name(name)
}

/// `{packed checksum} sha256:{digest of the decompressed file}`
fn stamp_line(packed: &Checksum, local: &Path) -> Result<String> {
    let digest = calculate_checksum_with(local, ChecksumAlgorithm::Sha256)?;
    Ok(format!("{packed} {}", Checksum::new(ChecksumAlgorithm::Sha256, digest)))
}

/// Whether `local` still matches what the manifest advertises.
///
/// Compressed artifacts without an open-checksum are matched through the
/// stamp written when they were last unpacked.
fn is_fresh(local: &Path, entry: &RepomdEntry) -> Result<bool> {
    if !local.is_file() {
        return Ok(false);
    }
    if let Some(expected) = expected_checksum(entry) {
        return Ok(expected.matches_file(local)?);
    }
    let Some(packed) = &entry.checksum else {
        return Ok(false);
    };
    match fs::read_to_string(stamp_path(local)) {
        Ok(recorded) => Ok(recorded.trim() == stamp_line(packed, local)?),
        Err(_) => Ok(false),
    }
}

fn record_stamp(local: &Path, entry: &RepomdEntry) {
    if expected_checksum(entry).is_some() {
        return;
    }
    let Some(packed) = &entry.checksum else {
        return;
    };
    let stamp = stamp_path(local);
    let written = stamp_line(packed, local)
        .map_err(|err| err.to_string())
        .and_then(|line| fs::write(&stamp, line).map_err(|err| err.to_string()));
    if let Err(err) = written {
        debug!("can't write {}: {err}", stamp.display());
    }
}

fn discard(path: &Path) {
    if let Err(err) = safe_remove(path) {
        debug!("can't remove {}: {err}", path.display());
    }
}
