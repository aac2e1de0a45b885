//! Queryable view over a repository's primary index.
//!
//! The primary index comes in two encodings: an XML document
//! (`primary.xml`) or an SQLite database (`primary.sqlite`). [`PackageIndex`]
//! hides the difference; callers only ever see [`PackageRecord`]s.

mod relational;
mod xml;

use std::fmt;

use repokit_registry::{PrimaryFormat, RepoMetadata};
use repokit_utils::hash::Checksum;
use tracing::debug;

pub use relational::RelationalIndex;
pub use xml::DocumentIndex;

use crate::{arch::ArchFilter, error::IndexError, version::compare_numeric};

pub type Result<T> = std::result::Result<T, IndexError>;

/// One package entry of a primary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: Option<String>,
    pub arch: String,
    /// Path relative to the repository base URL.
    pub location: String,
    /// File name of the source package, e.g. `foo-1.2-3.src.rpm`.
    pub source_rpm: Option<String>,
    pub checksum: Option<Checksum>,
}

impl PackageRecord {
    /// Ordering key for "latest" selection, see [`crate::version::version_key`].
    pub fn version_key(&self) -> String {
        crate::version::version_key(&self.version, &self.release)
    }

    /// `name-version-release.arch`
    pub fn nvra(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.name, self.version, self.release, self.arch
        )
    }

    /// Last path component of `location`.
    pub fn filename(&self) -> &str {
        self.location.rsplit('/').next().unwrap_or(&self.location)
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nvra())
    }
}

enum Backend {
    Document(DocumentIndex),
    Relational(RelationalIndex),
}

/// Loaded primary index of one repository.
pub struct PackageIndex {
    metadata: RepoMetadata,
    backend: Backend,
}

impl PackageIndex {
    /// Opens the primary index described by `metadata`.
    pub fn load(metadata: &RepoMetadata) -> Result<Self> {
        debug!(
            "[{}] loading {:?} index {}",
            metadata.repo_name(),
            metadata.primary_format,
            metadata.primary_path.display()
        );
        let backend = match metadata.primary_format {
            PrimaryFormat::IndexDocument => {
                Backend::Document(DocumentIndex::open(&metadata.primary_path)?)
            }
            PrimaryFormat::Relational => {
                Backend::Relational(RelationalIndex::open(&metadata.primary_path)?)
            }
        };

        Ok(Self {
            metadata: metadata.clone(),
            backend,
        })
    }

    pub fn metadata(&self) -> &RepoMetadata {
        &self.metadata
    }

    pub fn repo_name(&self) -> &str {
        self.metadata.repo_name()
    }

    /// Records named `name` with an accepted arch, highest version key first.
    /// Records with equal keys keep their index order.
    pub fn find(&self, name: &str, filter: &ArchFilter) -> Result<Vec<PackageRecord>> {
        let mut records = match &self.backend {
            Backend::Document(index) => index.find(name, filter),
            Backend::Relational(index) => index.find(name, filter)?,
        };
        records.sort_by_key(|record| std::cmp::Reverse(record.version_key()));
        Ok(records)
    }

    /// The latest record named `name` with an accepted arch.
    pub fn best(&self, name: &str, filter: &ArchFilter) -> Result<Option<PackageRecord>> {
        match &self.backend {
            Backend::Document(index) => Ok(index.best(name, filter)),
            Backend::Relational(index) => index.best(name, filter),
        }
    }

    pub fn iter_all(&self) -> Result<Box<dyn Iterator<Item = PackageRecord> + '_>> {
        match &self.backend {
            Backend::Document(index) => Ok(Box::new(index.records().iter().cloned())),
            Backend::Relational(index) => Ok(Box::new(index.list_all()?.into_iter())),
        }
    }

    /// Distinct arches in first-seen order.
    pub fn arches(&self) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Document(index) => {
                let mut arches: Vec<String> = Vec::new();
                for record in index.records() {
                    if !arches.contains(&record.arch) {
                        arches.push(record.arch.clone());
                    }
                }
                Ok(arches)
            }
            Backend::Relational(index) => index.arches(),
        }
    }

    /// Highest version of `name` comparing dot-separated components numerically.
    pub fn latest_numeric_version(&self, name: &str) -> Result<Option<String>> {
        let records = self.find(name, &ArchFilter::Any)?;
        let mut latest: Option<String> = None;
        for record in records {
            let newer = match &latest {
                Some(current) => compare_numeric(&record.version, current).is_gt(),
                None => true,
            };
            if newer {
                latest = Some(record.version);
            }
        }
        Ok(latest)
    }
}

/// Keeps the first record with the strictly greatest version key.
pub(crate) fn pick_best<I>(records: I) -> Option<PackageRecord>
where
    I: IntoIterator<Item = PackageRecord>,
{
    let mut best: Option<(String, PackageRecord)> = None;
    for record in records {
        let key = record.version_key();
        let replace = match &best {
            Some((best_key, _)) => key > *best_key,
            None => true,
        };
        if replace {
            best = Some((key, record));
        }
    }
    best.map(|(_, record)| record)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::testing::{primary_sqlite, primary_xml, repo_metadata, Pkg};

    fn fixture() -> Vec<Pkg> {
        vec![
            Pkg::new("foo", "1.2", "3", "x86_64"),
            Pkg::new("foo", "1.2", "4", "i686"),
            Pkg::new("foo", "1.10", "1", "x86_64"),
            Pkg::new("foo", "1.2", "4", "x86_64"),
            Pkg::new("bar", "2.0", "1", "noarch").source("bar-2.0-1.src.rpm"),
            Pkg::new("foo", "9.0", "1", "aarch64"),
        ]
    }

    fn both_backends(dir: &std::path::Path) -> Vec<PackageIndex> {
        let xml = dir.join("primary.xml");
        fs::write(&xml, primary_xml(&fixture())).unwrap();
        let sqlite = dir.join("primary.sqlite");
        primary_sqlite(&sqlite, &fixture());

        vec![
            PackageIndex::load(&repo_metadata("xml", dir, &xml, PrimaryFormat::IndexDocument))
                .unwrap(),
            PackageIndex::load(&repo_metadata("db", dir, &sqlite, PrimaryFormat::Relational))
                .unwrap(),
        ]
    }

    #[test]
    fn test_find_orders_by_version_key() {
        let dir = tempdir().unwrap();
        let filter = ArchFilter::for_target(Some("x86_64"));
        for index in both_backends(dir.path()) {
            let found: Vec<String> = index
                .find("foo", &filter)
                .unwrap()
                .iter()
                .map(PackageRecord::nvra)
                .collect();
            // "1.2-4" > "1.2-3" > "1.10-1" in byte order
            assert_eq!(
                found,
                [
                    "foo-1.2-4.i686",
                    "foo-1.2-4.x86_64",
                    "foo-1.2-3.x86_64",
                    "foo-1.10-1.x86_64"
                ]
            );
        }
    }

    #[test]
    fn test_best_is_identical_across_backends() {
        let dir = tempdir().unwrap();
        let filter = ArchFilter::for_target(Some("x86_64"));
        let best: Vec<_> = both_backends(dir.path())
            .iter()
            .map(|index| index.best("foo", &filter).unwrap().unwrap())
            .collect();

        assert_eq!(best[0], best[1]);
        assert_eq!(best[0].nvra(), "foo-1.2-4.i686");
        assert_eq!(best[0].location, "Packages/foo-1.2-4.i686.rpm");
    }

    #[test]
    fn test_best_prefix_version_agrees_across_backends() {
        let dir = tempdir().unwrap();
        let pkgs = [
            Pkg::new("foo", "1.2+git", "1", "x86_64"),
            Pkg::new("foo", "1.2", "1", "x86_64"),
        ];
        let xml = dir.path().join("primary.xml");
        fs::write(&xml, primary_xml(&pkgs)).unwrap();
        let sqlite = dir.path().join("primary.sqlite");
        primary_sqlite(&sqlite, &pkgs);

        let filter = ArchFilter::for_target(Some("x86_64"));
        for (path, format) in [
            (&xml, PrimaryFormat::IndexDocument),
            (&sqlite, PrimaryFormat::Relational),
        ] {
            let index = PackageIndex::load(&repo_metadata("r", dir.path(), path, format)).unwrap();
            // '-' sorts after '+', so "1.2-1" beats "1.2+git-1"
            assert_eq!(
                index.best("foo", &filter).unwrap().unwrap().nvra(),
                "foo-1.2-1.x86_64"
            );
        }
    }

    #[test]
    fn test_best_without_filter_and_missing_name() {
        let dir = tempdir().unwrap();
        for index in both_backends(dir.path()) {
            assert_eq!(
                index.best("foo", &ArchFilter::Any).unwrap().unwrap().nvra(),
                "foo-9.0-1.aarch64"
            );
            assert!(index
                .best("foo", &ArchFilter::for_target(Some("armv7hl")))
                .unwrap()
                .is_none());
            assert!(index.find("baz", &ArchFilter::Any).unwrap().is_empty());
        }
    }

    #[test]
    fn test_iter_all_and_arches() {
        let dir = tempdir().unwrap();
        for index in both_backends(dir.path()) {
            assert_eq!(index.iter_all().unwrap().count(), 6);
            assert_eq!(
                index.arches().unwrap(),
                ["x86_64", "i686", "noarch", "aarch64"]
            );
            let bar = index
                .iter_all()
                .unwrap()
                .find(|r| r.name == "bar")
                .unwrap();
            assert_eq!(bar.source_rpm.as_deref(), Some("bar-2.0-1.src.rpm"));
            assert_eq!(bar.epoch.as_deref(), Some("0"));
            assert!(bar.checksum.is_some());
        }
    }

    #[test]
    fn test_latest_numeric_version() {
        let dir = tempdir().unwrap();
        for index in both_backends(dir.path()) {
            assert_eq!(
                index.latest_numeric_version("foo").unwrap().as_deref(),
                Some("9.0")
            );
            assert_eq!(index.latest_numeric_version("missing").unwrap(), None);
        }
    }

    #[test]
    fn test_pick_best_keeps_first_on_tie() {
        let a = Pkg::new("foo", "1.0", "1", "x86_64").location("a/foo.rpm").record();
        let b = Pkg::new("foo", "1.0", "1", "x86_64").location("b/foo.rpm").record();
        assert_eq!(pick_best([a.clone(), b]).unwrap().location, a.location);
        assert!(pick_best(Vec::new()).is_none());
    }

    #[test]
    fn test_record_helpers() {
        let record = Pkg::new("foo", "1.0", "1", "x86_64").record();
        assert_eq!(record.filename(), "foo-1.0-1.x86_64.rpm");
        assert_eq!(record.to_string(), "foo-1.0-1.x86_64");
    }
}
