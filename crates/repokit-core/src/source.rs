//! Source package lookup and collection.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use repokit_events::{emit_log, LogLevel};
use repokit_utils::fs::{copy_into, ensure_dir_exists, files_with_suffix};
use tracing::{debug, info, warn};

use crate::{
    arch::{ArchFilter, SRC_ARCH},
    error::FetchError,
    fetcher::{PackageFetcher, Result},
    index::{pick_best, PackageIndex},
};

static SRPM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)-(\d+.*)-(\d+\.\d+).src.rpm").unwrap());

/// `name.arch version-release`
static RPM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.*)\.(.*) (.*)-(.*)").unwrap());

/// `foo-1.2-3.1.src.rpm` -> `foo`.
///
/// Releases that are not `N.N` fall back to dropping the last two
/// dash-separated fields.
pub fn source_rpm_name(source_rpm: &str) -> Option<String> {
    if let Some(caps) = SRPM_RE.captures(source_rpm) {
        return Some(caps[1].to_string());
    }
    let stem = source_rpm.strip_suffix(".src.rpm")?;
    let (rest, _release) = stem.rsplit_once('-')?;
    let (name, _version) = rest.rsplit_once('-')?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Binary package name of a request: a bare name or `name.arch version-release`.
pub fn binary_name(package: &str) -> &str {
    match RPM_RE.captures(package).and_then(|caps| caps.get(1)) {
        Some(name) => name.as_str(),
        None => package,
    }
}

/// Name of the source package `package` was built from.
///
/// Looks at the latest non-source record across `indexes`, first index
/// winning ties.
pub fn source_name_of(package: &str, indexes: &[PackageIndex]) -> Result<Option<String>> {
    let name = binary_name(package);
    let mut candidates = Vec::new();
    for index in indexes {
        candidates.extend(
            index
                .find(name, &ArchFilter::Any)?
                .into_iter()
                .filter(|record| record.arch != SRC_ARCH),
        );
    }

    Ok(pick_best(candidates)
        .and_then(|record| record.source_rpm)
        .and_then(|srpm| source_rpm_name(&srpm)))
}

/// Source packages already present in the package caches of `indexes`,
/// keyed by source name.
fn cached_sources<'a, I>(indexes: I) -> Result<HashMap<String, PathBuf>>
where
    I: IntoIterator<Item = &'a PackageIndex>,
{
    let mut cached = HashMap::new();
    for index in indexes {
        for path in files_with_suffix(index.metadata().packages_dir(), ".src.rpm")? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(name) = source_rpm_name(file_name) {
                cached.entry(name).or_insert(path);
            }
        }
    }
    Ok(cached)
}

/// Copies the source packages of `packages` into `dest_dir`.
///
/// Only repositories named `*-source` are searched. Returns the copied file
/// names. Packages without a known source, and sources missing from every
/// source repository, are skipped with a warning.
pub fn collect_sources(
    fetcher: &PackageFetcher,
    packages: &[String],
    indexes: &[PackageIndex],
    dest_dir: &Path,
) -> Result<Vec<String>> {
    let report = |message: String| {
        warn!("{message}");
        emit_log(fetcher.events(), LogLevel::Warning, message);
    };

    let source_indexes: Vec<&PackageIndex> = indexes
        .iter()
        .filter(|index| index.metadata().is_source())
        .collect();
    if source_indexes.is_empty() {
        report("No source repo found".to_string());
        return Ok(Vec::new());
    }

    let cached = cached_sources(source_indexes.iter().copied())?;
    debug!("{} source packages in cache", cached.len());
    ensure_dir_exists(dest_dir)?;

    let mut seen = Vec::new();
    let mut copied = Vec::new();
    let mut from_cache = 0;
    for package in packages {
        let Some(name) = source_name_of(package, indexes)? else {
            report(format!("Can't get source name of {package}"));
            continue;
        };
        if seen.contains(&name) {
            continue;
        }
        seen.push(name.clone());

        let path = match cached.get(&name) {
            Some(path) => {
                from_cache += 1;
                path.clone()
            }
            None => {
                match fetcher.resolve_in(&name, source_indexes.iter().copied(), Some(SRC_ARCH)) {
                    Ok(path) => path,
                    Err(FetchError::PackageNotFound { .. }) => {
                        report(format!("Source package {name} not found"));
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        let dest = copy_into(&path, dest_dir)?;
        if let Some(file_name) = dest.file_name() {
            copied.push(file_name.to_string_lossy().into_owned());
        }
    }

    info!("{from_cache} source packages gotten from cache");
    Ok(copied)
}
