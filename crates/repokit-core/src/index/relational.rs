use std::path::Path;

use repokit_db::{PrimaryDb, PrimaryPackage};
use repokit_utils::hash::Checksum;

use super::{PackageRecord, Result};
use crate::arch::ArchFilter;

/// `primary.sqlite` opened through `repokit-db`.
pub struct RelationalIndex {
    db: PrimaryDb,
}

impl From<PrimaryPackage> for PackageRecord {
    fn from(row: PrimaryPackage) -> Self {
        let checksum = match (row.checksum_type.as_deref(), row.pkg_id.as_deref()) {
            (Some(kind), Some(digest)) => Checksum::parse(kind, digest).ok(),
            _ => None,
        };
        PackageRecord {
            name: row.name.unwrap_or_default(),
            version: row.version.unwrap_or_default(),
            release: row.release.unwrap_or_default(),
            epoch: row.epoch,
            arch: row.arch.unwrap_or_default(),
            location: row.location_href.unwrap_or_default(),
            source_rpm: row.rpm_sourcerpm.filter(|s| !s.is_empty()),
            checksum,
        }
    }
}

impl RelationalIndex {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: PrimaryDb::open(path)?,
        })
    }

    pub fn find(&self, name: &str, filter: &ArchFilter) -> Result<Vec<PackageRecord>> {
        let rows = self.db.find_by_name(name, filter.arches())?;
        Ok(rows.into_iter().map(PackageRecord::from).collect())
    }

    pub fn best(&self, name: &str, filter: &ArchFilter) -> Result<Option<PackageRecord>> {
        Ok(self
            .db
            .find_latest(name, filter.arches())?
            .map(PackageRecord::from))
    }

    pub fn list_all(&self) -> Result<Vec<PackageRecord>> {
        Ok(self
            .db
            .list_all()?
            .into_iter()
            .map(PackageRecord::from)
            .collect())
    }

    pub fn arches(&self) -> Result<Vec<String>> {
        Ok(self.db.arches()?)
    }
}
