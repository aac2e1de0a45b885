use diesel::prelude::*;

use crate::schema::packages;

/// A row of the `packages` table.
///
/// Columns are nullable in the wild; callers decide what a missing value means.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = packages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PrimaryPackage {
    pub pkg_key: i32,
    pub pkg_id: Option<String>,
    pub name: Option<String>,
    pub arch: Option<String>,
    pub version: Option<String>,
    pub epoch: Option<String>,
    pub release: Option<String>,
    pub location_href: Option<String>,
    pub rpm_sourcerpm: Option<String>,
    pub checksum_type: Option<String>,
}
