//! Package queries over a primary index.

use diesel::{dsl::sql, prelude::*, sql_types::Text};

use crate::{models::PrimaryPackage, schema::packages};

pub struct PrimaryRepository;

impl PrimaryRepository {
    /// All rows in storage order.
    pub fn list_all(conn: &mut SqliteConnection) -> QueryResult<Vec<PrimaryPackage>> {
        packages::table
            .order(packages::pkg_key.asc())
            .select(PrimaryPackage::as_select())
            .load(conn)
    }

    /// Rows named `name`, restricted to `arches` when given, in storage order.
    pub fn find_by_name(
        conn: &mut SqliteConnection,
        name: &str,
        arches: Option<&[String]>,
    ) -> QueryResult<Vec<PrimaryPackage>> {
        let mut query = packages::table
            .filter(packages::name.eq(name))
            .into_boxed();

        if let Some(arches) = arches {
            query = query.filter(packages::arch.eq_any(arches.to_vec()));
        }

        query
            .order(packages::pkg_key.asc())
            .select(PrimaryPackage::as_select())
            .load(conn)
    }

    /// Highest `version-release` key by SQLite's byte-order text comparison.
    /// Storage order breaks remaining ties.
    pub fn find_latest(
        conn: &mut SqliteConnection,
        name: &str,
        arches: Option<&[String]>,
    ) -> QueryResult<Option<PrimaryPackage>> {
        let mut query = packages::table
            .filter(packages::name.eq(name))
            .into_boxed();

        if let Some(arches) = arches {
            query = query.filter(packages::arch.eq_any(arches.to_vec()));
        }

        query
            .order((
                sql::<Text>("IFNULL(version, '') || '-' || IFNULL(release, '')").desc(),
                packages::pkg_key.asc(),
            ))
            .select(PrimaryPackage::as_select())
            .first(conn)
            .optional()
    }

    /// Arch column of every row, in storage order.
    pub fn list_arches(conn: &mut SqliteConnection) -> QueryResult<Vec<Option<String>>> {
        packages::table
            .order(packages::pkg_key.asc())
            .select(packages::arch)
            .load(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        packages::table.count().get_result(conn)
    }
}
