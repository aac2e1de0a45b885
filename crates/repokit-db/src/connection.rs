use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use diesel::{Connection, SqliteConnection};
use tracing::debug;

use crate::{
    error::{DbError, Result},
    models::PrimaryPackage,
    repository::PrimaryRepository,
};

/// An opened `primary.sqlite` index.
///
/// The connection sits behind a mutex so the index can be shared across
/// threads; queries are serialized.
pub struct PrimaryDb {
    path: PathBuf,
    conn: Mutex<SqliteConnection>,
}

impl PrimaryDb {
    /// Opens an existing index and checks that it has a `packages` table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DbError::ConnectionError(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let mut conn = SqliteConnection::establish(&path.to_string_lossy())?;
        let count = PrimaryRepository::count(&mut conn)
            .map_err(|err| DbError::SchemaError(format!("{}: {err}", path.display())))?;
        debug!("opened {} ({count} packages)", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, SqliteConnection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list_all(&self) -> Result<Vec<PrimaryPackage>> {
        Ok(PrimaryRepository::list_all(&mut self.conn())?)
    }

    pub fn find_by_name(&self, name: &str, arches: Option<&[String]>) -> Result<Vec<PrimaryPackage>> {
        Ok(PrimaryRepository::find_by_name(&mut self.conn(), name, arches)?)
    }

    pub fn find_latest(
        &self,
        name: &str,
        arches: Option<&[String]>,
    ) -> Result<Option<PrimaryPackage>> {
        Ok(PrimaryRepository::find_latest(&mut self.conn(), name, arches)?)
    }

    /// Distinct non-null arches in first-seen order.
    pub fn arches(&self) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        for arch in PrimaryRepository::list_arches(&mut self.conn())?
            .into_iter()
            .flatten()
        {
            if !seen.contains(&arch) {
                seen.push(arch);
            }
        }
        Ok(seen)
    }
}
