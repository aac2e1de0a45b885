//! Package resolution for RPM repositories.
//!
//! [`session::ResolveSession`] ties the pieces together: repository metadata
//! from `repokit-registry`, [`index::PackageIndex`] over each primary index,
//! [`fetcher::PackageFetcher`] for cached-or-downloaded verified artifacts and
//! [`source`] for source package collection. [`install::InstallProgressTracker`]
//! reports progress once the resolved packages are being installed.

pub mod arch;
pub mod emulator;
pub mod error;
pub mod fetcher;
pub mod index;
pub mod install;
pub mod progress;
pub mod session;
pub mod source;
pub mod verify;
pub mod version;

#[cfg(test)]
mod testing;

pub use error::{FetchError, IndexError, IntegrityError, RepokitError};
pub use fetcher::PackageFetcher;
pub use index::{PackageIndex, PackageRecord};
pub use session::ResolveSession;

pub type RepokitResult<T> = std::result::Result<T, RepokitError>;
