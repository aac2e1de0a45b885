//! Repository metadata for repokit.
//!
//! Fetches `repodata/repomd.xml` for each configured repository and caches the
//! artifacts it advertises (primary index, patterns, comps) keyed by their
//! checksums.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use repokit_config::repository::Repository;
//! use repokit_dl::transport::HttpTransport;
//! use repokit_registry::MetadataCache;
//!
//! let cache = MetadataCache::new("/var/cache/repokit", Arc::new(HttpTransport::default()));
//! let repo = Repository::new("oss", "https://download.example.org/oss");
//! let metadata = cache.fetch_metadata(&repo)?;
//! println!("primary index at {}", metadata.primary_path.display());
//! # Ok::<(), repokit_registry::MetadataError>(())
//! ```

pub mod error;
pub mod groups;
pub mod metadata;
pub mod repomd;

pub use error::{ErrorContext, MetadataError, Result};
pub use groups::{packages_in_comps, packages_in_pattern};
pub use metadata::{MetadataCache, RepoMetadata};
pub use repomd::{ArtifactKind, PrimaryFormat, Repomd, RepomdEntry};
