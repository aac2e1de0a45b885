//! Package integrity and signature checks.

mod command;
mod header;

use std::{fmt, path::Path, sync::Arc};

use repokit_config::config::VerifierKind;

pub use command::RpmCommandVerifier;
pub use header::RpmHeaderVerifier;

use crate::error::IntegrityError;

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Valid,
    /// Signed, but the signing key is not available.
    KeyUnavailable,
    HeaderDamaged,
    /// Signed with a key that is not trusted.
    KeyUntrusted,
    Unsigned,
}

impl fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignatureStatus::Valid => "valid",
            SignatureStatus::KeyUnavailable => "public key not available",
            SignatureStatus::HeaderDamaged => "error reading package header",
            SignatureStatus::KeyUntrusted => "public key not trusted",
            SignatureStatus::Unsigned => "not signed",
        })
    }
}

/// Verifies downloaded package files.
pub trait PackageVerifier: Send + Sync {
    /// Structure, size and digest checks. Signatures are not considered.
    fn check_integrity(&self, path: &Path) -> Result<(), IntegrityError>;

    fn check_signature(&self, path: &Path) -> SignatureStatus;
}

pub fn verifier_for(kind: VerifierKind) -> Arc<dyn PackageVerifier> {
    match kind {
        VerifierKind::Native => Arc::new(RpmHeaderVerifier),
        VerifierKind::Rpm => Arc::new(RpmCommandVerifier::default()),
    }
}
