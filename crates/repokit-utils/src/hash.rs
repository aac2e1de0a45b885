use std::{
    fmt,
    fs::File,
    io::Read,
    path::Path,
    str::FromStr,
};

use digest::Digest;

use crate::error::{HashError, HashResult};

/// Digest algorithms that repository metadata advertises for its artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha224 => "sha224",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha384 => "sha384",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = HashError;

    /// Parses the `type` attribute used in repository manifests. Older
    /// generators write `sha` for SHA-1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha" | "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha224" => Ok(ChecksumAlgorithm::Sha224),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha384" => Ok(ChecksumAlgorithm::Sha384),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            other => {
                Err(HashError::UnsupportedAlgorithm {
                    name: other.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expected digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into().trim().to_ascii_lowercase(),
        }
    }

    /// Builds a checksum from a manifest `type` attribute and hex digest.
    pub fn parse(kind: &str, digest: &str) -> HashResult<Self> {
        Ok(Self::new(kind.parse()?, digest))
    }

    /// Recomputes the digest of `path` and compares it with this checksum.
    pub fn matches_file<P: AsRef<Path>>(&self, path: P) -> HashResult<bool> {
        verify_checksum_with(path, self.algorithm, &self.digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

fn digest_reader<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Calculates the checksum of a file using the given algorithm, returned as
/// lowercase hex.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
///
/// # Example
///
/// ```no_run
/// use repokit_utils::error::HashResult;
/// use repokit_utils::hash::{calculate_checksum_with, ChecksumAlgorithm};
///
/// fn main() -> HashResult<()> {
///     let digest = calculate_checksum_with("primary.xml", ChecksumAlgorithm::Sha256)?;
///     println!("sha256 is {}", digest);
///     Ok(())
/// }
/// ```
pub fn calculate_checksum_with<P: AsRef<Path>>(
    file_path: P,
    algorithm: ChecksumAlgorithm,
) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    let digest = match algorithm {
        ChecksumAlgorithm::Md5 => File::open(file_path).and_then(digest_reader::<md5::Md5, _>),
        ChecksumAlgorithm::Sha1 => File::open(file_path).and_then(digest_reader::<sha1::Sha1, _>),
        ChecksumAlgorithm::Sha224 => {
            File::open(file_path).and_then(digest_reader::<sha2::Sha224, _>)
        }
        ChecksumAlgorithm::Sha256 => {
            File::open(file_path).and_then(digest_reader::<sha2::Sha256, _>)
        }
        ChecksumAlgorithm::Sha384 => {
            File::open(file_path).and_then(digest_reader::<sha2::Sha384, _>)
        }
        ChecksumAlgorithm::Sha512 => {
            File::open(file_path).and_then(digest_reader::<sha2::Sha512, _>)
        }
    };
    digest.map_err(read_failed)
}

/// Digest of an in-memory buffer.
pub fn checksum_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Md5 => hex::encode(md5::Md5::digest(data)),
        ChecksumAlgorithm::Sha1 => hex::encode(sha1::Sha1::digest(data)),
        ChecksumAlgorithm::Sha224 => hex::encode(sha2::Sha224::digest(data)),
        ChecksumAlgorithm::Sha256 => hex::encode(sha2::Sha256::digest(data)),
        ChecksumAlgorithm::Sha384 => hex::encode(sha2::Sha384::digest(data)),
        ChecksumAlgorithm::Sha512 => hex::encode(sha2::Sha512::digest(data)),
    }
}

/// Verifies the checksum of a file against an expected hex value,
/// case-insensitively.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn verify_checksum_with<P: AsRef<Path>>(
    file_path: P,
    algorithm: ChecksumAlgorithm,
    expected: &str,
) -> HashResult<bool> {
    let actual = calculate_checksum_with(file_path, algorithm)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}
