use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use md5::{Digest, Md5};
use repokit_utils::hash::{checksum_bytes, ChecksumAlgorithm};

use super::{PackageVerifier, SignatureStatus};
use crate::error::IntegrityError;

const LEAD_SIZE: usize = 96;
const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];
const MAX_INDEX_ENTRIES: usize = 0xffff;
const MAX_STORE_SIZE: usize = 256 * 1024 * 1024;

const TYPE_INT32: u32 = 4;
const TYPE_INT64: u32 = 5;
const TYPE_STRING: u32 = 6;
const TYPE_BIN: u32 = 7;

const SIGTAG_LONGSIZE: u32 = 270;
const SIGTAG_SHA1: u32 = 269;
const SIGTAG_SHA256: u32 = 273;
const SIGTAG_SIZE: u32 = 1000;
const SIGTAG_MD5: u32 = 1004;
const SIGNATURE_TAGS: [u32; 4] = [
    267,  // DSA
    268,  // RSA
    1002, // PGP
    1005, // GPG
];

/// Native verifier reading the RPM lead and headers directly.
///
/// Integrity covers the header structure, the recorded size and the
/// SHA256/SHA1 header digests and MD5 header+payload digest when present.
/// No keyring is consulted: a signed package reports
/// [`SignatureStatus::KeyUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RpmHeaderVerifier;

impl PackageVerifier for RpmHeaderVerifier {
    fn check_integrity(&self, path: &Path) -> Result<(), IntegrityError> {
        let pkg = RpmFile::open(path)?;
        let header_and_payload = pkg.file_len - pkg.header_offset;

        let expected_size = pkg
            .signature
            .int(SIGTAG_LONGSIZE)
            .or_else(|| pkg.signature.int(SIGTAG_SIZE));
        if let Some(expected) = expected_size {
            if expected != header_and_payload {
                return Err(IntegrityError::SizeMismatch {
                    path: path.to_path_buf(),
                    expected,
                    actual: header_and_payload,
                });
            }
        }

        for (tag, name, algorithm) in [
            (SIGTAG_SHA256, "SHA256", ChecksumAlgorithm::Sha256),
            (SIGTAG_SHA1, "SHA1", ChecksumAlgorithm::Sha1),
        ] {
            if let Some(expected) = pkg.signature.string(tag) {
                let actual = checksum_bytes(algorithm, &pkg.header);
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(IntegrityError::DigestMismatch {
                        path: path.to_path_buf(),
                        tag: name,
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }
        }

        if let Some(expected) = pkg.signature.bin(SIGTAG_MD5).map(<[u8]>::to_vec) {
            let actual = pkg
                .md5_with_payload()
                .map_err(|err| malformed(path, err.to_string()))?;
            if actual.as_slice() != expected {
                return Err(IntegrityError::DigestMismatch {
                    path: path.to_path_buf(),
                    tag: "MD5",
                    expected: hex::encode(expected),
                    actual: hex::encode(actual),
                });
            }
        }

        Ok(())
    }

    fn check_signature(&self, path: &Path) -> SignatureStatus {
        match RpmFile::open(path) {
            Ok(pkg) if SIGNATURE_TAGS.iter().any(|t| pkg.signature.has(*t)) => {
                SignatureStatus::KeyUnavailable
            }
            Ok(_) => SignatureStatus::Unsigned,
            Err(_) => SignatureStatus::HeaderDamaged,
        }
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> IntegrityError {
    IntegrityError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

struct IndexEntry {
    tag: u32,
    kind: u32,
    offset: usize,
    count: usize,
}

/// Index entries and data store of one header structure.
struct HeaderIndex {
    entries: Vec<IndexEntry>,
    store: Vec<u8>,
}

impl HeaderIndex {
    fn find(&self, tag: u32) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    fn has(&self, tag: u32) -> bool {
        self.find(tag).is_some()
    }

    fn data(&self, entry: &IndexEntry, len: usize) -> Option<&[u8]> {
        self.store.get(entry.offset..entry.offset.checked_add(len)?)
    }

    fn int(&self, tag: u32) -> Option<u64> {
        let entry = self.find(tag)?;
        match entry.kind {
            TYPE_INT32 => {
                let bytes = self.data(entry, 4)?;
                Some(u32::from_be_bytes(bytes.try_into().ok()?) as u64)
            }
            TYPE_INT64 => {
                let bytes = self.data(entry, 8)?;
                Some(u64::from_be_bytes(bytes.try_into().ok()?))
            }
            _ => None,
        }
    }

    fn string(&self, tag: u32) -> Option<&str> {
        let entry = self.find(tag)?;
        if entry.kind != TYPE_STRING {
            return None;
        }
        let rest = self.store.get(entry.offset..)?;
        let end = rest.iter().position(|b| *b == 0)?;
        std::str::from_utf8(&rest[..end]).ok()
    }

    fn bin(&self, tag: u32) -> Option<&[u8]> {
        let entry = self.find(tag)?;
        if entry.kind != TYPE_BIN {
            return None;
        }
        self.data(entry, entry.count)
    }
}

/// Parsed lead and headers of an RPM file; the payload is left on disk.
struct RpmFile {
    reader: BufReader<File>,
    file_len: u64,
    signature: HeaderIndex,
    /// Byte offset of the main header.
    header_offset: u64,
    /// Raw main header (preamble, index and store).
    header: Vec<u8>,
}

impl RpmFile {
    fn open(path: &Path) -> Result<Self, IntegrityError> {
        let file = File::open(path).map_err(|err| malformed(path, err.to_string()))?;
        let file_len = file
            .metadata()
            .map_err(|err| malformed(path, err.to_string()))?
            .len();
        let mut reader = BufReader::new(file);

        let mut lead = [0u8; LEAD_SIZE];
        read_exact(&mut reader, &mut lead, path, "lead")?;
        if lead[..4] != LEAD_MAGIC {
            return Err(malformed(path, "not an RPM file"));
        }

        let remaining = file_len.saturating_sub(LEAD_SIZE as u64);
        let (signature, sig_raw) = read_header(&mut reader, remaining, path, "signature header")?;
        let sig_len = sig_raw.len() - 16 - 16 * signature.entries.len();
        let pad = (8 - sig_len % 8) % 8;
        let mut padding = vec![0u8; pad];
        read_exact(&mut reader, &mut padding, path, "signature padding")?;

        let header_offset = (LEAD_SIZE + sig_raw.len() + pad) as u64;
        let remaining = file_len.saturating_sub(header_offset);
        let (_, header) = read_header(&mut reader, remaining, path, "header")?;

        Ok(Self {
            reader,
            file_len,
            signature,
            header_offset,
            header,
        })
    }

    fn md5_with_payload(mut self) -> io::Result<[u8; 16]> {
        let mut hasher = Md5::new();
        hasher.update(&self.header);
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = self.reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().into())
    }
}

fn read_exact<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    path: &Path,
    what: &str,
) -> Result<(), IntegrityError> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            malformed(path, format!("truncated {what}"))
        } else {
            malformed(path, err.to_string())
        }
    })
}

/// Reads one header structure; returns the parsed index and its raw bytes.
///
/// `remaining` is the number of file bytes left at the preamble; a header
/// claiming more than that is rejected before its body is allocated.
fn read_header<R: Read>(
    reader: &mut R,
    remaining: u64,
    path: &Path,
    what: &str,
) -> Result<(HeaderIndex, Vec<u8>), IntegrityError> {
    let mut preamble = [0u8; 16];
    read_exact(reader, &mut preamble, path, what)?;
    if preamble[..3] != HEADER_MAGIC || preamble[3] != 1 {
        return Err(IntegrityError::HeaderDamaged {
            path: path.to_path_buf(),
        });
    }

    let nindex = be_u32(&preamble[8..12]) as usize;
    let hsize = be_u32(&preamble[12..16]) as usize;
    let body_len = nindex * 16 + hsize;
    if nindex > MAX_INDEX_ENTRIES
        || hsize > MAX_STORE_SIZE
        || body_len as u64 > remaining.saturating_sub(16)
    {
        return Err(IntegrityError::HeaderDamaged {
            path: path.to_path_buf(),
        });
    }

    let mut body = vec![0u8; body_len];
    read_exact(reader, &mut body, path, what)?;

    let entries = body[..nindex * 16]
        .chunks_exact(16)
        .map(|chunk| {
            IndexEntry {
                tag: be_u32(&chunk[0..4]),
                kind: be_u32(&chunk[4..8]),
                offset: be_u32(&chunk[8..12]) as usize,
                count: be_u32(&chunk[12..16]) as usize,
            }
        })
        .collect();
    let store = body[nindex * 16..].to_vec();

    let mut raw = preamble.to_vec();
    raw.extend_from_slice(&body);

    Ok((HeaderIndex { entries, store }, raw))
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::testing::build_rpm;

    #[test]
    fn test_valid_unsigned_package() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo-1.0-1.1.noarch.rpm");
        fs::write(&path, build_rpm("demo", b"payload bytes", false)).unwrap();

        assert!(RpmHeaderVerifier.check_integrity(&path).is_ok());
        assert_eq!(
            RpmHeaderVerifier.check_signature(&path),
            SignatureStatus::Unsigned
        );
    }

    #[test]
    fn test_signed_package_reports_missing_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.rpm");
        fs::write(&path, build_rpm("demo", b"payload", true)).unwrap();

        assert!(RpmHeaderVerifier.check_integrity(&path).is_ok());
        assert_eq!(
            RpmHeaderVerifier.check_signature(&path),
            SignatureStatus::KeyUnavailable
        );
    }

    #[test]
    fn test_corrupt_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.rpm");
        let mut bytes = build_rpm("demo", b"payload bytes", false);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            RpmHeaderVerifier.check_integrity(&path),
            Err(IntegrityError::DigestMismatch { tag: "MD5", .. })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.rpm");
        let mut bytes = build_rpm("demo", b"payload bytes", false);
        bytes.truncate(bytes.len() - 3);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            RpmHeaderVerifier.check_integrity(&path),
            Err(IntegrityError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_header_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.rpm");
        let payload = b"payload bytes";
        let mut bytes = build_rpm("demo", payload, false);
        // last byte of the NAME string in the main header store, before the NUL
        let idx = bytes.len() - payload.len() - 2;
        bytes[idx] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            RpmHeaderVerifier.check_integrity(&path),
            Err(IntegrityError::DigestMismatch { tag: "SHA256", .. })
        ));
    }

    #[test]
    fn test_header_larger_than_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.rpm");
        let mut bytes = vec![0u8; LEAD_SIZE];
        bytes[..4].copy_from_slice(&LEAD_MAGIC);
        bytes.extend_from_slice(&[0x8e, 0xad, 0xe8, 0x01, 0, 0, 0, 0]);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&(MAX_STORE_SIZE as u32).to_be_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            RpmHeaderVerifier.check_integrity(&path),
            Err(IntegrityError::HeaderDamaged { .. })
        ));
    }

    #[test]
    fn test_not_an_rpm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.html");
        fs::write(&path, "<html>404</html>").unwrap();

        assert!(matches!(
            RpmHeaderVerifier.check_integrity(&path),
            Err(IntegrityError::Malformed { .. })
        ));
        assert_eq!(
            RpmHeaderVerifier.check_signature(&path),
            SignatureStatus::HeaderDamaged
        );
    }
}
