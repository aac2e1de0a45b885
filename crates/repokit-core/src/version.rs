//! Version ordering and RPM file name parsing.

use std::cmp::Ordering;

/// `"{version}-{release}"`, the key used to pick the latest package.
///
/// Keys compare as plain strings (byte order) and ignore the epoch, so
/// `"10.0-1"` sorts below `"9.0-1"`.
pub fn version_key(version: &str, release: &str) -> String {
    format!("{version}-{release}")
}

/// Compares dot-separated versions component by component as integers.
///
/// Components that are not numbers compare as strings after every numeric
/// component; a missing component sorts first (`1.2 < 1.2.0`).
pub fn compare_numeric(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Parts of an RPM file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmFilename {
    pub name: String,
    pub version: String,
    pub release: String,
    /// Empty when the file name carries no `epoch:` prefix.
    pub epoch: String,
    pub arch: String,
}

/// Splits `[epoch:]name-version-release.arch[.rpm]`.
///
/// `foo-1.0-1.i386.rpm` gives `foo`, `1.0`, `1`, ``, `i386`;
/// `1:bar-9-123a.ia64.rpm` gives `bar`, `9`, `123a`, `1`, `ia64`.
/// Malformed input never panics; missing parts come back empty.
pub fn split_rpm_filename(filename: &str) -> RpmFilename {
    let stem = filename.strip_suffix(".rpm").unwrap_or(filename);

    let (rest, arch) = stem.rsplit_once('.').unwrap_or(("", stem));
    let (rest, release) = rest.rsplit_once('-').unwrap_or(("", rest));
    let (rest, version) = rest.rsplit_once('-').unwrap_or(("", rest));
    let (epoch, name) = match rest.split_once(':') {
        Some((epoch, name)) => (epoch, name),
        None => ("", rest),
    };

    RpmFilename {
        name: name.to_string(),
        version: version.to_string(),
        release: release.to_string(),
        epoch: epoch.to_string(),
        arch: arch.to_string(),
    }
}
