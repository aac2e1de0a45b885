//! Fixtures shared by unit tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use diesel::{sql_query, Connection, RunQueryDsl, SqliteConnection};
use repokit_config::repository::Repository;
use repokit_registry::{PrimaryFormat, RepoMetadata};
use repokit_utils::hash::{checksum_bytes, Checksum, ChecksumAlgorithm};

use crate::index::PackageRecord;

#[derive(Debug, Clone)]
pub struct Pkg {
    name: String,
    version: String,
    release: String,
    arch: String,
    location: String,
    source_rpm: Option<String>,
    checksum: Option<Checksum>,
}

impl Pkg {
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        let nvra = format!("{name}-{version}-{release}.{arch}");
        Self {
            name: name.into(),
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
            location: format!("Packages/{nvra}.rpm"),
            source_rpm: None,
            checksum: Some(Checksum::new(
                ChecksumAlgorithm::Sha256,
                checksum_bytes(ChecksumAlgorithm::Sha256, nvra.as_bytes()),
            )),
        }
    }

    pub fn source(mut self, source_rpm: &str) -> Self {
        self.source_rpm = Some(source_rpm.into());
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = location.into();
        self
    }

    pub fn no_checksum(mut self) -> Self {
        self.checksum = None;
        self
    }

    /// Advertise the SHA-256 of `content` as the package checksum.
    pub fn content(mut self, content: &[u8]) -> Self {
        self.checksum = Some(Checksum::new(
            ChecksumAlgorithm::Sha256,
            checksum_bytes(ChecksumAlgorithm::Sha256, content),
        ));
        self
    }

    /// Like [`Self::content`], but keeps a package without checksum unchanged.
    pub fn published(self, content: &[u8]) -> Self {
        if self.checksum.is_some() {
            self.content(content)
        } else {
            self
        }
    }

    pub fn record(&self) -> PackageRecord {
        PackageRecord {
            name: self.name.clone(),
            version: self.version.clone(),
            release: self.release.clone(),
            epoch: Some("0".into()),
            arch: self.arch.clone(),
            location: self.location.clone(),
            source_rpm: self.source_rpm.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

pub fn primary_xml(pkgs: &[Pkg]) -> String {
    let mut out = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata \
         xmlns=\"http://linux.duke.edu/metadata/common\" \
         xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">\n",
        pkgs.len()
    );
    for pkg in pkgs {
        out.push_str("<package type=\"rpm\">\n");
        out.push_str(&format!("  <name>{}</name>\n  <arch>{}</arch>\n", pkg.name, pkg.arch));
        out.push_str(&format!(
            "  <version epoch=\"0\" ver=\"{}\" rel=\"{}\"/>\n",
            pkg.version, pkg.release
        ));
        if let Some(checksum) = &pkg.checksum {
            out.push_str(&format!(
                "  <checksum type=\"{}\" pkgid=\"YES\">{}</checksum>\n",
                checksum.algorithm, checksum.digest
            ));
        }
        out.push_str(&format!("  <location href=\"{}\"/>\n", pkg.location));
        match &pkg.source_rpm {
            Some(src) => {
                out.push_str(&format!(
                    "  <format><rpm:sourcerpm>{src}</rpm:sourcerpm></format>\n"
                ))
            }
            None => out.push_str("  <format><rpm:sourcerpm/></format>\n"),
        }
        out.push_str("</package>\n");
    }
    out.push_str("</metadata>\n");
    out
}

fn sql_text(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", v.replace('\'', "''")),
        None => "NULL".into(),
    }
}

pub fn primary_sqlite(path: &Path, pkgs: &[Pkg]) {
    let mut conn = SqliteConnection::establish(&path.to_string_lossy()).unwrap();
    sql_query(
        "CREATE TABLE packages (pkgKey INTEGER PRIMARY KEY, pkgId TEXT, name TEXT, \
         arch TEXT, version TEXT, epoch TEXT, release TEXT, location_href TEXT, \
         rpm_sourcerpm TEXT, checksum_type TEXT)",
    )
    .execute(&mut conn)
    .unwrap();

    for pkg in pkgs {
        let stmt = format!(
            "INSERT INTO packages (pkgId, name, arch, version, epoch, release, \
             location_href, rpm_sourcerpm, checksum_type) \
             VALUES ({}, {}, {}, {}, '0', {}, {}, {}, {})",
            sql_text(pkg.checksum.as_ref().map(|c| c.digest.as_str())),
            sql_text(Some(&pkg.name)),
            sql_text(Some(&pkg.arch)),
            sql_text(Some(&pkg.version)),
            sql_text(Some(&pkg.release)),
            sql_text(Some(&pkg.location)),
            sql_text(pkg.source_rpm.as_deref()),
            sql_text(pkg.checksum.as_ref().map(|c| c.algorithm.as_str())),
        );
        sql_query(stmt).execute(&mut conn).unwrap();
    }
}

/// Metadata for a repository served from `baseurl` and cached under
/// `{cache_root}/{name}`.
pub fn remote_metadata(
    name: &str,
    baseurl: &str,
    cache_root: &Path,
    primary: &Path,
    format: PrimaryFormat,
) -> RepoMetadata {
    let cache_dir = cache_root.join(name);
    RepoMetadata {
        repo: Repository::new(name, baseurl),
        repomd_path: cache_dir.join("repomd.xml"),
        cache_dir,
        proxy: None,
        primary_path: primary.to_path_buf(),
        primary_format: format,
        patterns_path: None,
        comps_path: None,
        repokey_path: None,
        checksums: HashMap::new(),
    }
}

pub fn repo_metadata(
    name: &str,
    cache_root: &Path,
    primary: &Path,
    format: PrimaryFormat,
) -> RepoMetadata {
    remote_metadata(name, "file:///nonexistent/repo", cache_root, primary, format)
}

/// Writes a primary.xml for `pkgs` under `dir` and returns its path.
pub fn write_primary(dir: &Path, file: &str, pkgs: &[Pkg]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(file);
    std::fs::write(&path, primary_xml(pkgs)).unwrap();
    path
}

/// Writes an RPM for every package under `remote` and returns the packages
/// with the checksums they are published with. Packages named in `broken`
/// are served as an HTML error page.
pub fn publish_packages(remote: &Path, pkgs: &[Pkg], broken: &[&str]) -> Vec<Pkg> {
    let mut published = Vec::new();
    for pkg in pkgs {
        let record = pkg.record();
        let bytes = if broken.contains(&record.name.as_str()) {
            b"<html>mirror error</html>".to_vec()
        } else {
            build_rpm(&record.name, record.nvra().as_bytes(), false)
        };
        let dest = remote.join(&record.location);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, &bytes).unwrap();
        published.push(pkg.clone().published(&bytes));
    }
    published
}

/// Publishes a complete repository under `remote`: packages, primary index,
/// optional patterns file and the `repomd.xml` manifest. Returns its base URL.
pub fn publish_repo(remote: &Path, pkgs: &[Pkg], patterns: Option<&str>) -> String {
    let published = publish_packages(remote, pkgs, &[]);
    let repodata = remote.join("repodata");
    let primary = write_primary(&repodata, "primary.xml", &published);
    let primary_text = std::fs::read(&primary).unwrap();

    let mut repomd = format!(
        "<repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n\
         <data type=\"primary\"><checksum type=\"sha256\">{}</checksum>\
         <location href=\"repodata/primary.xml\"/></data>\n",
        checksum_bytes(ChecksumAlgorithm::Sha256, &primary_text)
    );
    if let Some(patterns) = patterns {
        std::fs::write(repodata.join("patterns.xml"), patterns).unwrap();
        repomd.push_str(
            "<data type=\"patterns\"><location href=\"repodata/patterns.xml\"/></data>\n",
        );
    }
    repomd.push_str("</repomd>\n");
    std::fs::write(repodata.join("repomd.xml"), repomd).unwrap();

    url::Url::from_directory_path(remote).unwrap().to_string()
}

/// `(tag, type, data, count)` of one header index entry.
pub type HeaderEntry = (u32, u32, Vec<u8>, u32);

/// Serializes a header structure: preamble, index entries and data store.
pub fn rpm_header_bytes(entries: &[HeaderEntry]) -> Vec<u8> {
    let mut index = Vec::new();
    let mut store = Vec::new();
    for (tag, kind, data, count) in entries {
        let align = match *kind {
            4 => 4,
            5 => 8,
            _ => 1,
        };
        while store.len() % align != 0 {
            store.push(0);
        }
        index.extend_from_slice(&tag.to_be_bytes());
        index.extend_from_slice(&kind.to_be_bytes());
        index.extend_from_slice(&(store.len() as u32).to_be_bytes());
        index.extend_from_slice(&count.to_be_bytes());
        store.extend_from_slice(data);
    }

    let mut out = vec![0x8e, 0xad, 0xe8, 0x01, 0, 0, 0, 0];
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    out.extend_from_slice(&(store.len() as u32).to_be_bytes());
    out.extend(index);
    out.extend(store);
    out
}

fn cstr(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

/// A minimal RPM with SIZE, SHA256, SHA1 and MD5 signature tags and an
/// optional RSA signature tag.
pub fn build_rpm(name: &str, payload: &[u8], signed: bool) -> Vec<u8> {
    use md5::{Digest, Md5};

    let header = rpm_header_bytes(&[(1000, 6, cstr(name), 1)]);

    let mut md5 = Md5::new();
    md5.update(&header);
    md5.update(payload);
    let md5: [u8; 16] = md5.finalize().into();

    let size = (header.len() + payload.len()) as u32;
    let mut sig_entries: Vec<HeaderEntry> = vec![
        (
            273,
            6,
            cstr(&checksum_bytes(ChecksumAlgorithm::Sha256, &header)),
            1,
        ),
        (
            269,
            6,
            cstr(&checksum_bytes(ChecksumAlgorithm::Sha1, &header)),
            1,
        ),
        (1000, 4, size.to_be_bytes().to_vec(), 1),
        (1004, 7, md5.to_vec(), 16),
    ];
    if signed {
        sig_entries.push((268, 7, vec![0x89; 32], 32));
    }
    let signature = rpm_header_bytes(&sig_entries);

    let mut out = vec![0xed, 0xab, 0xee, 0xdb];
    out.resize(96, 0);
    out.extend_from_slice(&signature);
    let sig_store = signature.len() - 16 - 16 * sig_entries.len();
    out.resize(out.len() + (8 - sig_store % 8) % 8, 0);
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    out
}

/// An RPM lead followed by bytes that are not a header structure.
pub fn damaged_rpm() -> Vec<u8> {
    let mut out = vec![0xed, 0xab, 0xee, 0xdb];
    out.resize(96, 0);
    out.extend_from_slice(b"this is not a header at all");
    out
}

/// Minimal little-endian ELF64 image with the given program header types.
pub fn elf64(p_types: &[u32]) -> Vec<u8> {
    let mut buf = vec![0u8; 64];
    buf[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
    buf[4] = 2;
    buf[5] = 1;
    buf[0x20..0x28].copy_from_slice(&64u64.to_le_bytes());
    buf[0x36..0x38].copy_from_slice(&56u16.to_le_bytes());
    buf[0x38..0x3a].copy_from_slice(&(p_types.len() as u16).to_le_bytes());
    for p_type in p_types {
        let mut phdr = vec![0u8; 56];
        phdr[..4].copy_from_slice(&p_type.to_le_bytes());
        buf.extend(phdr);
    }
    buf
}
