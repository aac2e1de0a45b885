use std::{fs, path::Path};

use repokit_utils::hash::Checksum;
use roxmltree::{Document, Node};
use tracing::debug;

use super::{pick_best, PackageRecord, Result};
use crate::{arch::ArchFilter, error::IndexError};

/// `primary.xml` held in memory.
pub struct DocumentIndex {
    records: Vec<PackageRecord>,
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(String::from)
}

fn parse_package(node: Node) -> Option<PackageRecord> {
    let name = child_text(node, "name")?;
    let version = child(node, "version")?;
    let location = child(node, "location")?.attribute("href")?.to_string();

    let checksum = child(node, "checksum").and_then(|n| {
        let kind = n.attribute("type")?;
        let digest = n.text()?;
        match Checksum::parse(kind, digest) {
            Ok(checksum) => Some(checksum),
            Err(err) => {
                debug!("ignoring checksum of {name}: {err}");
                None
            }
        }
    });

    let source_rpm = child(node, "format").and_then(|format| child_text(format, "sourcerpm"));

    Some(PackageRecord {
        arch: child_text(node, "arch").unwrap_or_default(),
        version: version.attribute("ver").unwrap_or_default().to_string(),
        release: version.attribute("rel").unwrap_or_default().to_string(),
        epoch: version.attribute("epoch").map(String::from),
        name,
        location,
        source_rpm,
        checksum,
    })
}

impl DocumentIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            IndexError::IoError {
                action: format!("reading {}", path.display()),
                source: err,
            }
        })?;
        Self::parse(&content).map_err(|reason| {
            IndexError::Xml {
                path: path.to_path_buf(),
                reason,
            }
        })
    }

    /// Parses `<package>` elements; entries without a name, version or
    /// location are skipped.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let doc = Document::parse(content).map_err(|err| err.to_string())?;
        let root = doc.root_element();
        if root.tag_name().name() != "metadata" {
            return Err(format!(
                "expected <metadata> root, found <{}>",
                root.tag_name().name()
            ));
        }

        let records = root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "package")
            .filter_map(parse_package)
            .collect();

        Ok(Self { records })
    }

    pub fn records(&self) -> &[PackageRecord] {
        &self.records
    }

    pub fn find(&self, name: &str, filter: &ArchFilter) -> Vec<PackageRecord> {
        self.records
            .iter()
            .filter(|r| r.name == name && filter.matches(&r.arch))
            .cloned()
            .collect()
    }

    pub fn best(&self, name: &str, filter: &ArchFilter) -> Option<PackageRecord> {
        pick_best(
            self.records
                .iter()
                .filter(|r| r.name == name && filter.matches(&r.arch))
                .cloned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reads_all_fields() {
        let index = DocumentIndex::parse(
            r#"<?xml version="1.0"?>
<metadata xmlns="http://linux.duke.edu/metadata/common"
          xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
  <package type="rpm">
    <name>vim</name>
    <arch>x86_64</arch>
    <version epoch="2" ver="9.0" rel="1.1"/>
    <checksum type="sha256" pkgid="YES">ABCDEF</checksum>
    <location href="x86_64/vim-9.0-1.1.x86_64.rpm"/>
    <format>
      <rpm:license>Vim</rpm:license>
      <rpm:sourcerpm>vim-9.0-1.1.src.rpm</rpm:sourcerpm>
    </format>
  </package>
  <package type="rpm">
    <name>vim</name>
    <arch>src</arch>
    <version ver="9.0" rel="1.1"/>
    <checksum type="whirlpool">00</checksum>
    <location href="src/vim-9.0-1.1.src.rpm"/>
    <format><rpm:sourcerpm/></format>
  </package>
</metadata>"#,
        )
        .unwrap();

        let records = index.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].epoch.as_deref(), Some("2"));
        assert_eq!(records[0].release, "1.1");
        assert_eq!(
            records[0].source_rpm.as_deref(),
            Some("vim-9.0-1.1.src.rpm")
        );
        assert_eq!(
            records[0].checksum.as_ref().map(|c| c.digest.as_str()),
            Some("abcdef")
        );
        assert_eq!(records[1].epoch, None);
        assert_eq!(records[1].source_rpm, None);
        assert_eq!(records[1].checksum, None);
    }

    #[test]
    fn test_incomplete_packages_are_skipped() {
        let index = DocumentIndex::parse(
            r#"<metadata>
  <package><name>nolocation</name><version ver="1" rel="1"/></package>
  <package><name>ok</name><arch>noarch</arch><version ver="1" rel="1"/><location href="ok.rpm"/></package>
</metadata>"#,
        )
        .unwrap();
        assert_eq!(index.records().len(), 1);
        assert_eq!(index.records()[0].name, "ok");
    }

    #[test]
    fn test_rejects_malformed_documents() {
        assert!(DocumentIndex::parse("<metadata><package>").is_err());
        assert!(DocumentIndex::parse("<repomd/>").is_err());
    }

    #[test]
    fn test_open_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml");
        fs::write(&path, "not xml at all <").unwrap();
        let err = DocumentIndex::open(&path).err().unwrap();
        assert!(matches!(err, IndexError::Xml { ref path, .. } if path.ends_with("primary.xml")));
    }
}
