//! `repodata/repomd.xml` manifest parsing.

use repokit_utils::hash::Checksum;
use roxmltree::{Document, Node};
use tracing::debug;

/// Kinds of metadata artifacts a manifest can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Primary,
    Patterns,
    Comps,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Primary,
        ArtifactKind::Patterns,
        ArtifactKind::Comps,
    ];

    /// `<data type="…">` values mapping to this kind, in preference order.
    fn data_types(self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Primary => &["primary_db", "primary"],
            ArtifactKind::Patterns => &["patterns"],
            ArtifactKind::Comps => &["group_gz", "group"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Primary => "primary",
            ArtifactKind::Patterns => "patterns",
            ArtifactKind::Comps => "comps",
        }
    }
}

/// Encoding of the primary package index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryFormat {
    /// `primary.xml` document of `<package>` elements.
    IndexDocument,
    /// `primary.sqlite` database with a `packages` table.
    Relational,
}

/// A single `<data>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdEntry {
    pub data_type: String,
    pub location: String,
    pub checksum: Option<Checksum>,
    /// Digest of the decompressed artifact.
    pub open_checksum: Option<Checksum>,
}

#[derive(Debug, Clone, Default)]
pub struct Repomd {
    pub entries: Vec<RepomdEntry>,
}

impl Repomd {
    /// Parses manifest text. Errors carry a human readable reason.
    pub fn parse(text: &str) -> Result<Self, String> {
        let doc = Document::parse(text).map_err(|err| err.to_string())?;
        let root = doc.root_element();
        if root.tag_name().name() != "repomd" {
            return Err(format!(
                "unexpected root element <{}>",
                root.tag_name().name()
            ));
        }

        let mut entries = Vec::new();
        for data in root.children().filter(|n| is_element(n, "data")) {
            let Some(data_type) = data.attribute("type") else {
                return Err("<data> without a type attribute".into());
            };
            let location = data
                .children()
                .find(|n| is_element(n, "location"))
                .and_then(|n| n.attribute("href"))
                .ok_or_else(|| format!("<data type=\"{data_type}\"> has no location"))?;

            entries.push(RepomdEntry {
                data_type: data_type.to_string(),
                location: location.to_string(),
                checksum: checksum_child(&data, "checksum"),
                open_checksum: checksum_child(&data, "open-checksum"),
            });
        }

        Ok(Self { entries })
    }

    /// First entry, in document order, whose type maps to `kind`.
    pub fn entry(&self, kind: ArtifactKind) -> Option<&RepomdEntry> {
        self.entries
            .iter()
            .find(|e| kind.data_types().contains(&e.data_type.as_str()))
    }

    pub fn primary_format(&self) -> Option<PrimaryFormat> {
        self.entry(ArtifactKind::Primary).map(|e| {
            if e.data_type == "primary_db" {
                PrimaryFormat::Relational
            } else {
                PrimaryFormat::IndexDocument
            }
        })
    }
}

fn is_element(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn checksum_child(data: &Node, name: &str) -> Option<Checksum> {
    let node = data.children().find(|n| is_element(n, name))?;
    let digest = node.text()?.trim();
    let kind = node.attribute("type").unwrap_or("sha256");
    match Checksum::parse(kind, digest) {
        Ok(checksum) => Some(checksum),
        Err(err) => {
            debug!("ignoring {name}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repokit_utils::hash::ChecksumAlgorithm;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1700000000</revision>
  <data type="primary">
    <checksum type="sha256">AAAA</checksum>
    <open-checksum type="sha256">bbbb</open-checksum>
    <location href="repodata/abc-primary.xml.gz"/>
  </data>
  <data type="primary_db">
    <checksum type="sha">cccc</checksum>
    <location href="repodata/abc-primary.sqlite.bz2"/>
  </data>
  <data type="group">
    <checksum type="sha256">dddd</checksum>
    <location href="repodata/comps.xml"/>
  </data>
</repomd>"#;

    #[test]
    fn test_parse_entries() {
        let repomd = Repomd::parse(REPOMD).unwrap();
        assert_eq!(repomd.entries.len(), 3);

        let primary = repomd.entry(ArtifactKind::Primary).unwrap();
        assert_eq!(primary.data_type, "primary");
        assert_eq!(primary.location, "repodata/abc-primary.xml.gz");
        assert_eq!(primary.checksum.as_ref().unwrap().digest, "aaaa");
        assert_eq!(
            primary.open_checksum,
            Some(Checksum::new(ChecksumAlgorithm::Sha256, "bbbb"))
        );
        assert_eq!(repomd.primary_format(), Some(PrimaryFormat::IndexDocument));

        let comps = repomd.entry(ArtifactKind::Comps).unwrap();
        assert_eq!(comps.location, "repodata/comps.xml");
        assert!(comps.open_checksum.is_none());
        assert!(repomd.entry(ArtifactKind::Patterns).is_none());
    }

    #[test]
    fn test_first_primary_in_document_order_wins() {
        let text = r#"<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary_db"><location href="repodata/p.sqlite.bz2"/></data>
  <data type="primary"><location href="repodata/p.xml.gz"/></data>
</repomd>"#;
        let repomd = Repomd::parse(text).unwrap();
        assert_eq!(repomd.primary_format(), Some(PrimaryFormat::Relational));
        assert_eq!(
            repomd.entry(ArtifactKind::Primary).unwrap().location,
            "repodata/p.sqlite.bz2"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Repomd::parse("<repomd><data").is_err());
        assert!(Repomd::parse("<html/>").is_err());
        assert!(Repomd::parse(r#"<repomd><data type="primary"/></repomd>"#).is_err());
    }

    #[test]
    fn test_manifest_without_primary() {
        let repomd = Repomd::parse(
            r#"<repomd><data type="other"><location href="repodata/o.xml"/></data></repomd>"#,
        )
        .unwrap();
        assert!(repomd.entry(ArtifactKind::Primary).is_none());
        assert!(repomd.primary_format().is_none());
    }
}
