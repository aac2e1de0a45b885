//! Package lists of `patterns` and `comps` group files.

use std::{fs, path::Path};

use roxmltree::{Document, Node};

use crate::error::{ErrorContext, MetadataError, Result};

fn load(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn parse<'a>(path: &Path, text: &'a str) -> Result<Document<'a>> {
    Document::parse(text).map_err(|err| {
        MetadataError::GroupFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    })
}

fn child_text<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|p| p == name) {
        list.push(name.to_string());
    }
}

/// Packages required by the pattern whose name or summary is `group`.
///
/// An unknown group yields an empty list.
pub fn packages_in_pattern<P: AsRef<Path>>(group: &str, patterns: P) -> Result<Vec<String>> {
    let path = patterns.as_ref();
    let text = load(path)?;
    let doc = parse(path, &text)?;

    let Some(pattern) = doc.root_element().children().filter(Node::is_element).find(|p| {
        child_text(p, "name") == Some(group) || child_text(p, "summary") == Some(group)
    }) else {
        return Ok(Vec::new());
    };

    let Some(requires) = pattern
        .children()
        .find(|n| n.is_element() && n.tag_name().name().ends_with("requires"))
    else {
        return Ok(Vec::new());
    };

    let mut packages = Vec::new();
    for name in requires
        .children()
        .filter(Node::is_element)
        .filter_map(|entry| entry.attribute("name"))
    {
        push_unique(&mut packages, name);
    }
    Ok(packages)
}

/// Packages listed by the comps group whose id or name is `group`.
pub fn packages_in_comps<P: AsRef<Path>>(group: &str, comps: P) -> Result<Vec<String>> {
    let path = comps.as_ref();
    let text = load(path)?;
    let doc = parse(path, &text)?;

    let Some(found) = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "group")
        .find(|g| child_text(g, "id") == Some(group) || child_text(g, "name") == Some(group))
    else {
        return Ok(Vec::new());
    };

    let mut packages = Vec::new();
    for name in found
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "packagereq")
        .filter_map(|n| n.text())
        .map(str::trim)
    {
        push_unique(&mut packages, name);
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const PATTERNS: &str = r#"<?xml version="1.0"?>
<patterns xmlns="http://novell.com/package/metadata/suse/pattern" xmlns:rpm="http://linux.duke.edu/metadata/rpm" count="2">
  <pattern>
    <name>base</name>
    <summary>Base System</summary>
    <rpm:requires>
      <rpm:entry name="bash"/>
      <rpm:entry name="coreutils"/>
      <rpm:entry name="bash"/>
    </rpm:requires>
  </pattern>
  <pattern>
    <name>devel</name>
    <summary>Development</summary>
  </pattern>
</patterns>"#;

    const COMPS: &str = r#"<?xml version="1.0"?>
<comps>
  <group>
    <id>core</id>
    <name>Core</name>
    <packagelist>
      <packagereq type="mandatory">bash</packagereq>
      <packagereq type="default">vim</packagereq>
      <packagereq type="optional">bash</packagereq>
    </packagelist>
  </group>
</comps>"#;

    #[test]
    fn test_pattern_by_name_and_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.xml");
        fs::write(&path, PATTERNS).unwrap();

        assert_eq!(
            packages_in_pattern("base", &path).unwrap(),
            vec!["bash", "coreutils"]
        );
        assert_eq!(
            packages_in_pattern("Base System", &path).unwrap(),
            vec!["bash", "coreutils"]
        );
        assert!(packages_in_pattern("devel", &path).unwrap().is_empty());
        assert!(packages_in_pattern("missing", &path).unwrap().is_empty());
    }

    #[test]
    fn test_comps_by_id_and_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comps.xml");
        fs::write(&path, COMPS).unwrap();

        assert_eq!(packages_in_comps("core", &path).unwrap(), vec!["bash", "vim"]);
        assert_eq!(packages_in_comps("Core", &path).unwrap(), vec!["bash", "vim"]);
        assert!(packages_in_comps("gnome", &path).unwrap().is_empty());
    }

    #[test]
    fn test_unparsable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comps.xml");
        fs::write(&path, "<comps><group>").unwrap();
        assert!(matches!(
            packages_in_comps("core", &path),
            Err(MetadataError::GroupFile { .. })
        ));
    }
}
