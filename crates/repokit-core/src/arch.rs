//! Architecture compatibility policy.
//!
//! Three read-only tables drive everything here: the compatibility policy
//! (which binary arches a target can run), the fallback chain (the next
//! broader arch, ending in `noarch`) and the multilib set.

use repokit_utils::system;

pub const NOARCH: &str = "noarch";
pub const SRC_ARCH: &str = "src";

const ARCH_POLICIES: &[(&str, &[&str])] = &[
    ("x86_64", &["x86_64", "i686", "i586", "i486", "i386"]),
    ("i686", &["i686", "i586", "i486", "i386"]),
    ("i586", &["i586", "i486", "i386"]),
    ("ia64", &["ia64", "i686", "i586", "i486", "i386"]),
    ("aarch64", &["aarch64"]),
    ("armv7tnhl", &["armv7tnhl", "armv7thl", "armv7nhl", "armv7hl"]),
    ("armv7thl", &["armv7thl", "armv7hl"]),
    ("armv7nhl", &["armv7nhl", "armv7hl"]),
    ("armv7hl", &["armv7hl"]),
    (
        "armv7l",
        &["armv7l", "armv6l", "armv5tejl", "armv5tel", "armv5l", "armv4tl", "armv4l", "armv3l"],
    ),
    (
        "armv6l",
        &["armv6l", "armv5tejl", "armv5tel", "armv5l", "armv4tl", "armv4l", "armv3l"],
    ),
    (
        "armv5tejl",
        &["armv5tejl", "armv5tel", "armv5l", "armv4tl", "armv4l", "armv3l"],
    ),
    ("armv5tel", &["armv5tel", "armv5l", "armv4tl", "armv4l", "armv3l"]),
    ("armv5l", &["armv5l", "armv4tl", "armv4l", "armv3l"]),
];

const ARCH_FALLBACKS: &[(&str, &str)] = &[
    ("athlon", "i686"),
    ("i686", "i586"),
    ("geode", "i586"),
    ("i586", "i486"),
    ("i486", "i386"),
    ("i386", NOARCH),
    ("x86_64", "athlon"),
    ("amd64", "x86_64"),
    ("ia32e", "x86_64"),
    ("armv7tnhl", "armv7nhl"),
    ("armv7nhl", "armv7hl"),
    ("armv7hl", NOARCH),
    ("armv7l", "armv6l"),
    ("armv6l", "armv5tejl"),
    ("armv5tejl", "armv5tel"),
    ("armv5tel", NOARCH),
    ("ia64", NOARCH),
];

const MULTILIB_ARCHES: &[&str] = &["x86_64"];

/// Policy chain of `arch`, if the policy table knows it.
pub fn arch_policy(arch: &str) -> Option<&'static [&'static str]> {
    ARCH_POLICIES
        .iter()
        .find(|(key, _)| *key == arch)
        .map(|(_, chain)| *chain)
}

fn fallback_of(arch: &str) -> Option<&'static str> {
    ARCH_FALLBACKS
        .iter()
        .find(|(key, _)| *key == arch)
        .map(|(_, next)| *next)
}

/// Arches whose packages can be installed on `target`, most specific first.
///
/// The result always starts with `target` and ends with `noarch`.
pub fn compatible_arches(target: &str) -> Vec<String> {
    let mut arches: Vec<String> = match arch_policy(target) {
        Some(chain) => chain.iter().map(|a| a.to_string()).collect(),
        None => vec![target.to_string()],
    };
    if target != NOARCH {
        arches.push(NOARCH.to_string());
    }
    arches
}

/// Arch restriction applied to index queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchFilter {
    Any,
    OneOf(Vec<String>),
}

impl ArchFilter {
    /// `None` matches everything; `"src"` matches only source packages.
    pub fn for_target(target: Option<&str>) -> Self {
        match target {
            None => ArchFilter::Any,
            Some(SRC_ARCH) => ArchFilter::OneOf(vec![SRC_ARCH.to_string()]),
            Some(arch) => ArchFilter::OneOf(compatible_arches(arch)),
        }
    }

    pub fn matches(&self, arch: &str) -> bool {
        match self {
            ArchFilter::Any => true,
            ArchFilter::OneOf(arches) => arches.iter().any(|a| a == arch),
        }
    }

    pub fn arches(&self) -> Option<&[String]> {
        match self {
            ArchFilter::Any => None,
            ArchFilter::OneOf(arches) => Some(arches),
        }
    }

    /// Human readable list for error messages.
    pub fn describe(&self) -> String {
        match self {
            ArchFilter::Any => "any".to_string(),
            ArchFilter::OneOf(arches) => arches.join(", "),
        }
    }
}

pub fn is_multilib(arch: &str) -> bool {
    let Some(next) = fallback_of(arch) else {
        return false;
    };
    MULTILIB_ARCHES.contains(&arch) || MULTILIB_ARCHES.contains(&next)
}

/// Canonical base architecture of `arch`.
pub fn base_arch_of(arch: &str) -> String {
    let Some(next) = fallback_of(arch) else {
        return arch.to_string();
    };

    if is_multilib(arch) {
        return if MULTILIB_ARCHES.contains(&arch) {
            arch.to_string()
        } else {
            next.to_string()
        };
    }

    let mut base = arch;
    let mut next = next;
    while next != NOARCH {
        base = next;
        match fallback_of(base) {
            Some(n) => next = n,
            None => break,
        }
    }
    base.to_string()
}

/// Base architecture of the running host.
pub fn base_arch() -> String {
    base_arch_of(&canonical_arch())
}

/// Canonical architecture of the running host.
pub fn canonical_arch() -> String {
    canonicalize_arch(&system::machine(), &system::cpu_info())
}

/// Refines a `uname` machine name using `/proc/cpuinfo` contents.
pub fn canonicalize_arch(machine: &str, cpuinfo: &str) -> String {
    let bytes = machine.as_bytes();
    if bytes.len() == 4 && bytes[0] == b'i' && &bytes[2..] == b"86" {
        return canonical_x86(machine, cpuinfo);
    }
    if machine == "x86_64" {
        return canonical_x86_64(cpuinfo);
    }
    machine.to_string()
}

fn canonical_x86(arch: &str, cpuinfo: &str) -> String {
    match arch {
        "i586" => {
            let geode = cpuinfo
                .lines()
                .any(|l| l.starts_with("model name") && l.contains("Geode(TM)"));
            let canon = if geode { "geode" } else { arch };
            canon.to_string()
        }
        "i686" => {
            for line in cpuinfo.lines() {
                if line.starts_with("vendor") && line.contains("AuthenticAMD") {
                    return "athlon".to_string();
                }
                if line.starts_with("flags") && !line.contains("cmov") {
                    return "i586".to_string();
                }
            }
            arch.to_string()
        }
        _ => arch.to_string(),
    }
}

fn canonical_x86_64(cpuinfo: &str) -> String {
    let vendor = cpuinfo
        .lines()
        .find(|l| l.starts_with("vendor_id"))
        .and_then(|l| l.split(':').nth(1));

    let canon = match vendor {
        Some(v) if v.contains("AuthenticAMD") || v.contains("Authentic AMD") => "amd64",
        Some(v) if v.contains("GenuineIntel") => "ia32e",
        _ => "x86_64",
    };
    canon.to_string()
}

/// Minimal set of arches covering every arch in `observed`.
///
/// `src`, `noarch` and arches without a policy are ignored. An arch already
/// implied by a kept arch is dropped; a kept arch implied by a new one is
/// replaced by it.
pub fn supported_arches<I, S>(observed: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept: Vec<String> = Vec::new();

    for arch in observed {
        let arch = arch.as_ref();
        if arch == SRC_ARCH || arch == NOARCH {
            continue;
        }
        let Some(policy) = arch_policy(arch) else {
            continue;
        };

        let mut need_append = true;
        let mut j = 0;
        while j < kept.len() {
            let kept_policy = arch_policy(&kept[j]).unwrap_or_default();
            if kept_policy.contains(&arch) {
                need_append = false;
                break;
            }
            if policy.contains(&kept[j].as_str()) {
                if need_append {
                    kept[j] = arch.to_string();
                    need_append = false;
                } else {
                    kept.remove(j);
                    continue;
                }
            }
            j += 1;
        }
        if need_append {
            kept.push(arch.to_string());
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatible_arches_known_target() {
        assert_eq!(
            compatible_arches("i686"),
            vec!["i686", "i586", "i486", "i386", "noarch"]
        );
        assert_eq!(compatible_arches("aarch64"), vec!["aarch64", "noarch"]);
    }

    #[test]
    fn test_compatible_arches_unknown_target() {
        assert_eq!(compatible_arches("riscv64"), vec!["riscv64", "noarch"]);
    }

    #[test]
    fn test_compatible_arches_contain_target_and_end_with_noarch() {
        for (arch, _) in ARCH_POLICIES {
            let arches = compatible_arches(arch);
            assert!(arches.iter().any(|a| a == arch), "{arch}");
            assert_eq!(arches.last().map(String::as_str), Some(NOARCH), "{arch}");
        }
    }

    #[test]
    fn test_arch_filter() {
        assert_eq!(ArchFilter::for_target(None), ArchFilter::Any);
        assert!(ArchFilter::Any.matches("s390x"));

        let src = ArchFilter::for_target(Some("src"));
        assert_eq!(src.arches(), Some(["src".to_string()].as_slice()));
        assert!(!src.matches("noarch"));

        let x86 = ArchFilter::for_target(Some("x86_64"));
        assert!(x86.matches("i586"));
        assert!(x86.matches("noarch"));
        assert!(!x86.matches("aarch64"));
        assert_eq!(x86.describe(), "x86_64, i686, i586, i486, i386, noarch");
    }

    #[test]
    fn test_is_multilib() {
        assert!(is_multilib("x86_64"));
        assert!(is_multilib("amd64"));
        assert!(is_multilib("ia32e"));
        assert!(!is_multilib("i686"));
        assert!(!is_multilib("aarch64"));
    }

    #[test]
    fn test_base_arch_of() {
        assert_eq!(base_arch_of("x86_64"), "x86_64");
        assert_eq!(base_arch_of("amd64"), "x86_64");
        assert_eq!(base_arch_of("ia32e"), "x86_64");
        assert_eq!(base_arch_of("i686"), "i386");
        assert_eq!(base_arch_of("athlon"), "i386");
        assert_eq!(base_arch_of("armv7l"), "armv5tel");
        assert_eq!(base_arch_of("armv7tnhl"), "armv7hl");
        assert_eq!(base_arch_of("ia64"), "ia64");
        assert_eq!(base_arch_of("aarch64"), "aarch64");
    }

    #[test]
    fn test_canonicalize_arch() {
        let amd = "vendor_id\t: AuthenticAMD\nflags\t\t: fpu cmov\n";
        let intel = "vendor_id\t: GenuineIntel\nflags\t\t: fpu cmov\n";
        let no_cmov = "vendor_id\t: GenuineIntel\nflags\t\t: fpu vme\n";
        let geode = "model name\t: Geode(TM) Integrated Processor\n";

        assert_eq!(canonicalize_arch("i686", amd), "athlon");
        assert_eq!(canonicalize_arch("i686", intel), "i686");
        assert_eq!(canonicalize_arch("i686", no_cmov), "i586");
        assert_eq!(canonicalize_arch("i586", geode), "geode");
        assert_eq!(canonicalize_arch("i586", intel), "i586");
        assert_eq!(canonicalize_arch("x86_64", amd), "amd64");
        assert_eq!(canonicalize_arch("x86_64", intel), "ia32e");
        assert_eq!(canonicalize_arch("x86_64", ""), "x86_64");
        assert_eq!(canonicalize_arch("aarch64", intel), "aarch64");
    }

    #[test]
    fn test_supported_arches() {
        assert_eq!(
            supported_arches(["i586", "noarch", "i686", "src"]),
            vec!["i686"]
        );
        assert_eq!(supported_arches(["x86_64", "i686"]), vec!["x86_64"]);
        assert_eq!(
            supported_arches(["armv7hl", "aarch64", "riscv64"]),
            vec!["armv7hl", "aarch64"]
        );
        // x86_64 replaces i586 in place.
        assert_eq!(
            supported_arches(["i586", "aarch64", "armv7l", "x86_64"]),
            vec!["x86_64", "aarch64", "armv7l"]
        );
    }

    #[test]
    fn test_supported_arches_removes_second_implied_arch() {
        assert_eq!(
            supported_arches(["armv7nhl", "armv7thl", "armv7tnhl"]),
            vec!["armv7tnhl"]
        );
        assert_eq!(
            supported_arches(["armv5l", "i586", "armv5tel", "armv7l"]),
            vec!["armv7l", "i586"]
        );
    }
}
