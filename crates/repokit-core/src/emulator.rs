//! Selection of a statically linked qemu user emulator for foreign-arch
//! chroots.

use std::path::{Path, PathBuf};

use repokit_utils::fs::is_statically_linked;
use tracing::debug;

use crate::error::EmulatorError;

type Candidates = &'static [(&'static str, bool)];

const AARCH64_EMULATORS: Candidates = &[
    ("qemu-arm64", true),
    ("qemu-aarch64", true),
    ("qemu-arm64-static", false),
    ("qemu-aarch64-static", false),
];
const MIPSEL_EMULATORS: Candidates = &[("qemu-mipsel", true), ("qemu-mipsel-static", false)];
const ARM_EMULATORS: Candidates = &[("qemu-arm", true), ("qemu-arm-static", false)];

/// Emulator binary names to try for `arch`, in order, and whether the binary
/// must be verified as statically linked. `*-static` names are trusted.
pub fn emulator_candidates(arch: &str) -> Candidates {
    match arch {
        "aarch64" => AARCH64_EMULATORS,
        "mipsel" => MIPSEL_EMULATORS,
        _ => ARM_EMULATORS,
    }
}

/// First usable emulator for `arch` in `bin_dir`.
pub fn find_static_emulator(arch: &str, bin_dir: &Path) -> Result<PathBuf, EmulatorError> {
    for (name, must_be_static) in emulator_candidates(arch) {
        let path = bin_dir.join(name);
        if !path.is_file() {
            continue;
        }
        if *must_be_static && !is_statically_linked(&path)? {
            debug!("{} is dynamically linked, skipping", path.display());
            continue;
        }
        return Ok(path);
    }

    Err(EmulatorError::NotFound {
        arch: arch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::testing::elf64;

    const PT_LOAD: u32 = 1;
    const PT_INTERP: u32 = 3;

    #[test]
    fn test_prefers_static_plain_binary() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("qemu-aarch64"), elf64(&[PT_LOAD])).unwrap();
        fs::write(dir.path().join("qemu-arm64-static"), elf64(&[PT_LOAD])).unwrap();

        assert_eq!(
            find_static_emulator("aarch64", dir.path()).unwrap(),
            dir.path().join("qemu-aarch64")
        );
    }

    #[test]
    fn test_skips_dynamic_binary() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("qemu-arm"), elf64(&[PT_INTERP, PT_LOAD])).unwrap();
        fs::write(dir.path().join("qemu-arm-static"), elf64(&[PT_LOAD])).unwrap();

        assert_eq!(
            find_static_emulator("armv7hl", dir.path()).unwrap(),
            dir.path().join("qemu-arm-static")
        );
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("qemu-mipsel"), elf64(&[PT_INTERP])).unwrap();

        assert!(matches!(
            find_static_emulator("mipsel", dir.path()),
            Err(EmulatorError::NotFound { ref arch }) if arch == "mipsel"
        ));
    }
}
