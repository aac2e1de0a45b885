use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const PT_INTERP: u32 = 3;

/// Removes the specified file or directory. A missing path is not an error.
///
/// # Errors
///
/// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
/// the path not existing.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source: err,
        }
    })
}

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Copies `src` into `dest_dir`, keeping its file name. Returns the new path.
pub fn copy_into<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dest_dir: Q) -> FileSystemResult<PathBuf> {
    let src = src.as_ref();
    let dest_dir = dest_dir.as_ref();
    ensure_dir_exists(dest_dir)?;

    let Some(file_name) = src.file_name() else {
        return Err(FileSystemError::File {
            path: src.to_path_buf(),
            action: "copy",
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        });
    };
    let dest = dest_dir.join(file_name);

    fs::copy(src, &dest).map_err(|err| {
        FileSystemError::File {
            path: src.to_path_buf(),
            action: "copy",
            source: err,
        }
    })?;
    Ok(dest)
}

/// Lists regular files directly under `dir` whose names end with `suffix`.
/// A missing directory yields an empty list.
pub fn files_with_suffix<P: AsRef<Path>>(dir: P, suffix: &str) -> FileSystemResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|err| {
        FileSystemError::Directory {
            path: dir.to_path_buf(),
            action: "read",
            source: err,
        }
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Checks whether the file starts with the ELF magic bytes.
pub fn is_elf<P: AsRef<Path>>(path: P) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .is_ok()
        && magic == ELF_MAGIC
}

/// Returns `true` for an ELF executable without a `PT_INTERP` program header,
/// i.e. one that does not need a dynamic loader. Non-ELF files return `false`.
pub fn is_statically_linked<P: AsRef<Path>>(path: P) -> FileSystemResult<bool> {
    let path = path.as_ref();
    let read_err = |err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "read",
            source: err,
        }
    };

    let mut file = File::open(path).map_err(read_err)?;
    let mut ident = [0u8; 64];
    let n = file.read(&mut ident).map_err(read_err)?;
    if n < 52 || ident[..4] != ELF_MAGIC {
        return Ok(false);
    }

    let is_64 = ident[4] == 2;
    let little_endian = ident[5] != 2;
    let u16_at = |off: usize| {
        let b = [ident[off], ident[off + 1]];
        if little_endian {
            u16::from_le_bytes(b)
        } else {
            u16::from_be_bytes(b)
        }
    };
    let u32_from = |b: [u8; 4]| {
        if little_endian {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        }
    };

    let (phoff, phentsize, phnum) = if is_64 {
        if n < 64 {
            return Ok(false);
        }
        let mut b = [0u8; 8];
        b.copy_from_slice(&ident[0x20..0x28]);
        let phoff = if little_endian {
            u64::from_le_bytes(b)
        } else {
            u64::from_be_bytes(b)
        };
        (phoff, u16_at(0x36), u16_at(0x38))
    } else {
        let mut b = [0u8; 4];
        b.copy_from_slice(&ident[0x1c..0x20]);
        (u32_from(b) as u64, u16_at(0x2a), u16_at(0x2c))
    };

    for i in 0..phnum as u64 {
        file.seek(SeekFrom::Start(phoff + i * phentsize as u64))
            .map_err(read_err)?;
        let mut p_type = [0u8; 4];
        file.read_exact(&mut p_type).map_err(read_err)?;
        if u32_from(p_type) == PT_INTERP {
            return Ok(false);
        }
    }

    Ok(true)
}
