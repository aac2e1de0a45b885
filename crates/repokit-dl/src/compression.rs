use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{DownloadError, Result};

/// Compression wrappers used for repository metadata artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Zstd,
}

impl Compression {
    /// Detect compression from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                match ext.to_ascii_lowercase().as_str() {
                    "gz" => Compression::Gzip,
                    "bz2" => Compression::Bzip2,
                    "zst" => Compression::Zstd,
                    _ => Compression::None,
                }
            })
            .unwrap_or_default()
    }

    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }
}

/// `primary.xml.gz` -> `primary.xml`. Names without a known suffix are unchanged.
pub fn strip_compression_suffix(name: &str) -> &str {
    for suffix in [".gz", ".bz2", ".zst"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

/// Same as [`strip_compression_suffix`] for the file name of a path.
pub fn decompressed_path(path: &Path) -> PathBuf {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => path.with_file_name(strip_compression_suffix(name)),
        None => path.to_path_buf(),
    }
}

/// Streams `src` through the decoder for `compression` into `writer`.
pub fn decompress_into<W: Write>(
    src: &Path,
    compression: Compression,
    writer: &mut W,
) -> io::Result<u64> {
    debug!("decompressing {} ({:?})", src.display(), compression);
    let file = BufReader::new(File::open(src)?);
    let mut reader = compression.wrap_reader(file)?;
    io::copy(&mut reader, writer)
}

/// Decompresses `src` next to itself, dropping its compression suffix, and
/// returns the new path. The result is written through a temporary file, so
/// it is either absent or complete.
pub fn unpack_file(src: &Path) -> Result<PathBuf> {
    let dest = decompressed_path(src);
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut out = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(out.as_file_mut());
        decompress_into(src, Compression::from_path(src), &mut writer).map_err(|err| {
            DownloadError::Decompress {
                path: src.to_path_buf(),
                source: err,
            }
        })?;
        writer.flush()?;
    }
    out.persist(&dest).map_err(|err| err.error)?;
    Ok(dest)
}
