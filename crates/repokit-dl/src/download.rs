use std::{
    fs::{self, File},
    io::{self, Read as _, Write as _},
    path::PathBuf,
};

use tempfile::NamedTempFile;
use tracing::debug;
use ureq::{
    http::{header::CONTENT_LENGTH, Response},
    Body,
};
use url::Url;

use crate::{
    error::{DownloadError, Result},
    http_client::HttpClient,
    types::Progress,
};

/// A single download into a fixed destination path.
///
/// Data is written to a temporary file in the destination directory and renamed
/// into place, so the destination is either absent or complete.
pub struct Download {
    pub url: String,
    pub output: PathBuf,
    pub proxy: Option<String>,
    pub on_progress: Option<Box<dyn Fn(Progress) + Send + Sync>>,
}

impl Download {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            proxy: None,
            on_progress: None,
        }
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Registers a progress callback.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use repokit_dl::download::Download;
    /// use repokit_dl::types::Progress;
    ///
    /// let _dl = Download::new("https://example.com/a.rpm", "/tmp/a.rpm")
    ///     .progress(|event: Progress| {
    ///         if let Progress::Complete { total } = event {
    ///             eprintln!("complete, total={total}");
    ///         }
    ///     });
    /// ```
    pub fn progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    fn emit(&self, progress: Progress) {
        if let Some(ref cb) = self.on_progress {
            cb(progress);
        }
    }

    /// Performs the download and returns the destination path.
    pub fn execute(self, client: &HttpClient) -> Result<PathBuf> {
        let parsed = Url::parse(&self.url).map_err(|err| {
            DownloadError::InvalidUrl {
                url: self.url.clone(),
                source: err,
            }
        })?;

        let parent = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut raw = NamedTempFile::new_in(&parent)?;
        match parsed.scheme() {
            "http" | "https" => self.fetch_http(client, raw.as_file_mut())?,
            "file" => self.fetch_local(&parsed, raw.as_file_mut())?,
            scheme => {
                return Err(DownloadError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    url: self.url.clone(),
                });
            }
        }

        raw.persist(&self.output).map_err(|err| err.error)?;

        debug!("fetched {} -> {}", self.url, self.output.display());
        Ok(self.output)
    }

    fn fetch_local(&self, url: &Url, file: &mut File) -> Result<()> {
        let not_found = || {
            DownloadError::NotFound {
                url: self.url.clone(),
            }
        };
        let src = url.to_file_path().map_err(|_| not_found())?;
        let mut reader = match File::open(&src) {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(err.into()),
        };
        let total = reader.metadata().map(|m| m.len()).unwrap_or(0);

        self.emit(Progress::Starting { total });
        let copied = io::copy(&mut reader, file)?;
        self.emit(Progress::Complete { total: copied });
        Ok(())
    }

    fn fetch_http(&self, client: &HttpClient, file: &mut File) -> Result<()> {
        let resp = client
            .get(&self.url, self.proxy.as_deref())?
            .call()
            .map_err(|err| DownloadError::from_ureq(&self.url, err))?;

        let total = content_length(&resp);
        self.emit(Progress::Starting { total });

        let mut reader = resp.into_body().into_reader();
        let mut buffer = [0u8; 8192];
        let mut downloaded = 0u64;

        loop {
            let n = reader.read(&mut buffer).map_err(|err| {
                if err.kind() == io::ErrorKind::TimedOut {
                    DownloadError::Timeout {
                        url: self.url.clone(),
                    }
                } else {
                    DownloadError::Io(err)
                }
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            downloaded += n as u64;
            self.emit(Progress::Chunk {
                current: downloaded,
                total,
            });
        }
        file.flush()?;

        self.emit(Progress::Complete { total: downloaded });
        Ok(())
    }
}

fn content_length(resp: &Response<Body>) -> u64 {
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|len| len.parse::<u64>().ok())
        .unwrap_or(0)
}
