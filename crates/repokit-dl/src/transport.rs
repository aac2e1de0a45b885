use std::path::PathBuf;

use crate::{
    download::Download,
    error::Result,
    http_client::HttpClient,
    types::{FetchRequest, ProgressCallback},
};

/// Retrieval seam between the metadata/package layers and the network.
///
/// Implementations must leave `req.dest` untouched on failure.
pub trait Transport: Send + Sync {
    fn fetch(&self, req: &FetchRequest) -> Result<PathBuf>;
}

/// [`Transport`] backed by [`HttpClient`]; also serves `file://` URLs.
pub struct HttpTransport {
    client: HttpClient,
    on_progress: Option<ProgressCallback>,
}

impl HttpTransport {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(HttpClient::default())
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, req: &FetchRequest) -> Result<PathBuf> {
        let mut dl = Download::new(&req.url, &req.dest).proxy(req.proxy.clone());

        if let Some(cb) = self.on_progress.clone() {
            let url = req.url.clone();
            dl = dl.progress(move |p| cb(&url, p));
        }

        dl.execute(&self.client)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::{Arc, Mutex},
    };

    use tempfile::tempdir;
    use url::Url;

    use super::*;
    use crate::types::Progress;

    #[test]
    fn test_http_transport_serves_file_urls() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a-1.0-1.1.noarch.rpm");
        fs::write(&src, b"rpm").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let transport = HttpTransport::default().with_progress(Arc::new(move |url, p| {
            sink.lock().unwrap().push((url.to_string(), p));
        }));

        let url = Url::from_file_path(&src).unwrap().to_string();
        let dest = dir.path().join("cache/repo/packages/a-1.0-1.1.noarch.rpm");
        let path = transport.fetch(&FetchRequest::new(&url, &dest)).unwrap();

        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"rpm");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(u, _)| u == &url));
        assert_eq!(seen[1].1, Progress::Complete { total: 3 });
    }
}
