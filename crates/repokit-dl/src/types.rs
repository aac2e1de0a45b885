use std::{path::PathBuf, sync::Arc};

/// Download progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Starting { total: u64 },
    Chunk { current: u64, total: u64 },
    Complete { total: u64 },
}

/// Progress callback shared across downloads. Receives the source URL.
pub type ProgressCallback = Arc<dyn Fn(&str, Progress) + Send + Sync>;

/// A single fetch handed to a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Final location of the downloaded file.
    pub dest: PathBuf,
    pub proxy: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            proxy: None,
        }
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}
