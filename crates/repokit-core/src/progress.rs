use std::sync::Arc;

use repokit_dl::types::{Progress, ProgressCallback};
use repokit_events::{EventSinkHandle, RepoEvent};

/// Creates a repokit-dl progress callback that bridges to [`RepoEvent`] emissions.
///
/// The returned closure can be handed to `HttpTransport::with_progress`.
pub fn create_progress_bridge(events: EventSinkHandle) -> ProgressCallback {
    Arc::new(move |url, progress| {
        let url = url.to_string();
        let event = match progress {
            Progress::Starting {
                total,
            } => {
                RepoEvent::DownloadStarting {
                    url,
                    total,
                }
            }
            Progress::Chunk {
                current,
                total,
            } => {
                RepoEvent::DownloadProgress {
                    url,
                    current,
                    total,
                }
            }
            Progress::Complete {
                total,
            } => {
                RepoEvent::DownloadComplete {
                    url,
                    total,
                }
            }
        };
        events.emit(event);
    })
}

#[cfg(test)]
mod tests {
    use repokit_events::CollectorSink;

    use super::*;

    #[test]
    fn test_progress_bridge_maps_all_variants() {
        let collector = Arc::new(CollectorSink::default());
        let bridge = create_progress_bridge(collector.clone());

        bridge(
            "http://h/a.rpm",
            Progress::Starting {
                total: 1000,
            },
        );
        bridge(
            "http://h/a.rpm",
            Progress::Chunk {
                current: 750,
                total: 1000,
            },
        );
        bridge(
            "http://h/a.rpm",
            Progress::Complete {
                total: 1000,
            },
        );

        let events = collector.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            RepoEvent::DownloadStarting {
                url,
                total: 1000,
            } if url == "http://h/a.rpm"
        ));
        assert!(matches!(
            &events[1],
            RepoEvent::DownloadProgress {
                current: 750,
                total: 1000,
                ..
            }
        ));
        assert!(matches!(
            &events[2],
            RepoEvent::DownloadComplete {
                total: 1000,
                ..
            }
        ));
    }
}
