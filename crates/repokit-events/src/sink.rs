use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex,
};

use crate::{LogLevel, RepoEvent};

/// Trait for consuming events.
///
/// Each frontend provides its own implementation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RepoEvent);

    fn log(&self, level: LogLevel, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.emit(RepoEvent::Log {
            level,
            message: message.into(),
        });
    }
}

/// Channel-based event sink.
///
/// Sends events through a standard mpsc channel. The receiver end
/// can be polled by any consumer.
pub struct ChannelSink {
    sender: Sender<RepoEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<RepoEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RepoEvent) {
        let _ = self.sender.send(event);
    }
}

/// No-op event sink for tests or headless operation.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RepoEvent) {}
}

/// Collector sink that stores all events for inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<RepoEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<RepoEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages of all `Log` events at `level`.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| {
                match event {
                    RepoEvent::Log {
                        level: l,
                        message,
                    } if l == level => Some(message),
                    _ => None,
                }
            })
            .collect()
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: RepoEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
