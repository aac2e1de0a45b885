mod event;
mod sink;

use std::sync::Arc;

pub use event::*;
pub use sink::*;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;

/// Emits a `Log` event through a shared handle.
pub fn emit_log(sink: &EventSinkHandle, level: LogLevel, message: impl Into<String>) {
    sink.emit(RepoEvent::Log {
        level,
        message: message.into(),
    });
}
