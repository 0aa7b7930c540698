//! Analytics event delivery.
//!
//! Event logging never interrupts learning: [`EventLogger`] reports sink
//! failures through `tracing` and carries on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storage::repository::{EventLogRepository, StorageError};
use tutor_core::model::InteractionEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the event could not be recorded.
    async fn log_event(&self, event: &InteractionEvent) -> Result<(), StorageError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn log_event(&self, _event: &InteractionEvent) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Keeps events in memory so tests can assert on them.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<InteractionEvent>>>,
}

impl RecordingEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    #[must_use]
    pub fn events(&self) -> Vec<InteractionEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn log_event(&self, event: &InteractionEvent) -> Result<(), StorageError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.push(event.clone());
        Ok(())
    }
}

/// Appends events to an [`EventLogRepository`].
#[derive(Clone)]
pub struct RepositoryEventSink {
    repo: Arc<dyn EventLogRepository>,
}

impl RepositoryEventSink {
    #[must_use]
    pub fn new(repo: Arc<dyn EventLogRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl EventSink for RepositoryEventSink {
    async fn log_event(&self, event: &InteractionEvent) -> Result<(), StorageError> {
        self.repo.append_event(event).await.map(|_| ())
    }
}

/// Best-effort front for an [`EventSink`].
#[derive(Clone)]
pub struct EventLogger {
    sink: Arc<dyn EventSink>,
}

impl EventLogger {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopEventSink))
    }

    pub async fn log(&self, event: InteractionEvent) {
        let kind = event.kind().as_str();
        match self.sink.log_event(&event).await {
            Ok(()) => tracing::trace!(kind, session_id = %event.session_id, "event logged"),
            Err(err) => tracing::warn!(
                kind,
                session_id = %event.session_id,
                error = %err,
                "failed to log interaction event"
            ),
        }
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::model::{EventPayload, SessionId};
    use tutor_core::time::fixed_now;

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn log_event(&self, _event: &InteractionEvent) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    fn viewed() -> InteractionEvent {
        InteractionEvent::new(
            SessionId::generate(),
            None,
            fixed_now(),
            EventPayload::ContentViewed {
                node_id: "A".into(),
            },
        )
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let logger = EventLogger::new(Arc::new(FailingSink));
        logger.log(viewed()).await;
    }

    #[tokio::test]
    async fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        let logger = EventLogger::new(Arc::new(sink.clone()));
        let first = viewed();
        let second = viewed();
        logger.log(first.clone()).await;
        logger.log(second.clone()).await;
        assert_eq!(sink.events(), vec![first, second]);
    }
}
