//! Host-facing event emission.
//!
//! The recorder reports decision outcomes to the host through the
//! [`EventRecorder`] seam. Emission is best-effort: failures are logged
//! and never fail the operation that triggered them.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event severity, mirroring the host's Normal/Warning split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Normal,
    Warning,
}

impl EventSeverity {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Normal => "normal",
            EventSeverity::Warning => "warning",
        }
    }
}

/// An event handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub severity: EventSeverity,
    /// Machine-readable reason, e.g. `DecisionRecorded`.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    pub at: DateTime<Utc>,
}

impl EmittedEvent {
    /// Create an event stamped now.
    pub fn new(
        severity: EventSeverity,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            reason: reason.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Injected event sink.
pub trait EventRecorder: Send + Sync {
    fn emit(&self, event: &EmittedEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Event recorder that writes structured log records.
#[derive(Debug, Default)]
pub struct LogEventRecorder;

impl EventRecorder for LogEventRecorder {
    fn emit(&self, event: &EmittedEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match event.severity {
            EventSeverity::Normal => {
                tracing::info!(reason = %event.reason, "{}", event.message);
            }
            EventSeverity::Warning => {
                tracing::warn!(reason = %event.reason, "{}", event.message);
            }
        }
        Ok(())
    }
}

/// In-memory event recorder for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct MemoryEventRecorder {
    events: Mutex<Vec<EmittedEvent>>,
}

impl MemoryEventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<EmittedEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventRecorder for MemoryEventRecorder {
    fn emit(&self, event: &EmittedEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_recorder_collects() {
        let recorder = MemoryEventRecorder::new();
        recorder
            .emit(&EmittedEvent::new(
                EventSeverity::Normal,
                "DecisionRecorded",
                "decision d-1 recorded",
            ))
            .unwrap();
        recorder
            .emit(&EmittedEvent::new(
                EventSeverity::Warning,
                "DecisionError",
                "decision d-2 failed",
            ))
            .unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, EventSeverity::Normal);
        assert_eq!(events[1].reason, "DecisionError");
    }
}
