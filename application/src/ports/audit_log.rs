//! Audit logger port
//!
//! Auth transitions and invocations are auditable events. Implementations
//! must never be handed raw token material — callers build payloads from
//! summaries only.

/// A single audit event: a type tag plus a JSON payload.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Port for audit logging
///
/// Logging must never fail the operation being logged, so `log` is
/// infallible; adapters swallow and warn on their own I/O errors.
pub trait AuditLogger: Send + Sync {
    fn log(&self, event: AuditEvent);
}

/// No-op audit logger for tests and minimal deployments.
#[derive(Debug, Clone, Default)]
pub struct NoAuditLogger;

impl AuditLogger for NoAuditLogger {
    fn log(&self, _event: AuditEvent) {}
}
