//! Application layer for toolgate
//!
//! This crate contains the pending-operation registry, port definitions, and
//! the orchestration/invocation use cases. It depends only on the domain
//! layer.

pub mod pending;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use pending::{OperationOutcome, OperationSlot, PendingError, PendingOperations};
pub use ports::{
    audit_log::{AuditEvent, AuditLogger, NoAuditLogger},
    credential_handler::{AuthError, CredentialHandler},
    runtime::{PreparedInvocation, RuntimeError, ToolRuntime},
    session_store::{SessionStore, StoreError},
    tool_catalog::ToolCatalog,
};
pub use use_cases::authorize::{AuthOrchestrator, EnsureOutcome, HandlerRegistry};
pub use use_cases::invoke_tool::{
    DELETE_SESSION, InvocationRouter, InvokeError, LIST_SESSIONS, builtin_tool_descriptors,
};
