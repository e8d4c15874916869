//! Audit logging adapters

pub mod jsonl;

pub use jsonl::JsonlAuditLogger;
