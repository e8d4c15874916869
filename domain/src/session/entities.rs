//! Session entities — the per-triple grant state machine
//!
//! State transitions:
//!
//! ```text
//! (no record) → Preparing → AwaitingExternal → Resolved
//!                   │               │              │
//!                   └── Failed ◄────┘              │ refresh unsupported
//!                                                  ▼
//!                                          AwaitingExternal (start over)
//! ```
//!
//! Invariant: at most one [`SessionRecord`] exists per [`SessionKey`] — the
//! store keys records by the triple, so a racing second `ensure` overwrites
//! fields on the same record rather than creating a sibling.

use crate::core::error::DomainError;
use crate::credential::value_objects::CredentialContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Separator used in storage keys. Thread comes first so that backends can
/// list a thread's sessions with a plain prefix scan.
const KEY_SEPARATOR: &str = "::";

/// Identity of a session: the (provider, thread, profile) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// External credential issuer (e.g. "slack")
    pub provider: String,
    /// Conversation-scoped routing key (not an OS thread)
    pub thread: String,
    /// Named identity within the thread
    pub profile: String,
}

impl SessionKey {
    pub fn new(
        provider: impl Into<String>,
        thread: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            thread: thread.into(),
            profile: profile.into(),
        }
    }

    /// Storage key, thread-first: `{thread}::{provider}::{profile}`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.thread,
            self.provider,
            self.profile,
            sep = KEY_SEPARATOR
        )
    }

    /// Prefix matching every storage key belonging to `thread`.
    pub fn thread_prefix(thread: &str) -> String {
        format!("{}{}", thread, KEY_SEPARATOR)
    }

    /// Parse a storage key produced by [`storage_key`](Self::storage_key).
    pub fn from_storage_key(key: &str) -> Result<Self, DomainError> {
        let mut parts = key.splitn(3, KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(thread), Some(provider), Some(profile)) if !profile.is_empty() => {
                Ok(Self::new(provider, thread, profile))
            }
            _ => Err(DomainError::MalformedStorageKey(key.to_string())),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.thread, self.profile)
    }
}

/// Where a grant flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// A request is being built; no external URL issued yet
    Preparing,
    /// An external URL was issued; waiting on the human and the callback
    AwaitingExternal,
    /// The credential is resolved and usable
    Resolved,
    /// The flow failed terminally (consent denied, exchange rejected)
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Preparing => "preparing",
            SessionState::AwaitingExternal => "awaiting_external",
            SessionState::Resolved => "resolved",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SessionState::Resolved)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable record of one grant flow.
///
/// Mutated in place as the flow advances (pending → resolved); the embedded
/// [`CredentialContext`] itself is immutable and replaced wholesale on
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub key: SessionKey,
    /// Scopes requested for the grant; authoritative once resolved
    pub scopes: BTreeSet<String>,
    /// Resolved credential, absent while the flow is still pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CredentialContext>,
    /// Pending-operation id while mid-flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_operation: Option<String>,
    /// True for scope-insensitive providers: any scope request hits this
    /// record once resolved
    pub scope_universal: bool,
    pub state: SessionState,
}

impl SessionRecord {
    /// Create a record for a freshly prepared flow.
    pub fn pending(
        key: SessionKey,
        scopes: impl IntoIterator<Item = impl Into<String>>,
        operation_id: impl Into<String>,
        scope_universal: bool,
    ) -> Self {
        Self {
            key,
            scopes: scopes.into_iter().map(Into::into).collect(),
            context: None,
            pending_operation: Some(operation_id.into()),
            scope_universal,
            state: SessionState::AwaitingExternal,
        }
    }

    /// Transition to Resolved with the authenticated context.
    pub fn resolve(&mut self, context: CredentialContext) {
        self.context = Some(context);
        self.pending_operation = None;
        self.state = SessionState::Resolved;
    }

    /// Transition to the terminal Failed state.
    pub fn fail(&mut self) {
        self.pending_operation = None;
        self.state = SessionState::Failed;
    }

    /// Re-enter AwaitingExternal for a start-over flow (refresh unsupported,
    /// scope widening, or a prior failure). The stale context is dropped.
    pub fn reopen(
        &mut self,
        scopes: impl IntoIterator<Item = impl Into<String>>,
        operation_id: impl Into<String>,
    ) {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self.context = None;
        self.pending_operation = Some(operation_id.into());
        self.state = SessionState::AwaitingExternal;
    }

    /// Cache-hit check: resolved, and either scope-insensitive or the
    /// requested scopes are a subset of what was granted.
    pub fn satisfies(&self, requested: &[String]) -> bool {
        if !self.state.is_resolved() || self.context.is_none() {
            return false;
        }
        self.scope_universal || requested.iter().all(|s| self.scopes.contains(s))
    }

    /// Token-free projection for session listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            provider: self.key.provider.clone(),
            thread: self.key.thread.clone(),
            profile: self.key.profile.clone(),
            state: self.state,
            scopes: self.scopes.iter().cloned().collect(),
            description: self
                .context
                .as_ref()
                .map(|c| c.description.clone())
                .unwrap_or_default(),
        }
    }
}

/// What session listings expose — never raw tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub provider: String,
    pub thread: String,
    pub profile: String,
    pub state: SessionState,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}
