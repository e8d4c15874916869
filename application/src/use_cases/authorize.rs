//! Auth Orchestrator — drives credential handlers against the registry and
//! the session store
//!
//! One state machine per (provider, thread, profile) triple:
//!
//! ```text
//! ensure (miss) ──► prepare ──► AwaitingExternal ──► finish ──► Resolved
//!                                                                  │
//! ensure (hit, fresh) ◄────────────────────────────────────────────┤
//! ensure (hit, expired) ──► refresh ──► Resolved (new context)     │
//!                              └─ unsupported ──► start over ◄─────┘
//! ```
//!
//! Two `ensure` calls racing on the same triple are deliberately not
//! single-flighted: each prepares independently and the human may receive
//! two URLs. The record tracks the latest operation id and the store's
//! atomic per-key `put` makes the transition to Resolved meaningful once.

use crate::pending::PendingOperations;
use crate::ports::audit_log::{AuditEvent, AuditLogger, NoAuditLogger};
use crate::ports::credential_handler::{AuthError, CredentialHandler};
use crate::ports::session_store::SessionStore;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use toolgate_domain::{CredentialContext, SessionKey, SessionRecord, SessionSummary};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Explicit registration table mapping provider names to handlers.
///
/// Built once at startup from configuration — providers are never discovered
/// by scanning, only by registration.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CredentialHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its provider name (builder pattern).
    pub fn register(mut self, handler: Arc<dyn CredentialHandler>) -> Self {
        self.handlers.insert(handler.provider().to_string(), handler);
        self
    }

    pub fn get(&self, provider: &str) -> Option<&Arc<dyn CredentialHandler>> {
        self.handlers.get(provider)
    }

    pub fn providers(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Result of an `ensure` call: either a usable credential or an interrupt.
#[derive(Debug, Clone)]
pub enum EnsureOutcome {
    /// Cache hit (or successful refresh) — the credential is usable now
    Ready(CredentialContext),
    /// A flow was prepared; the instructions embed the external URL
    Pending { instructions: String },
}

impl EnsureOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, EnsureOutcome::Ready(_))
    }
}

/// Orchestrates grant flows: session lookup, preparation, finalization, and
/// the administrative operations exposed to the agent as self-service tools.
pub struct AuthOrchestrator {
    registry: HandlerRegistry,
    store: Arc<dyn SessionStore>,
    pending: Arc<PendingOperations>,
    audit: Arc<dyn AuditLogger>,
}

impl AuthOrchestrator {
    pub fn new(
        registry: HandlerRegistry,
        store: Arc<dyn SessionStore>,
        pending: Arc<PendingOperations>,
    ) -> Self {
        Self {
            registry,
            store,
            pending,
            audit: Arc::new(NoAuditLogger),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// The registry of pending operations this orchestrator resolves
    /// against. Shared with the HTTP callback surface.
    pub fn pending(&self) -> &Arc<PendingOperations> {
        &self.pending
    }

    /// Make sure a usable credential exists for the triple, or start a flow.
    ///
    /// Cache hit: record is Resolved, scopes are satisfied (always true for
    /// scope-insensitive providers), and the context is not expired. An
    /// expired context is refreshed in place when the grant supports it;
    /// otherwise the flow starts over.
    pub async fn ensure(
        &self,
        provider: &str,
        thread: &str,
        profile: &str,
        scopes: &[String],
    ) -> Result<EnsureOutcome, AuthError> {
        let handler = self
            .registry
            .get(provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;
        let key = SessionKey::new(provider, thread, profile);
        let record = self.store.get(&key).await?;

        if let Some(existing) = &record
            && existing.satisfies(scopes)
            && let Some(context) = &existing.context
        {
            if !context.is_expired(Utc::now()) {
                debug!("Auth: cache hit for {}", key);
                return Ok(EnsureOutcome::Ready(context.clone()));
            }

            let request = handler.build_request(&existing.scopes.iter().cloned().collect::<Vec<_>>());
            match handler.refresh(&request, context).await {
                Ok(refreshed) => {
                    info!("Auth: refreshed credential for {}", key);
                    let mut updated = existing.clone();
                    updated.resolve(refreshed.clone());
                    self.store.put(updated).await?;
                    self.audit.log(AuditEvent::new(
                        "auth_refreshed",
                        json!({"provider": provider, "thread": thread, "profile": profile}),
                    ));
                    return Ok(EnsureOutcome::Ready(refreshed));
                }
                Err(e) if e.is_refresh_fallback() => {
                    debug!("Auth: refresh unavailable for {} ({}), starting over", key, e);
                }
                Err(e) => return Err(e),
            }
        }

        // Miss, widened scopes, expired-without-refresh, or a prior failure:
        // prepare a fresh flow. Requested scopes are widened with whatever
        // the record already tracked so a later grant covers both.
        let mut requested: Vec<String> = scopes.to_vec();
        if let Some(existing) = &record {
            for scope in &existing.scopes {
                if !requested.contains(scope) {
                    requested.push(scope.clone());
                }
            }
        }

        let operation_id = Uuid::new_v4().to_string();
        let request = handler.build_request(&requested);
        let instructions = handler
            .prepare(&request, thread, profile, &operation_id)
            .await?;

        let updated = match record {
            Some(mut existing) => {
                existing.reopen(requested.clone(), operation_id.clone());
                existing
            }
            None => SessionRecord::pending(
                key.clone(),
                requested.clone(),
                operation_id.clone(),
                !handler.scope_sensitive(),
            ),
        };
        self.store.put(updated).await?;

        info!("Auth: flow prepared for {} (operation {})", key, operation_id);
        self.audit.log(AuditEvent::new(
            "auth_prepared",
            json!({
                "provider": provider,
                "thread": thread,
                "profile": profile,
                "operation_id": operation_id,
                "scopes": requested,
            }),
        ));

        Ok(EnsureOutcome::Pending { instructions })
    }

    /// Finalize a flow started by [`ensure`](Self::ensure): await the
    /// callback, store the resolved context, clear the pending id.
    pub async fn finish(
        &self,
        provider: &str,
        thread: &str,
        profile: &str,
    ) -> Result<CredentialContext, AuthError> {
        let handler = self
            .registry
            .get(provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;
        let key = SessionKey::new(provider, thread, profile);
        let mut record = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| AuthError::NoSession(key.to_string()))?;
        let operation_id = record
            .pending_operation
            .clone()
            .ok_or_else(|| AuthError::NoPendingFlow(key.to_string()))?;

        let request = handler.build_request(&record.scopes.iter().cloned().collect::<Vec<_>>());
        let result = handler.authenticate(&request, &operation_id).await;
        self.pending.remove(&operation_id);

        match result {
            Ok(context) => {
                record.resolve(context.clone());
                self.store.put(record).await?;
                info!("Auth: flow finished for {}", key);
                self.audit.log(AuditEvent::new(
                    "auth_resolved",
                    json!({"provider": provider, "thread": thread, "profile": profile}),
                ));
                Ok(context)
            }
            Err(e) => {
                warn!("Auth: flow failed for {}: {}", key, e);
                record.fail();
                self.store.put(record).await?;
                self.audit.log(AuditEvent::new(
                    "auth_failed",
                    json!({
                        "provider": provider,
                        "thread": thread,
                        "profile": profile,
                        "reason": e.to_string(),
                    }),
                ));
                Err(e)
            }
        }
    }

    /// Token-free summaries of every session on a thread.
    pub async fn list_for_thread(&self, thread: &str) -> Result<Vec<SessionSummary>, AuthError> {
        let records = self.store.list_thread(thread).await?;
        Ok(records.iter().map(SessionRecord::summary).collect())
    }

    /// Revoke the session for a triple. Returns whether one existed.
    pub async fn delete(
        &self,
        provider: &str,
        thread: &str,
        profile: &str,
    ) -> Result<bool, AuthError> {
        let key = SessionKey::new(provider, thread, profile);
        let deleted = self.store.delete(&key).await?;
        if deleted {
            info!("Auth: deleted session for {}", key);
            self.audit.log(AuditEvent::new(
                "session_deleted",
                json!({"provider": provider, "thread": thread, "profile": profile}),
            ));
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::OperationOutcome;
    use crate::ports::credential_handler::AuthError;
    use crate::ports::session_store::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolgate_domain::{CredentialRequest, GrantKind, SessionState};

    /// In-memory store for orchestrator tests.
    #[derive(Default)]
    struct MapStore {
        records: tokio::sync::RwLock<HashMap<String, SessionRecord>>,
    }

    #[async_trait]
    impl SessionStore for MapStore {
        async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
            Ok(self.records.read().await.get(&key.storage_key()).cloned())
        }

        async fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
            self.records
                .write()
                .await
                .insert(record.key.storage_key(), record);
            Ok(())
        }

        async fn delete(&self, key: &SessionKey) -> Result<bool, StoreError> {
            Ok(self.records.write().await.remove(&key.storage_key()).is_some())
        }

        async fn list_thread(&self, thread: &str) -> Result<Vec<SessionRecord>, StoreError> {
            let prefix = SessionKey::thread_prefix(thread);
            Ok(self
                .records
                .read()
                .await
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .map(|(_, v)| v.clone())
                .collect())
        }
    }

    /// Handler that issues fake URLs and wraps callback values verbatim.
    struct FakeHandler {
        provider: String,
        grant: GrantKind,
        scope_sensitive: bool,
        pending: Arc<PendingOperations>,
        prepare_calls: AtomicUsize,
        refresh_token: Option<String>,
    }

    impl FakeHandler {
        fn token(provider: &str, pending: &Arc<PendingOperations>) -> Self {
            Self {
                provider: provider.to_string(),
                grant: GrantKind::BearerToken,
                scope_sensitive: false,
                pending: Arc::clone(pending),
                prepare_calls: AtomicUsize::new(0),
                refresh_token: None,
            }
        }

        fn oauth(provider: &str, pending: &Arc<PendingOperations>) -> Self {
            Self {
                provider: provider.to_string(),
                grant: GrantKind::AuthorizationCode,
                scope_sensitive: true,
                pending: Arc::clone(pending),
                prepare_calls: AtomicUsize::new(0),
                refresh_token: Some("refreshed-token".to_string()),
            }
        }
    }

    #[async_trait]
    impl CredentialHandler for FakeHandler {
        fn provider(&self) -> &str {
            &self.provider
        }

        fn grant(&self) -> GrantKind {
            self.grant
        }

        fn scope_sensitive(&self) -> bool {
            self.scope_sensitive
        }

        fn build_request(&self, scopes: &[String]) -> CredentialRequest {
            CredentialRequest::new(&self.provider, self.grant, "FAKE_TOKEN")
                .with_scopes(scopes.iter().cloned())
        }

        async fn prepare(
            &self,
            _request: &CredentialRequest,
            thread: &str,
            profile: &str,
            operation_id: &str,
        ) -> Result<String, AuthError> {
            self.prepare_calls.fetch_add(1, Ordering::SeqCst);
            let mut meta = HashMap::new();
            meta.insert("thread".to_string(), thread.to_string());
            meta.insert("profile".to_string(), profile.to_string());
            self.pending.create(operation_id, meta);
            Ok(format!(
                "To use {}, authenticate at: https://auth.example/{}?state={}",
                self.provider, self.provider, operation_id
            ))
        }

        async fn authenticate(
            &self,
            _request: &CredentialRequest,
            operation_id: &str,
        ) -> Result<CredentialContext, AuthError> {
            let slot = self
                .pending
                .get(operation_id)
                .ok_or_else(|| crate::pending::PendingError::NotFound(operation_id.into()))?;
            let value = slot.wait().await.into_result().map_err(AuthError::External)?;
            let token = value.as_str().unwrap_or_default().to_string();
            Ok(CredentialContext::new(&self.provider, token, "FAKE_TOKEN"))
        }

        async fn refresh(
            &self,
            _request: &CredentialRequest,
            _context: &CredentialContext,
        ) -> Result<CredentialContext, AuthError> {
            match &self.refresh_token {
                Some(token) => Ok(CredentialContext::new(&self.provider, token, "FAKE_TOKEN")),
                None => Err(AuthError::RefreshUnsupported(self.grant)),
            }
        }
    }

    fn orchestrator_with(
        handler: FakeHandler,
        pending: Arc<PendingOperations>,
    ) -> AuthOrchestrator {
        let registry = HandlerRegistry::new().register(Arc::new(handler));
        AuthOrchestrator::new(registry, Arc::new(MapStore::default()), pending)
    }

    #[tokio::test]
    async fn test_scope_insensitive_flow_and_cache_hit() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::token("github-token", &pending), Arc::clone(&pending));

        // First ensure: interrupted with a URL
        let outcome = orchestrator
            .ensure("github-token", "t1", "default", &[])
            .await
            .unwrap();
        let instructions = match outcome {
            EnsureOutcome::Pending { instructions } => instructions,
            other => panic!("expected pending, got {:?}", other),
        };
        assert!(instructions.contains("authenticate at: https://"));

        // Simulate the human completing the flow
        let operation_id = instructions.rsplit("state=").next().unwrap().to_string();
        pending
            .resolve(&operation_id, OperationOutcome::Delivered(serde_json::json!("abc")))
            .unwrap();

        let context = orchestrator.finish("github-token", "t1", "default").await.unwrap();
        assert_eq!(context.access_token, "abc");

        // Second ensure with different (ignored) scopes: cache hit, no URL
        let outcome = orchestrator
            .ensure("github-token", "t1", "default", &["repo:read".to_string()])
            .await
            .unwrap();
        assert!(outcome.is_ready());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_scope_sensitive_widening_prepares_again() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::oauth("slack", &pending), Arc::clone(&pending));

        let outcome = orchestrator
            .ensure("slack", "t1", "default", &["chat:write".to_string()])
            .await
            .unwrap();
        let instructions = match outcome {
            EnsureOutcome::Pending { instructions } => instructions,
            other => panic!("expected pending, got {:?}", other),
        };
        let operation_id = instructions.rsplit("state=").next().unwrap().to_string();
        pending
            .resolve(&operation_id, OperationOutcome::Delivered(serde_json::json!("code-1")))
            .unwrap();
        orchestrator.finish("slack", "t1", "default").await.unwrap();

        // Subset of the granted scopes: cache hit
        let outcome = orchestrator
            .ensure("slack", "t1", "default", &["chat:write".to_string()])
            .await
            .unwrap();
        assert!(outcome.is_ready());

        // A scope outside the grant restarts the flow
        let outcome = orchestrator
            .ensure("slack", "t1", "default", &["files:read".to_string()])
            .await
            .unwrap();
        assert!(!outcome.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_ensure_keeps_one_record() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator = Arc::new(orchestrator_with(
            FakeHandler::oauth("slack", &pending),
            Arc::clone(&pending),
        ));

        let a = Arc::clone(&orchestrator);
        let b = Arc::clone(&orchestrator);
        let scopes = vec!["chat:write".to_string()];
        let (ra, rb) = tokio::join!(
            a.ensure("slack", "t1", "default", &scopes),
            b.ensure("slack", "t1", "default", &scopes),
        );
        assert!(!ra.unwrap().is_ready());
        assert!(!rb.unwrap().is_ready());

        // Both races prepared, but the triple still maps to exactly one record
        let summaries = orchestrator.list_for_thread("t1").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].state, SessionState::AwaitingExternal);
    }

    #[tokio::test]
    async fn test_finish_without_session() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::token("github-token", &pending), Arc::clone(&pending));

        let result = orchestrator.finish("github-token", "t1", "default").await;
        assert!(matches!(result, Err(AuthError::NoSession(_))));
    }

    #[tokio::test]
    async fn test_denied_consent_fails_record() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::oauth("slack", &pending), Arc::clone(&pending));

        let instructions = match orchestrator
            .ensure("slack", "t1", "default", &[])
            .await
            .unwrap()
        {
            EnsureOutcome::Pending { instructions } => instructions,
            other => panic!("expected pending, got {:?}", other),
        };
        let operation_id = instructions.rsplit("state=").next().unwrap().to_string();
        pending
            .resolve(&operation_id, OperationOutcome::Failed("access_denied".into()))
            .unwrap();

        let result = orchestrator.finish("slack", "t1", "default").await;
        assert!(matches!(result, Err(AuthError::External(_))));

        let summaries = orchestrator.list_for_thread("t1").await.unwrap();
        assert_eq!(summaries[0].state, SessionState::Failed);
    }

    #[tokio::test]
    async fn test_expired_with_refresh_replaces_context() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::oauth("slack", &pending), Arc::clone(&pending));

        let instructions = match orchestrator
            .ensure("slack", "t1", "default", &[])
            .await
            .unwrap()
        {
            EnsureOutcome::Pending { instructions } => instructions,
            other => panic!("expected pending, got {:?}", other),
        };
        let operation_id = instructions.rsplit("state=").next().unwrap().to_string();
        pending
            .resolve(&operation_id, OperationOutcome::Delivered(serde_json::json!("code-1")))
            .unwrap();
        orchestrator.finish("slack", "t1", "default").await.unwrap();

        // Expire the stored context by hand
        let key = SessionKey::new("slack", "t1", "default");
        let mut record = orchestrator.store.get(&key).await.unwrap().unwrap();
        let expired = record.context.clone().unwrap().with_expires_at(
            Utc::now() - chrono::Duration::minutes(5),
        );
        record.resolve(expired);
        orchestrator.store.put(record).await.unwrap();

        let outcome = orchestrator.ensure("slack", "t1", "default", &[]).await.unwrap();
        match outcome {
            EnsureOutcome::Ready(context) => assert_eq!(context.access_token, "refreshed-token"),
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_without_refresh_starts_over() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::token("github-token", &pending), Arc::clone(&pending));

        let instructions = match orchestrator
            .ensure("github-token", "t1", "default", &[])
            .await
            .unwrap()
        {
            EnsureOutcome::Pending { instructions } => instructions,
            other => panic!("expected pending, got {:?}", other),
        };
        let operation_id = instructions.rsplit("state=").next().unwrap().to_string();
        pending
            .resolve(&operation_id, OperationOutcome::Delivered(serde_json::json!("tok")))
            .unwrap();
        orchestrator.finish("github-token", "t1", "default").await.unwrap();

        let key = SessionKey::new("github-token", "t1", "default");
        let mut record = orchestrator.store.get(&key).await.unwrap().unwrap();
        let expired = record.context.clone().unwrap().with_expires_at(
            Utc::now() - chrono::Duration::minutes(5),
        );
        record.resolve(expired);
        orchestrator.store.put(record).await.unwrap();

        // Bearer tokens have no refresh step: the flow starts over
        let outcome = orchestrator.ensure("github-token", "t1", "default", &[]).await.unwrap();
        assert!(!outcome.is_ready());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::token("github-token", &pending), Arc::clone(&pending));

        orchestrator.ensure("github-token", "t1", "default", &[]).await.unwrap();
        assert!(orchestrator.delete("github-token", "t1", "default").await.unwrap());
        assert!(!orchestrator.delete("github-token", "t1", "default").await.unwrap());
        assert!(orchestrator.list_for_thread("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let pending = Arc::new(PendingOperations::new());
        let orchestrator =
            orchestrator_with(FakeHandler::token("github-token", &pending), Arc::clone(&pending));

        let result = orchestrator.ensure("nope", "t1", "default", &[]).await;
        assert!(matches!(result, Err(AuthError::UnknownProvider(_))));
    }
}
