//! Bearer-token paste handler
//!
//! For providers without an OAuth2 app: the human submits an API token they
//! already hold to the hosted callback URL. Scope-insensitive — one session
//! per identity serves every scope request — and refresh is a first-class
//! unsupported operation.

use super::provider::ProviderDescriptor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use toolgate_application::{AuthError, CredentialHandler, PendingError, PendingOperations};
use toolgate_domain::{CredentialContext, CredentialRequest, GrantKind};
use tracing::debug;

/// Bearer-token grant handler, one instance per provider.
pub struct StaticTokenHandler {
    descriptor: ProviderDescriptor,
    pending: Arc<PendingOperations>,
    /// Public base URL the submission URL is built from
    callback_base: String,
}

impl StaticTokenHandler {
    pub fn new(
        descriptor: ProviderDescriptor,
        pending: Arc<PendingOperations>,
        callback_base: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            pending,
            callback_base: callback_base.into(),
        }
    }

    fn submission_url(&self, operation_id: &str) -> String {
        format!(
            "{}/auth/{}/token/callback?state={}&token=<your-token>",
            self.callback_base.trim_end_matches('/'),
            self.descriptor.name,
            operation_id
        )
    }
}

#[async_trait]
impl CredentialHandler for StaticTokenHandler {
    fn provider(&self) -> &str {
        &self.descriptor.name
    }

    fn grant(&self) -> GrantKind {
        GrantKind::BearerToken
    }

    fn scope_sensitive(&self) -> bool {
        false
    }

    fn build_request(&self, scopes: &[String]) -> CredentialRequest {
        CredentialRequest::new(
            &self.descriptor.name,
            GrantKind::BearerToken,
            &self.descriptor.token_env_key,
        )
        .with_scopes(scopes.iter().cloned())
    }

    async fn prepare(
        &self,
        _request: &CredentialRequest,
        thread: &str,
        profile: &str,
        operation_id: &str,
    ) -> Result<String, AuthError> {
        let mut meta = HashMap::new();
        meta.insert("thread".to_string(), thread.to_string());
        meta.insert("profile".to_string(), profile.to_string());
        self.pending.create(operation_id, meta);

        debug!(
            "Token: prepared flow for {} (operation {})",
            self.descriptor.name, operation_id
        );
        Ok(format!(
            "To connect {}, submit your API token — authenticate at: {}",
            self.descriptor.name,
            self.submission_url(operation_id)
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
            .ok_or_else(|| PendingError::NotFound(operation_id.to_string()))?;
        let value = slot.wait().await.into_result().map_err(AuthError::External)?;
        let token = value
            .as_str()
            .ok_or_else(|| AuthError::External("callback delivered a non-string token".into()))?;

        let mut context = CredentialContext::new(
            &self.descriptor.name,
            token,
            &self.descriptor.token_env_key,
        )
        .with_description(format!("{} bearer token", self.descriptor.name));
        for (key, value) in &self.descriptor.extra_env {
            context = context.with_extra_env(key.clone(), value.clone());
        }
        Ok(context)
    }

    async fn refresh(
        &self,
        _request: &CredentialRequest,
        _context: &CredentialContext,
    ) -> Result<CredentialContext, AuthError> {
        Err(AuthError::RefreshUnsupported(GrantKind::BearerToken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_application::OperationOutcome;

    fn handler(pending: &Arc<PendingOperations>) -> StaticTokenHandler {
        let descriptor =
            ProviderDescriptor::new("github-token", GrantKind::BearerToken, "GITHUB_TOKEN");
        StaticTokenHandler::new(descriptor, Arc::clone(pending), "http://127.0.0.1:8400/")
    }

    #[tokio::test]
    async fn test_prepare_then_authenticate() {
        let pending = Arc::new(PendingOperations::new());
        let handler = handler(&pending);
        let request = handler.build_request(&[]);

        let instructions = handler
            .prepare(&request, "t1", "default", "op-1")
            .await
            .unwrap();
        assert!(instructions.contains(
            "authenticate at: http://127.0.0.1:8400/auth/github-token/token/callback?state=op-1"
        ));
        assert!(pending.contains("op-1"));

        pending
            .resolve("op-1", OperationOutcome::Delivered(serde_json::json!("abc")))
            .unwrap();
        let context = handler.authenticate(&request, "op-1").await.unwrap();
        assert_eq!(context.access_token, "abc");
        assert_eq!(context.token_env_key, "GITHUB_TOKEN");
        assert!(context.refresh_token.is_none());
        assert!(context.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_refresh_is_unsupported() {
        let pending = Arc::new(PendingOperations::new());
        let handler = handler(&pending);
        let request = handler.build_request(&[]);
        let context = CredentialContext::new("github-token", "abc", "GITHUB_TOKEN");

        let result = handler.refresh(&request, &context).await;
        assert!(matches!(result, Err(AuthError::RefreshUnsupported(GrantKind::BearerToken))));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_operation() {
        let pending = Arc::new(PendingOperations::new());
        let handler = handler(&pending);
        let request = handler.build_request(&[]);

        let result = handler.authenticate(&request, "ghost").await;
        assert!(matches!(result, Err(AuthError::Pending(PendingError::NotFound(_)))));
    }
}
