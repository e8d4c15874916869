//! OAuth2 authorization-code handler
//!
//! `prepare` registers the pending operation and hands out the authorize URL
//! with `state=operation_id`; the callback surface later resolves the
//! operation with the authorization code, and `authenticate` exchanges the
//! code for tokens at the provider's token endpoint.
//!
//! Scope-sensitive: distinct scope sets are distinct sessions.

use super::provider::ProviderDescriptor;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use toolgate_application::{AuthError, CredentialHandler, PendingError, PendingOperations};
use toolgate_domain::{CredentialContext, CredentialRequest, GrantKind};
use tracing::debug;

/// Timeout for token-endpoint round trips.
const EXCHANGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Wire shape of a token-endpoint response (exchange and refresh alike).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Authorization-code grant handler, one instance per provider.
pub struct OAuth2Handler {
    descriptor: ProviderDescriptor,
    pending: Arc<PendingOperations>,
    http: reqwest::Client,
    /// Public base URL the redirect URI is built from
    callback_base: String,
}

impl OAuth2Handler {
    pub fn new(
        descriptor: ProviderDescriptor,
        pending: Arc<PendingOperations>,
        callback_base: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            pending,
            http: reqwest::Client::builder()
                .timeout(EXCHANGE_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            callback_base: callback_base.into(),
        }
    }

    fn redirect_uri(&self) -> String {
        format!(
            "{}/auth/{}/oauth2/callback",
            self.callback_base.trim_end_matches('/'),
            self.descriptor.name
        )
    }

    fn authorize_url(
        &self,
        request: &CredentialRequest,
        operation_id: &str,
    ) -> Result<String, AuthError> {
        let base = request
            .authorize_url
            .as_deref()
            .ok_or_else(|| {
                AuthError::Configuration(format!(
                    "provider '{}' has no authorize_url",
                    self.descriptor.name
                ))
            })?;
        let mut url = url::Url::parse(base).map_err(|e| {
            AuthError::Configuration(format!(
                "provider '{}' authorize_url is invalid: {}",
                self.descriptor.name, e
            ))
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(client_id) = &request.client_id {
                query.append_pair("client_id", client_id);
            }
            query.append_pair("redirect_uri", &self.redirect_uri());
            query.append_pair("response_type", "code");
            if !request.scopes.is_empty() {
                query.append_pair("scope", &request.scopes.join(" "));
            }
            query.append_pair("state", operation_id);
        }
        Ok(url.into())
    }

    fn context_from_response(&self, response: TokenResponse) -> CredentialContext {
        let mut context = CredentialContext::new(
            &self.descriptor.name,
            response.access_token,
            &self.descriptor.token_env_key,
        )
        .with_description(format!("{} OAuth2 credential", self.descriptor.name));
        if let Some(refresh_token) = response.refresh_token {
            context = context.with_refresh_token(refresh_token);
        }
        if let Some(expires_in) = response.expires_in {
            context = context.with_expires_at(Utc::now() + Duration::seconds(expires_in));
        }
        if let Some(scope) = response.scope {
            context = context.with_detail(serde_json::json!({"granted_scope": scope}));
        }
        for (key, value) in &self.descriptor.extra_env {
            context = context.with_extra_env(key.clone(), value.clone());
        }
        context
    }

    async fn post_token_request(
        &self,
        request: &CredentialRequest,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        let token_url = request.token_url.as_deref().ok_or_else(|| {
            AuthError::Configuration(format!(
                "provider '{}' has no token_url",
                self.descriptor.name
            ))
        })?;
        let response = self
            .http
            .post(token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))
    }
}

#[async_trait]
impl CredentialHandler for OAuth2Handler {
    fn provider(&self) -> &str {
        &self.descriptor.name
    }

    fn grant(&self) -> GrantKind {
        GrantKind::AuthorizationCode
    }

    fn scope_sensitive(&self) -> bool {
        true
    }

    fn build_request(&self, scopes: &[String]) -> CredentialRequest {
        let scopes: Vec<String> = if scopes.is_empty() {
            self.descriptor.default_scopes.clone()
        } else {
            scopes.to_vec()
        };
        let mut request = CredentialRequest::new(
            &self.descriptor.name,
            GrantKind::AuthorizationCode,
            &self.descriptor.token_env_key,
        )
        .with_scopes(scopes);
        if let Some(client_id) = &self.descriptor.client_id {
            request = request.with_client(client_id, self.descriptor.client_secret.clone());
        }
        if let Some(authorize_url) = &self.descriptor.authorize_url {
            request = request.with_authorize_url(authorize_url);
        }
        if let Some(token_url) = &self.descriptor.token_url {
            request = request.with_token_url(token_url);
        }
        request
    }

    async fn prepare(
        &self,
        request: &CredentialRequest,
        thread: &str,
        profile: &str,
        operation_id: &str,
    ) -> Result<String, AuthError> {
        let mut meta = HashMap::new();
        meta.insert("thread".to_string(), thread.to_string());
        meta.insert("profile".to_string(), profile.to_string());
        meta.insert("redirect_uri".to_string(), self.redirect_uri());
        // The operation must exist before the URL leaves this function: the
        // callback may arrive before anyone awaits.
        self.pending.create(operation_id, meta);

        let url = self.authorize_url(request, operation_id)?;
        debug!(
            "OAuth2: prepared flow for {} (operation {})",
            self.descriptor.name, operation_id
        );
        Ok(format!(
            "To authorize {}, authenticate at: {}",
            self.descriptor.name, url
        ))
    }

    async fn authenticate(
        &self,
        request: &CredentialRequest,
        operation_id: &str,
    ) -> Result<CredentialContext, AuthError> {
        let slot = self
            .pending
            .get(operation_id)
            .ok_or_else(|| PendingError::NotFound(operation_id.to_string()))?;
        let value = slot.wait().await.into_result().map_err(AuthError::External)?;
        let code = value
            .as_str()
            .ok_or_else(|| AuthError::External("callback delivered a non-string code".into()))?
            .to_string();

        let redirect_uri = self.redirect_uri();
        let client_id = request.client_id.clone().unwrap_or_default();
        let client_secret = request.client_secret.clone().unwrap_or_default();
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", client_id.as_str()),
        ];
        if !client_secret.is_empty() {
            params.push(("client_secret", client_secret.as_str()));
        }
        let response = self.post_token_request(request, &params).await?;
        Ok(self.context_from_response(response))
    }

    async fn refresh(
        &self,
        request: &CredentialRequest,
        context: &CredentialContext,
    ) -> Result<CredentialContext, AuthError> {
        let refresh_token = context.refresh_token.clone().ok_or_else(|| {
            AuthError::RefreshUnavailable(format!(
                "no refresh token issued for '{}'",
                self.descriptor.name
            ))
        })?;

        let client_id = request.client_id.clone().unwrap_or_default();
        let client_secret = request.client_secret.clone().unwrap_or_default();
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
        ];
        if !client_secret.is_empty() {
            params.push(("client_secret", client_secret.as_str()));
        }
        let response = self.post_token_request(request, &params).await?;

        let mut refreshed = self.context_from_response(response);
        // Providers that rotate refresh tokens return a new one; those that
        // don't expect the old one to keep working.
        if refreshed.refresh_token.is_none() {
            refreshed = refreshed.with_refresh_token(refresh_token);
        }
        Ok(refreshed)
    }
}
