//! Credential Handler port
//!
//! One implementation per grant strategy, parameterized by provider. A
//! handler owns the shape of its [`CredentialRequest`], the instruction
//! string handed to the human, and the wrapping of the raw callback value
//! (a token or an authorization code) into a [`CredentialContext`].
//!
//! `prepare` MUST register the pending operation before returning — the
//! external URL it hands out embeds the operation id, and the callback can
//! legally arrive before the caller ever awaits.

use crate::pending::PendingError;
use crate::ports::session_store::StoreError;
use async_trait::async_trait;
use thiserror::Error;
use toolgate_domain::{CredentialContext, CredentialRequest, GrantKind};

/// Errors in the auth orchestration path
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No session for {0}")]
    NoSession(String),

    #[error("No pending flow for {0}")]
    NoPendingFlow(String),

    #[error("Refresh is not supported for the '{0}' grant")]
    RefreshUnsupported(GrantKind),

    #[error("Refresh is not possible: {0}")]
    RefreshUnavailable(String),

    #[error("External flow failed: {0}")]
    External(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Pending(#[from] PendingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether this error means "this grant has no refresh step" — the
    /// orchestrator answers it with a fresh flow instead of failing.
    pub fn is_refresh_fallback(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshUnsupported(_) | AuthError::RefreshUnavailable(_)
        )
    }
}

/// Port for provider credential exchange
#[async_trait]
pub trait CredentialHandler: Send + Sync {
    /// Provider this handler serves (e.g. "slack").
    fn provider(&self) -> &str;

    /// Grant mechanics this handler implements.
    fn grant(&self) -> GrantKind;

    /// Whether distinct scope sets are distinct sessions (OAuth2-style) or
    /// one session serves any scope request (bearer-token-style). Changes
    /// how the router computes a cache hit.
    fn scope_sensitive(&self) -> bool;

    /// Build the immutable request for a grant over `scopes`.
    fn build_request(&self, scopes: &[String]) -> CredentialRequest;

    /// Start the external flow: create the pending operation under
    /// `operation_id`, then return a human-readable instruction string
    /// containing the external URL.
    async fn prepare(
        &self,
        request: &CredentialRequest,
        thread: &str,
        profile: &str,
        operation_id: &str,
    ) -> Result<String, AuthError>;

    /// Await the pending operation, then wrap the delivered raw value into a
    /// resolved credential.
    async fn authenticate(
        &self,
        request: &CredentialRequest,
        operation_id: &str,
    ) -> Result<CredentialContext, AuthError>;

    /// Produce a replacement context from a refresh step.
    ///
    /// Grant kinds without a refresh step fail with
    /// [`AuthError::RefreshUnsupported`] — an expected outcome the caller
    /// answers by starting a fresh flow.
    async fn refresh(
        &self,
        request: &CredentialRequest,
        context: &CredentialContext,
    ) -> Result<CredentialContext, AuthError>;
}
