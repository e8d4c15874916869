//! Credential value objects — immutable request and context types
//!
//! A [`CredentialRequest`] carries everything a handler needs to *start* a
//! grant; a [`CredentialContext`] is the *resolved*, usable credential. Both
//! are immutable: a refresh produces a new context, it never mutates one in
//! place.
//!
//! The environment-variable projection lives here as pure logic because its
//! naming is a contract tool code depends on bit-for-bit:
//!
//! | Mode | Variable name |
//! |------|---------------|
//! | plain | `{TOKEN_ENV_KEY}` |
//! | profile | `{PROFILE}_{TOKEN_ENV_KEY}` (profile upper-cased) |

use crate::credential::grant::GrantKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix an environment key with an upper-cased profile name.
///
/// This is the multi-identity naming contract: `("teamA", "SLACK_BOT_TOKEN")`
/// becomes `TEAMA_SLACK_BOT_TOKEN`, and underscores in the profile survive
/// as-is (`"my_org"` → `MY_ORG_SLACK_BOT_TOKEN`).
pub fn prefixed_env_key(profile: &str, key: &str) -> String {
    format!("{}_{}", profile.to_uppercase(), key)
}

/// Parameters needed to start a grant for one provider.
///
/// Constructed by a credential handler from its provider descriptor plus the
/// scopes the invocation asked for. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRequest {
    /// Provider this request targets (e.g. "slack")
    pub provider: String,
    /// Grant mechanics the provider uses
    pub grant: GrantKind,
    /// OAuth2 client id (absent for bearer-token providers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth2 client secret (absent for bearer-token providers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Scopes requested for this grant
    pub scopes: Vec<String>,
    /// Provider authorize endpoint (OAuth2 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,
    /// Provider token-exchange endpoint (OAuth2 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// Environment variable the resolved token is projected into
    pub token_env_key: String,
}

impl CredentialRequest {
    pub fn new(
        provider: impl Into<String>,
        grant: GrantKind,
        token_env_key: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            grant,
            client_id: None,
            client_secret: None,
            scopes: Vec::new(),
            authorize_url: None,
            token_url: None,
            token_env_key: token_env_key.into(),
        }
    }

    pub fn with_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = client_secret;
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }
}

/// The resolved, usable form of a credential.
///
/// Immutable once created — a refresh replaces the whole context. The
/// `detail` blob carries whatever extra payload the provider returned
/// (team ids, granted-scope echoes) without the core caring about its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialContext {
    /// Provider that issued this credential
    pub provider: String,
    /// The access token itself
    pub access_token: String,
    /// Refresh token, when the grant issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant, when the provider reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form provider detail blob
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
    /// Human-readable description of the credential
    pub description: String,
    /// Environment variable the token is projected into
    pub token_env_key: String,
    /// Additional environment pairs the provider projection exposes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_env: HashMap<String, String>,
}

impl CredentialContext {
    pub fn new(
        provider: impl Into<String>,
        access_token: impl Into<String>,
        token_env_key: impl Into<String>,
    ) -> Self {
        let provider = provider.into();
        Self {
            description: format!("{} credential", provider),
            provider,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            detail: serde_json::Value::Null,
            token_env_key: token_env_key.into(),
            extra_env: HashMap::new(),
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_extra_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    /// Whether the credential is expired at `now`.
    ///
    /// A context without a reported expiry never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Plain-mode environment projection: `{TOKEN_ENV_KEY: access_token}`
    /// plus any extra pairs.
    pub fn env_map(&self) -> HashMap<String, String> {
        let mut env = HashMap::with_capacity(1 + self.extra_env.len());
        env.insert(self.token_env_key.clone(), self.access_token.clone());
        for (k, v) in &self.extra_env {
            env.insert(k.clone(), v.clone());
        }
        env
    }

    /// Profile-mode projection: every key prefixed with the upper-cased
    /// profile name.
    pub fn env_map_for_profile(&self, profile: &str) -> HashMap<String, String> {
        self.env_map()
            .into_iter()
            .map(|(k, v)| (prefixed_env_key(profile, &k), v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_prefixed_env_key_uppercases_profile() {
        assert_eq!(prefixed_env_key("teamA", "SLACK_BOT_TOKEN"), "TEAMA_SLACK_BOT_TOKEN");
        assert_eq!(prefixed_env_key("my_org", "SLACK_BOT_TOKEN"), "MY_ORG_SLACK_BOT_TOKEN");
        assert_eq!(prefixed_env_key("Mixed_Case", "X_KEY"), "MIXED_CASE_X_KEY");
    }

    #[test]
    fn test_env_map_plain() {
        let ctx = CredentialContext::new("slack", "xoxb-123", "SLACK_BOT_TOKEN")
            .with_extra_env("SLACK_TEAM_ID", "T01");

        let env = ctx.env_map();
        assert_eq!(env.get("SLACK_BOT_TOKEN").map(String::as_str), Some("xoxb-123"));
        assert_eq!(env.get("SLACK_TEAM_ID").map(String::as_str), Some("T01"));
    }

    #[test]
    fn test_env_map_for_profile_prefixes_every_key() {
        let ctx = CredentialContext::new("slack", "xoxb-123", "SLACK_BOT_TOKEN")
            .with_extra_env("SLACK_TEAM_ID", "T01");

        let env = ctx.env_map_for_profile("work_eu");
        assert_eq!(
            env.get("WORK_EU_SLACK_BOT_TOKEN").map(String::as_str),
            Some("xoxb-123")
        );
        assert_eq!(env.get("WORK_EU_SLACK_TEAM_ID").map(String::as_str), Some("T01"));
        assert!(!env.contains_key("SLACK_BOT_TOKEN"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let fresh = CredentialContext::new("github", "gho_1", "GITHUB_TOKEN");
        assert!(!fresh.is_expired(now));

        let expired = fresh.clone().with_expires_at(now - Duration::seconds(1));
        assert!(expired.is_expired(now));

        let live = fresh.with_expires_at(now + Duration::hours(1));
        assert!(!live.is_expired(now));
    }
}
