//! Grant kinds supported by credential handlers

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// How a provider issues credentials.
///
/// The kind appears verbatim in the callback URL path
/// (`/auth/{provider}/{grant}/callback`), so the string forms are a wire
/// contract, not just display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantKind {
    /// OAuth2 authorization-code grant. The callback delivers a short-lived
    /// code that is exchanged for tokens at the provider's token endpoint.
    #[serde(rename = "oauth2")]
    AuthorizationCode,
    /// Bearer-token paste flow. The callback delivers the token itself;
    /// there is no exchange step and no refresh step.
    #[serde(rename = "token")]
    BearerToken,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::AuthorizationCode => "oauth2",
            GrantKind::BearerToken => "token",
        }
    }

    /// Whether this grant kind has a refresh step at all.
    ///
    /// Refresh on a kind that returns `false` here is an expected,
    /// first-class failure — the orchestrator falls back to a fresh flow.
    pub fn supports_refresh(&self) -> bool {
        matches!(self, GrantKind::AuthorizationCode)
    }
}

impl std::fmt::Display for GrantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GrantKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oauth2" => Ok(GrantKind::AuthorizationCode),
            "token" => Ok(GrantKind::BearerToken),
            other => Err(DomainError::UnknownGrantKind(other.to_string())),
        }
    }
}
