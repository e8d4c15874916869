//! Provider descriptors — the data side of the handler catalog

use std::collections::HashMap;
use toolgate_domain::GrantKind;

/// Everything configuration knows about one provider.
///
/// The wider catalog of per-provider descriptors is maintained outside this
/// crate; this type is the shape they all share.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Provider name as it appears in requirements and callback URLs
    pub name: String,
    /// Grant mechanics the provider uses
    pub grant: GrantKind,
    /// OAuth2 client id
    pub client_id: Option<String>,
    /// OAuth2 client secret
    pub client_secret: Option<String>,
    /// OAuth2 authorize endpoint
    pub authorize_url: Option<String>,
    /// OAuth2 token endpoint
    pub token_url: Option<String>,
    /// Environment variable the resolved token is projected into
    pub token_env_key: String,
    /// Scopes requested when an invocation declares none
    pub default_scopes: Vec<String>,
    /// Additional environment pairs projected alongside the token
    pub extra_env: HashMap<String, String>,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        grant: GrantKind,
        token_env_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            grant,
            client_id: None,
            client_secret: None,
            authorize_url: None,
            token_url: None,
            token_env_key: token_env_key.into(),
            default_scopes: Vec::new(),
            extra_env: HashMap::new(),
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

    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = Some(authorize_url.into());
        self.token_url = Some(token_url.into());
        self
    }

    pub fn with_default_scopes(
        mut self,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.default_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    /// Configuration problems that would otherwise surface mid-flow.
    pub fn validate(&self) -> Result<(), String> {
        if self.grant == GrantKind::AuthorizationCode {
            if self.client_id.is_none() {
                return Err(format!("provider '{}' is missing client_id", self.name));
            }
            if self.authorize_url.is_none() || self.token_url.is_none() {
                return Err(format!(
                    "provider '{}' is missing authorize_url/token_url",
                    self.name
                ));
            }
        }
        Ok(())
    }
}
