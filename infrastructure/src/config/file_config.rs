//! Config file schema
//!
//! Serde structs mirroring `toolgate.toml`, plus conversions into the
//! domain/adapter types they configure. Every section has defaults so an
//! empty file is a valid (if toolless) deployment.

use crate::auth::ProviderDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use toolgate_domain::{
    CredentialRequirement, GrantKind, Isolation, ToolDescriptor, ToolParameter, ToolSource,
};

/// Problems found while converting file config into runtime types.
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Provider '{name}': {reason}")]
    Provider { name: String, reason: String },

    #[error("Tool '{name}': {reason}")]
    Tool { name: String, reason: String },
}

/// Top-level config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: FileServerConfig,
    pub browser: FileBrowserConfig,
    pub session_store: FileStoreConfig,
    pub invocation: FileInvocationConfig,
    pub audit: FileAuditConfig,
    pub providers: HashMap<String, FileProviderConfig>,
    pub tools: HashMap<String, FileToolConfig>,
}

/// `[server]` — the callback surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    /// Address the callback surface binds
    pub listen_addr: String,
    /// Base URL external callbacks and sandbox pages reach the surface at.
    /// Defaults to `http://{listen_addr}`.
    pub public_base_url: Option<String>,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8400".to_string(),
            public_base_url: None,
        }
    }
}

impl FileServerConfig {
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_addr))
    }
}

/// `[browser]` — the sandbox host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBrowserConfig {
    /// Browser binary to spawn for the sandbox runtime
    pub binary: String,
    /// Interpreter bundle embedded into sandbox pages
    pub interpreter_url: String,
}

impl Default for FileBrowserConfig {
    fn default() -> Self {
        Self {
            binary: "chromium".to_string(),
            interpreter_url: "https://cdn.jsdelivr.net/pyodide/v0.26.2/full/pyodide.js"
                .to_string(),
        }
    }
}

/// `[session_store]` — backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// "memory" or "file"
    pub backend: String,
    /// Path for the file backend
    pub path: Option<String>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
        }
    }
}

/// `[invocation]` — router knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInvocationConfig {
    /// Wall-clock bound for subprocess tools, in seconds
    pub tool_timeout_secs: u64,
}

impl Default for FileInvocationConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
        }
    }
}

/// `[audit]` — JSONL audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAuditConfig {
    /// Log file path; auditing is off when unset
    pub path: Option<String>,
}

/// `[providers.<name>]` — one provider descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    /// "oauth2" or "token"
    pub grant: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    /// Environment variable the token is projected into
    pub token_env_key: String,
    pub default_scopes: Vec<String>,
    pub extra_env: HashMap<String, String>,
}

impl FileProviderConfig {
    /// Convert into a validated [`ProviderDescriptor`].
    pub fn into_descriptor(self, name: &str) -> Result<ProviderDescriptor, ConfigValidationError> {
        let grant: GrantKind = self.grant.parse().map_err(|_| {
            ConfigValidationError::Provider {
                name: name.to_string(),
                reason: format!("unknown grant '{}'", self.grant),
            }
        })?;
        if self.token_env_key.is_empty() {
            return Err(ConfigValidationError::Provider {
                name: name.to_string(),
                reason: "token_env_key is required".to_string(),
            });
        }

        let mut descriptor = ProviderDescriptor::new(name, grant, self.token_env_key);
        if let Some(client_id) = self.client_id {
            descriptor = descriptor.with_client(client_id, self.client_secret);
        }
        if let (Some(authorize_url), Some(token_url)) = (self.authorize_url, self.token_url) {
            descriptor = descriptor.with_endpoints(authorize_url, token_url);
        }
        descriptor = descriptor.with_default_scopes(self.default_scopes);
        for (key, value) in self.extra_env {
            descriptor = descriptor.with_extra_env(key, value);
        }

        descriptor
            .validate()
            .map_err(|reason| ConfigValidationError::Provider {
                name: name.to_string(),
                reason,
            })?;
        Ok(descriptor)
    }
}

/// `[tools.<name>.parameters]` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileToolParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_param_type")]
    pub param_type: String,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// `[tools.<name>.requirements]` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileToolRequirement {
    pub provider: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// `[tools.<name>]` — one tool descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileToolConfig {
    pub description: String,
    /// Program tool: executable plus arguments (process isolation)
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Script tool: interpreter source (browser isolation)
    pub script: Option<String>,
    pub parameters: Vec<FileToolParameter>,
    pub requirements: Vec<FileToolRequirement>,
    pub env: HashMap<String, String>,
    /// Override the isolation the source kind implies
    pub isolation: Option<String>,
}

impl FileToolConfig {
    /// Convert into a validated [`ToolDescriptor`].
    pub fn into_descriptor(self, name: &str) -> Result<ToolDescriptor, ConfigValidationError> {
        let source = match (self.program, self.script) {
            (Some(program), None) => ToolSource::Program {
                program,
                args: self.args,
            },
            (None, Some(source)) => ToolSource::Script { source },
            (Some(_), Some(_)) => {
                return Err(ConfigValidationError::Tool {
                    name: name.to_string(),
                    reason: "declare either program or script, not both".to_string(),
                });
            }
            (None, None) => {
                return Err(ConfigValidationError::Tool {
                    name: name.to_string(),
                    reason: "either program or script is required".to_string(),
                });
            }
        };

        let mut descriptor = ToolDescriptor::new(name, self.description, source);
        for parameter in self.parameters {
            descriptor = descriptor.with_parameter(
                ToolParameter::new(parameter.name, parameter.description, parameter.required)
                    .with_type(parameter.param_type),
            );
        }
        for requirement in self.requirements {
            descriptor = descriptor.with_requirement(
                CredentialRequirement::new(requirement.provider).with_scopes(requirement.scopes),
            );
        }
        for (key, value) in self.env {
            descriptor = descriptor.with_env(key, value);
        }
        if let Some(isolation) = self.isolation {
            let isolation = match isolation.as_str() {
                "process" => Isolation::Process,
                "browser" => Isolation::Browser,
                other => {
                    return Err(ConfigValidationError::Tool {
                        name: name.to_string(),
                        reason: format!("unknown isolation '{}'", other),
                    });
                }
            };
            descriptor = descriptor.with_isolation(isolation);
        }
        Ok(descriptor)
    }
}
