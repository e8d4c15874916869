//! Tool domain entities

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution isolation level for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// A fresh worker process per invocation. Environment mutations and
    /// crashes stay in the worker.
    Process,
    /// A browser-hosted interpreter page. For tool code whose trust boundary
    /// must be stronger than a local process.
    Browser,
}

impl Isolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Isolation::Process => "process",
            Isolation::Browser => "browser",
        }
    }
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What actually runs when the tool is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolSource {
    /// An executable plus fixed arguments (process isolation)
    Program { program: String, args: Vec<String> },
    /// Interpreter source text (browser isolation)
    Script { source: String },
}

/// A credential requirement declared by a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRequirement {
    /// Provider whose credential the tool reads from its environment
    pub provider: String,
    /// Scopes the tool needs from that provider
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CredentialRequirement {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// Parameter specification for a tool body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Parameter description
    pub description: String,
    /// Whether this parameter is required
    pub required: bool,
    /// Parameter type hint (e.g. "string", "number", "boolean")
    pub param_type: String,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
            param_type: "string".to_string(),
        }
    }

    pub fn with_type(mut self, param_type: impl Into<String>) -> Self {
        self.param_type = param_type.into();
        self
    }
}

/// Executable descriptor of a tool: what runs, where it runs, what the body
/// must look like, and which credentials the environment must carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name (e.g. "slack_post_message")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// What runs on invocation
    pub source: ToolSource,
    /// Body parameter specifications
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    /// Credential requirements, one per provider
    #[serde(default)]
    pub requirements: Vec<CredentialRequirement>,
    /// Statically configured environment, merged under credential projections
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Isolation level the runtime dispatch keys on
    pub isolation: Isolation,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source: ToolSource,
    ) -> Self {
        let isolation = match &source {
            ToolSource::Program { .. } => Isolation::Process,
            ToolSource::Script { .. } => Isolation::Browser,
        };
        Self {
            name: name.into(),
            description: description.into(),
            source,
            parameters: Vec::new(),
            requirements: Vec::new(),
            env: HashMap::new(),
            isolation,
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn with_requirement(mut self, requirement: CredentialRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn requires_credentials(&self) -> bool {
        !self.requirements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_isolation_from_source() {
        let program = ToolDescriptor::new(
            "echo",
            "Echo the body",
            ToolSource::Program {
                program: "cat".into(),
                args: vec![],
            },
        );
        assert_eq!(program.isolation, Isolation::Process);

        let script = ToolDescriptor::new(
            "calc",
            "Run a script",
            ToolSource::Script {
                source: "print(1)".into(),
            },
        );
        assert_eq!(script.isolation, Isolation::Browser);
    }

    #[test]
    fn test_descriptor_builder() {
        let tool = ToolDescriptor::new(
            "slack_post_message",
            "Post a message to Slack",
            ToolSource::Program {
                program: "slack-post".into(),
                args: vec![],
            },
        )
        .with_parameter(ToolParameter::new("channel", "Target channel", true))
        .with_parameter(ToolParameter::new("text", "Message text", true))
        .with_requirement(CredentialRequirement::new("slack").with_scopes(["chat:write"]))
        .with_env("SLACK_API_BASE", "https://slack.com/api");

        assert!(tool.requires_credentials());
        assert_eq!(tool.parameters.len(), 2);
        assert_eq!(tool.requirements[0].provider, "slack");
        assert_eq!(tool.requirements[0].scopes, vec!["chat:write".to_string()]);
    }
}
