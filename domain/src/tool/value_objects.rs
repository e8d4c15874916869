//! Tool value objects — invocation requests and outcomes
//!
//! [`InvocationOutcome`] is the tagged result the agent loop branches on:
//! `Completed` carries captured output, `Interrupted` carries the
//! authorize-URL instructions. Interruption is expected control flow, so it
//! is a variant, not an error type.

use serde::{Deserialize, Serialize};

/// Default thread routing key.
pub const DEFAULT_THREAD: &str = "default";

/// Default profile (single-identity mode).
pub const DEFAULT_PROFILE: &str = "default";

/// One independent tool invocation.
///
/// Thread and profile are routing keys for session lookup, not locks —
/// concurrent invocations on the same triple are legal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Name of the tool to invoke
    pub tool_name: String,
    /// JSON body delivered to the tool on stdin
    #[serde(default)]
    pub body: serde_json::Value,
    /// Conversation-scoped routing key
    #[serde(default = "default_thread")]
    pub thread: String,
    /// Named identity within the thread
    #[serde(default = "default_profile")]
    pub profile: String,
}

fn default_thread() -> String {
    DEFAULT_THREAD.to_string()
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            body: serde_json::Value::Null,
            thread: default_thread(),
            profile: default_profile(),
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = thread.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Multi-identity mode: any profile other than the default switches the
    /// credential projection to profile-prefixed variable names.
    pub fn is_profile_mode(&self) -> bool {
        self.profile != DEFAULT_PROFILE
    }
}

/// Captured output of one runtime execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    #[serde(default)]
    pub stderr: String,
    /// Error reported by the tool or the hosting environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuntimeOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Flatten into the single text the agent sees.
    pub fn render(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n--- stderr ---\n");
            }
            text.push_str(&self.stderr);
        }
        if let Some(error) = &self.error {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("error: ");
            text.push_str(error);
        }
        text
    }
}

/// The two normal outcomes of one invocation attempt. Mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// The tool ran; the string is its rendered output
    Completed { body: String },
    /// More authentication is required; the string embeds one
    /// "authenticate at: <url>" line per still-pending provider
    Interrupted { body: String },
}

impl InvocationOutcome {
    pub fn completed(body: impl Into<String>) -> Self {
        InvocationOutcome::Completed { body: body.into() }
    }

    pub fn interrupted(body: impl Into<String>) -> Self {
        InvocationOutcome::Interrupted { body: body.into() }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, InvocationOutcome::Interrupted { .. })
    }

    /// The `(body, interrupted)` envelope callers outside the crate consume.
    pub fn into_envelope(self) -> (String, bool) {
        match self {
            InvocationOutcome::Completed { body } => (body, false),
            InvocationOutcome::Interrupted { body } => (body, true),
        }
    }
}
