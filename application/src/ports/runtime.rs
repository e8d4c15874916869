//! Tool Runtime port
//!
//! Both runtimes — the fresh-subprocess worker and the browser-hosted
//! sandbox — implement the same contract: take a prepared invocation, return
//! captured output. Execution happens off the host event loop (a separate OS
//! process or a separate browser page), so a slow tool cannot starve it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use toolgate_domain::{Isolation, RuntimeOutput, ToolSource};

/// Errors surfaced by runtimes
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Tool execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sandbox page navigation failed: {0}")]
    Navigation(String),

    #[error("Sandbox host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Body encoding failed: {0}")]
    Encoding(String),

    #[error("Source not runnable by this runtime: {0}")]
    UnsupportedSource(String),
}

/// Everything a runtime needs to execute one invocation.
///
/// The `env` map is the complete, already-merged environment contract for
/// the tool: static tool variables plus credential projections. Runtimes
/// must expose exactly this map (plus a minimal base like `PATH`) — nothing
/// from the host environment leaks through.
#[derive(Debug, Clone)]
pub struct PreparedInvocation {
    pub tool_name: String,
    pub source: ToolSource,
    pub env: HashMap<String, String>,
    /// JSON body, delivered to the tool as its standard input
    pub body: serde_json::Value,
    /// Wall-clock bound for subprocess execution; sandbox runs are unbounded
    /// here (callers race the await against their own deadline)
    pub timeout: Option<Duration>,
}

impl PreparedInvocation {
    pub fn new(tool_name: impl Into<String>, source: ToolSource) -> Self {
        Self {
            tool_name: tool_name.into(),
            source,
            env: HashMap::new(),
            body: serde_json::Value::Null,
            timeout: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Port for tool execution
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    /// Isolation level this runtime provides.
    fn isolation(&self) -> Isolation;

    /// Execute one invocation and capture its output.
    ///
    /// A tool that fails (non-zero exit, script exception) still produces
    /// `Ok` with [`RuntimeOutput::error`] set; `Err` is reserved for the
    /// runtime machinery itself failing.
    async fn run(&self, prepared: &PreparedInvocation) -> Result<RuntimeOutput, RuntimeError>;
}
