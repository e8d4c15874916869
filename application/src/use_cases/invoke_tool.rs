//! Invocation Router — the single entry point for tool execution
//!
//! Every invocation flows through the same interrupt/resume protocol
//! regardless of which runtime executes the tool: resolve the descriptor,
//! validate the body, ensure credentials (possibly interrupting), merge the
//! environment, dispatch to the runtime matching the tool's isolation level.
//!
//! Two builtin self-service tools are intercepted before catalog lookup so
//! the agent can introspect and revoke its own sessions:
//! [`LIST_SESSIONS`] and [`DELETE_SESSION`].

use crate::ports::audit_log::{AuditEvent, AuditLogger, NoAuditLogger};
use crate::ports::credential_handler::AuthError;
use crate::ports::runtime::{PreparedInvocation, RuntimeError, ToolRuntime};
use crate::ports::tool_catalog::ToolCatalog;
use crate::use_cases::authorize::{AuthOrchestrator, EnsureOutcome};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use toolgate_domain::{
    DefaultToolValidator, InvocationOutcome, InvocationRequest, Isolation, ToolDescriptor,
    ToolParameter, ToolSource, ToolValidator,
};
use tracing::{debug, info};

/// Builtin tool name: token-free session listing for the current thread.
pub const LIST_SESSIONS: &str = "list_sessions";

/// Builtin tool name: revoke one session.
pub const DELETE_SESSION: &str = "delete_session";

/// Default wall-clock bound for subprocess tool execution.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors surfaced by [`InvocationRouter::invoke`]
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Descriptors for the builtin self-service tools, for docks that advertise
/// the catalog to an agent. Their `source` is never executed — the router
/// answers them inline.
pub fn builtin_tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            LIST_SESSIONS,
            "List credential sessions for the current thread (no tokens)",
            ToolSource::Program {
                program: String::new(),
                args: vec![],
            },
        ),
        ToolDescriptor::new(
            DELETE_SESSION,
            "Delete the credential session for a provider on the current thread",
            ToolSource::Program {
                program: String::new(),
                args: vec![],
            },
        )
        .with_parameter(ToolParameter::new("provider", "Provider to revoke", true))
        .with_parameter(ToolParameter::new(
            "profile",
            "Profile to revoke (defaults to the invoking profile)",
            false,
        )),
    ]
}

/// Routes invocations through credential checks into a runtime.
pub struct InvocationRouter {
    catalog: Arc<dyn ToolCatalog>,
    orchestrator: Arc<AuthOrchestrator>,
    process_runtime: Arc<dyn ToolRuntime>,
    browser_runtime: Arc<dyn ToolRuntime>,
    validator: DefaultToolValidator,
    tool_timeout: Duration,
    audit: Arc<dyn AuditLogger>,
}

impl InvocationRouter {
    pub fn new(
        catalog: Arc<dyn ToolCatalog>,
        orchestrator: Arc<AuthOrchestrator>,
        process_runtime: Arc<dyn ToolRuntime>,
        browser_runtime: Arc<dyn ToolRuntime>,
    ) -> Self {
        Self {
            catalog,
            orchestrator,
            process_runtime,
            browser_runtime,
            validator: DefaultToolValidator,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            audit: Arc::new(NoAuditLogger),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn orchestrator(&self) -> &Arc<AuthOrchestrator> {
        &self.orchestrator
    }

    /// Execute one invocation attempt.
    ///
    /// Returns `Interrupted` when one or more providers still need a human
    /// to finish authorizing — the caller surfaces the URLs, later calls
    /// [`AuthOrchestrator::finish`] per provider, and retries the identical
    /// invocation.
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationOutcome, InvokeError> {
        if request.tool_name == LIST_SESSIONS || request.tool_name == DELETE_SESSION {
            return self.invoke_builtin(request).await;
        }

        let descriptor = self
            .catalog
            .get(&request.tool_name)
            .ok_or_else(|| InvokeError::UnknownTool(request.tool_name.clone()))?;

        // Re-validated on every call, and before any credential lookup —
        // a malformed body must not cost a session-store read.
        self.validator
            .validate(&request.body, &descriptor)
            .map_err(InvokeError::Schema)?;

        let mut env = descriptor.env.clone();
        let mut pending_instructions: Vec<String> = Vec::new();

        for requirement in &descriptor.requirements {
            let outcome = self
                .orchestrator
                .ensure(
                    &requirement.provider,
                    &request.thread,
                    &request.profile,
                    &requirement.scopes,
                )
                .await?;
            match outcome {
                EnsureOutcome::Ready(context) => {
                    let projection = if request.is_profile_mode() {
                        context.env_map_for_profile(&request.profile)
                    } else {
                        context.env_map()
                    };
                    env.extend(projection);
                }
                EnsureOutcome::Pending { instructions } => {
                    pending_instructions.push(instructions);
                }
            }
        }

        if !pending_instructions.is_empty() {
            debug!(
                "Invoke: '{}' interrupted, {} provider(s) pending",
                request.tool_name,
                pending_instructions.len()
            );
            return Ok(InvocationOutcome::interrupted(
                pending_instructions.join("\n"),
            ));
        }

        let prepared = PreparedInvocation::new(&request.tool_name, descriptor.source.clone())
            .with_env(env)
            .with_body(request.body.clone())
            .with_timeout(self.tool_timeout);

        let runtime = match descriptor.isolation {
            Isolation::Process => &self.process_runtime,
            Isolation::Browser => &self.browser_runtime,
        };
        let output = runtime.run(&prepared).await?;

        info!(
            "Invoke: '{}' completed via {} runtime (error: {})",
            request.tool_name,
            descriptor.isolation,
            output.is_error()
        );
        self.audit.log(AuditEvent::new(
            "tool_invoked",
            json!({
                "tool": request.tool_name,
                "thread": request.thread,
                "profile": request.profile,
                "isolation": descriptor.isolation.as_str(),
                "error": output.error,
            }),
        ));

        Ok(InvocationOutcome::completed(output.render()))
    }

    /// Answer the builtin self-service tools without touching a runtime.
    async fn invoke_builtin(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationOutcome, InvokeError> {
        match request.tool_name.as_str() {
            LIST_SESSIONS => {
                let summaries = self.orchestrator.list_for_thread(&request.thread).await?;
                let body = serde_json::to_string_pretty(&summaries)
                    .unwrap_or_else(|_| "[]".to_string());
                Ok(InvocationOutcome::completed(body))
            }
            DELETE_SESSION => {
                let provider = request
                    .body
                    .get("provider")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        InvokeError::Schema(format!(
                            "Missing required parameter 'provider' for tool '{}'",
                            DELETE_SESSION
                        ))
                    })?;
                let profile = request
                    .body
                    .get("profile")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&request.profile);
                let deleted = self
                    .orchestrator
                    .delete(provider, &request.thread, profile)
                    .await?;
                Ok(InvocationOutcome::completed(deleted.to_string()))
            }
            other => Err(InvokeError::UnknownTool(other.to_string())),
        }
    }
}
