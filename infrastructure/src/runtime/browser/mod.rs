//! Browser-hosted sandbox runtime
//!
//! For tools whose trust boundary must be stronger than a local process:
//! the script runs inside a cross-origin-isolated page in a shared headless
//! browser, and the page reports its result to the completion endpoint.
//!
//! `run` is exactly the pending-operation protocol: create an operation,
//! render and register the page, navigate a fresh browser page to it, await
//! the operation, discard the page. The three failure modes — navigation
//! failure, interpreter bootstrap failure, script exception — all resolve
//! the operation with an error value; none may leave the host waiting.

pub mod chromium;
pub mod page;
pub mod payload;

pub use chromium::{ChromiumHost, PageHost, SharedChromium};

use crate::http::PageStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use toolgate_application::{
    OperationOutcome, PendingOperations, PreparedInvocation, RuntimeError, ToolRuntime,
};
use toolgate_domain::{Isolation, RuntimeOutput, ToolSource};
use tracing::{debug, warn};
use uuid::Uuid;

/// Runtime that executes script tools in sandbox pages.
pub struct BrowserRuntime {
    host: Arc<dyn PageHost>,
    pending: Arc<PendingOperations>,
    pages: Arc<PageStore>,
    /// Public base URL pages are served from and report back to
    public_base_url: String,
    /// URL of the interpreter bundle embedded in every page
    interpreter_url: String,
}

impl BrowserRuntime {
    pub fn new(
        host: Arc<dyn PageHost>,
        pending: Arc<PendingOperations>,
        pages: Arc<PageStore>,
        public_base_url: impl Into<String>,
        interpreter_url: impl Into<String>,
    ) -> Self {
        Self {
            host,
            pending,
            pages,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            interpreter_url: interpreter_url.into(),
        }
    }

    fn page_url(&self, operation_id: &str) -> String {
        format!("{}/sandbox/scripts/{}", self.public_base_url, operation_id)
    }

    fn done_url(&self, operation_id: &str) -> String {
        format!(
            "{}/sandbox/scripts/{}/done",
            self.public_base_url, operation_id
        )
    }
}

#[async_trait]
impl ToolRuntime for BrowserRuntime {
    fn isolation(&self) -> Isolation {
        Isolation::Browser
    }

    async fn run(&self, prepared: &PreparedInvocation) -> Result<RuntimeOutput, RuntimeError> {
        let source = match &prepared.source {
            ToolSource::Script { source } => source,
            ToolSource::Program { .. } => {
                return Err(RuntimeError::UnsupportedSource(format!(
                    "tool '{}' has a program source; route it to the subprocess runtime",
                    prepared.tool_name
                )));
            }
        };

        let operation_id = Uuid::new_v4().to_string();
        let html = page::render_page(&page::PageInputs {
            source,
            env: &prepared.env,
            body: &prepared.body,
            interpreter_url: &self.interpreter_url,
            done_url: &self.done_url(&operation_id),
        })?;
        self.pages.insert(operation_id.clone(), html);

        let mut meta = HashMap::new();
        meta.insert("tool".to_string(), prepared.tool_name.clone());
        let slot = self.pending.create(operation_id.clone(), meta);

        debug!(
            "Browser: navigating sandbox page for '{}' (operation {})",
            prepared.tool_name, operation_id
        );
        let page_id = match self.host.open_page(&self.page_url(&operation_id)).await {
            Ok(page_id) => Some(page_id),
            Err(e) => {
                // The waiter below must still see a result; a navigation
                // failure resolves the operation instead of erroring past it.
                warn!(
                    "Browser: navigation failed for '{}': {}",
                    prepared.tool_name, e
                );
                let _ = self.pending.resolve(
                    &operation_id,
                    OperationOutcome::Failed(format!("page navigation failed: {}", e)),
                );
                None
            }
        };

        let outcome = slot.wait().await;

        self.pending.remove(&operation_id);
        self.pages.remove(&operation_id);
        if let Some(page_id) = page_id {
            self.host.close_page(&page_id).await;
        }

        match outcome {
            OperationOutcome::Delivered(value) => serde_json::from_value::<RuntimeOutput>(value)
                .map_err(|e| RuntimeError::Encoding(format!("malformed done payload: {}", e))),
            OperationOutcome::Failed(message) => Ok(RuntimeOutput::failure(message)),
        }
    }
}
