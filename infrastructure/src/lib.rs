//! Infrastructure layer for toolgate
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: credential handlers, session store backends, tool
//! runtimes, the HTTP callback surface, configuration loading, and audit
//! logging.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod http;
pub mod logging;
pub mod runtime;
pub mod store;

// Re-export commonly used types
pub use auth::{OAuth2Handler, ProviderDescriptor, StaticTokenHandler};
pub use catalog::StaticToolCatalog;
pub use config::{ConfigLoader, ConfigValidationError, FileConfig};
pub use http::{AppState, PageStore, build_router, serve};
pub use logging::JsonlAuditLogger;
pub use runtime::{
    BrowserRuntime, SubprocessRuntime,
    browser::{ChromiumHost, PageHost, SharedChromium},
};
pub use store::{FileSessionStore, MemorySessionStore};
