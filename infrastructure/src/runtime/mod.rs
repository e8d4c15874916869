//! Tool runtime adapters
//!
//! [`subprocess::SubprocessRuntime`] runs a tool in a fresh worker process;
//! [`browser::BrowserRuntime`] runs script tools inside a cross-origin-
//! isolated page in a shared headless browser. Same port, same
//! interrupt/resume protocol around them.

pub mod browser;
pub mod subprocess;

pub use browser::BrowserRuntime;
pub use subprocess::SubprocessRuntime;
