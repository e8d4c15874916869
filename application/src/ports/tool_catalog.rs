//! Tool Catalog port
//!
//! Resolves a tool identifier to its executable descriptor plus declared
//! credential requirements. Catalog population (package repositories,
//! lock-file sync) happens behind this interface and is not this crate's
//! concern.

use toolgate_domain::ToolDescriptor;

/// Port for tool resolution
pub trait ToolCatalog: Send + Sync {
    /// Resolve a tool by name.
    fn get(&self, name: &str) -> Option<ToolDescriptor>;

    /// Names of all known tools.
    fn names(&self) -> Vec<String>;

    /// Check if a tool is known.
    fn has_tool(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}
