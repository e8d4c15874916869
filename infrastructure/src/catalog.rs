//! Static tool catalog
//!
//! Tools come from the `[tools.*]` tables of the config file. Repository
//! synchronization and lock files live outside this crate; by the time a
//! descriptor reaches this catalog it is plain data.

use std::collections::HashMap;
use toolgate_application::ToolCatalog;
use toolgate_domain::ToolDescriptor;

/// Catalog backed by a fixed set of descriptors.
#[derive(Debug, Clone, Default)]
pub struct StaticToolCatalog {
    tools: HashMap<String, ToolDescriptor>,
}

impl StaticToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        Self {
            tools: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.name.clone(), descriptor))
                .collect(),
        }
    }

    /// Register a descriptor (builder pattern).
    pub fn register(mut self, descriptor: ToolDescriptor) -> Self {
        self.tools.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolCatalog for StaticToolCatalog {
    fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}
