//! Tool catalog: the per-turn view of every tool the router may dispatch to

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::descriptor::ToolDescriptor;
use super::registry::ToolRegistry;
use crate::agents::SubAgentSpec;
use crate::llm::ToolSignature;
use crate::{Error, Result};

/// Snapshot of built-in sub-agents plus the registry's current tools
///
/// Built once at the start of each turn and never cached across turns, so a
/// tool registered between two turns is usable in the second one.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Read-through build: compiled-in sub-agents first, then the registry
    pub async fn load(builtins: &[Arc<SubAgentSpec>], registry: &dyn ToolRegistry) -> Result<Self> {
        let mut catalog = Self::default();

        for spec in builtins {
            catalog.insert(ToolDescriptor::sub_agent(spec.clone()));
        }

        for descriptor in registry.list_all().await? {
            if catalog.index.contains_key(&descriptor.name) {
                warn!(
                    "Registry tool '{}' shadows a built-in agent and is ignored",
                    descriptor.name
                );
                continue;
            }
            catalog.insert(descriptor);
        }

        debug!("Tool catalog loaded with {} entries", catalog.len());
        Ok(catalog)
    }

    fn insert(&mut self, descriptor: ToolDescriptor) {
        self.index.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Arc::new(descriptor));
    }

    /// Resolve a tool name, or `Error::ToolNotFound`
    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        self.index
            .get(name)
            .map(|&i| self.entries[i].clone())
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// Signatures handed to the oracle, in catalog order
    pub fn signatures(&self) -> Vec<ToolSignature> {
        self.entries.iter().map(|d| d.signature()).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
