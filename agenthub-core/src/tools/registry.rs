//! Tool Registry for registration, lookup and enumeration
//!
//! The `ToolRegistry` provides:
//! - Registration with duplicate detection
//! - Lookup by id
//! - Enumeration in registration order (the selector's tie-break)
//! - Summaries for tool listings
//!
//! Registration happens at startup through `&mut self`; afterwards the
//! registry is shared behind an `Arc` and only read, so no locking is needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use agenthub_core::tools::ToolRegistry;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(SearchTool::new()))?;
//! registry.register(Arc::new(CalculatorTool::new()))?;
//!
//! let tool = registry.lookup("search")?;
//! for tool in registry.all() {
//!     println!("{}", tool.id());
//! }
//! ```

use super::tool::Tool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Tool with this id already exists
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    /// Tool not found
    #[error("Tool '{0}' not found")]
    UnknownTool(String),
}

/// Summary of a tool for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool id
    pub id: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,
}

impl From<&dyn Tool> for ToolSummary {
    fn from(tool: &dyn Tool) -> Self {
        let descriptor = tool.descriptor();
        Self {
            id: descriptor.id.clone(),
            description: descriptor.description.clone(),
            input_schema: descriptor.parameters.to_json_schema(),
        }
    }
}

/// Registry of every tool the engine may dispatch to
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.tools.len())
            .field("tools", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    ///
    /// Returns an error if a tool with the same id is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let id = tool.id().to_string();
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateTool(id));
        }

        tracing::debug!(tool = %id, position = self.tools.len(), "Registered tool");
        self.index.insert(id, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Register multiple tools at once
    ///
    /// Stops at the first duplicate id.
    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = Arc<dyn Tool>>,
    ) -> Result<(), RegistryError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Get a tool by id
    pub fn lookup(&self, id: &str) -> Result<&Arc<dyn Tool>, RegistryError> {
        self.index
            .get(id)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| RegistryError::UnknownTool(id.to_string()))
    }

    /// Registration position of a tool
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Check if a tool is registered
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterate all tools in registration order
    ///
    /// The iterator is lazy and `Clone`; calling `all()` again restarts it.
    pub fn all(&self) -> std::slice::Iter<'_, Arc<dyn Tool>> {
        self.tools.iter()
    }

    /// Iterate tool ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.tools.iter().map(|tool| tool.id())
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// List all tools with their summaries
    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.tools
            .iter()
            .map(|tool| ToolSummary::from(tool.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{
        HandlerTool, KeywordHeuristic, ParamType, ParameterSchema, Parameters, ToolDescriptor,
        ToolInvocationError,
    };
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    fn tool(id: &str, description: &str) -> Arc<dyn Tool> {
        let descriptor = ToolDescriptor::new(id, description)
            .with_parameters(ParameterSchema::new().required("query", ParamType::String))
            .with_heuristic(KeywordHeuristic::new([id]));

        Arc::new(HandlerTool::new(
            descriptor,
            |params: Parameters, _cancel: CancellationToken| async move {
                Ok::<Value, ToolInvocationError>(Value::Object(params))
            },
        ))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        let search = tool("search", "Search the web for information");

        assert!(registry.register(Arc::clone(&search)).is_ok());
        assert!(registry.contains("search"));

        let found = registry.lookup("search").unwrap();
        assert!(Arc::ptr_eq(found, &search));
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.lookup("nonexistent").err(),
            Some(RegistryError::UnknownTool("nonexistent".to_string()))
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ToolRegistry::new();

        assert!(registry.register(tool("search", "first")).is_ok());
        assert!(matches!(
            registry.register(tool("search", "second")),
            Err(RegistryError::DuplicateTool(_))
        ));

        // The original registration is untouched
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("search").unwrap().descriptor().description, "first");
    }

    #[test]
    fn test_register_all() {
        let mut registry = ToolRegistry::new();
        assert!(registry
            .register_all([tool("search", "a"), tool("calculator", "b")])
            .is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_all_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for id in ["weather", "search", "calculator", "clock"] {
            registry.register(tool(id, id)).unwrap();
        }

        let ids: Vec<&str> = registry.all().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["weather", "search", "calculator", "clock"]);

        // Restartable: a second pass yields the same sequence
        let iter = registry.all();
        let first: Vec<&str> = iter.clone().map(|t| t.id()).collect();
        let second: Vec<&str> = iter.map(|t| t.id()).collect();
        assert_eq!(first, second);

        assert_eq!(registry.position("calculator"), Some(2));
    }

    #[test]
    fn test_summaries() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("search", "Search the web")).unwrap();

        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "search");
        assert!(summaries[0].input_schema.is_object());
        assert_eq!(summaries[0].input_schema["required"][0], "query");
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.all().count(), 0);
    }
}
