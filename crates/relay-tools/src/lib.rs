//! # Relay Tools
//!
//! Tool registry and built-in executors for the LLM gateway's tool loop.
//!
//! An executor contract worth noting: invalid JSON arguments are an error,
//! but user-facing validation failures (division by zero, unknown location)
//! come back as a *successful* result whose text starts with "Error: ...".
//! The model reads that text and composes the user-facing reply itself.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calculator;
pub mod news;
pub mod weather;

pub use calculator::CalculatorTool;
pub use news::NewsTool;
pub use weather::WeatherTool;

use async_trait::async_trait;
use relay_core::{RelayError, RelayResult, Tool};
use std::collections::HashMap;
use std::sync::Arc;

/// User agent sent by network-backed executors.
pub const TOOL_USER_AGENT: &str = "LLM-Gateway-Agent/1.0";

/// The contract every tool implements.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The schema shown to the model.
    fn definition(&self) -> Tool;

    /// Run the tool with JSON-encoded `arguments` and return text for the
    /// model.
    ///
    /// # Errors
    /// Returns an error for malformed arguments or infrastructure failures;
    /// input problems a user could fix are reported as `Ok("Error: ...")`.
    async fn execute(&self, arguments: &str) -> RelayResult<String>;
}

/// Registry mapping tool names to executors.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition name. Registering the same name
    /// twice overwrites the earlier executor.
    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) {
        let name = tool.definition().function.name;
        self.tools.insert(name, tool);
    }

    /// Definitions of all registered tools, sorted by name for stable
    /// serialization.
    #[must_use]
    pub fn definitions(&self) -> Vec<Tool> {
        let mut defs: Vec<Tool> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Execute the named tool.
    ///
    /// # Errors
    /// Returns a tool error when no tool has that name, plus whatever the
    /// executor itself returns.
    pub async fn execute(&self, name: &str, arguments: &str) -> RelayResult<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RelayError::tool(format!("tool '{name}' not found")))?;
        tool.execute(arguments).await
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", "{}").await.unwrap_err();
        assert!(err.to_string().contains("'nope' not found"));
    }

    #[tokio::test]
    async fn double_registration_overwrites() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool::new()));
        registry.register(Arc::new(CalculatorTool::new()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn definitions_are_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(WeatherTool::new()));
        registry.register(Arc::new(CalculatorTool::new()));
        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|t| t.function.name)
            .collect();
        assert_eq!(names, vec!["calculate", "getCurrentWeather"]);
    }
}
