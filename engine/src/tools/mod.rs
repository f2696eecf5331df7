pub mod swarm;
pub mod think;
pub mod workspace;

pub use swarm::SwarmTool;
pub use think::DeepThinkTool;
pub use workspace::{ListDirTool, ReadFileTool, Workspace, WriteFileTool};

use async_trait::async_trait;
use sdk::{EngineError, ToolOutput};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A tool the commander model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One line shown in the system prompt
    fn description(&self) -> &str;

    /// Example arguments object shown in the system prompt
    fn usage(&self) -> &str;

    /// Whether identical calls under identical artifact state may be served
    /// from the result cache, which outlives the turn and the process.
    /// Tools with side effects, or whose result depends on state that can
    /// change outside the artifact set (such as files on disk), return false.
    fn cacheable(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError>;
}

/// Registry of available tools, dispatched by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry with no tools enabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn is_cacheable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.cacheable())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a tool call by name.
    ///
    /// Failures come back as an error [`ToolOutput`] so the model can see
    /// what went wrong and self-correct.
    pub async fn dispatch(&self, name: &str, args: &Value) -> ToolOutput {
        debug!("Dispatching tool '{}' with args: {}", name, args);

        let Some(tool) = self.get(name) else {
            warn!("Unknown tool requested: {}", name);
            return ToolOutput::error(format!(
                "{}. Available tools: {}",
                EngineError::ToolNotFound(name.to_string()),
                self.names().join(", ")
            ));
        };

        match tool.execute(args).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                ToolOutput::error(e.to_string())
            }
        }
    }

    /// Generate a system prompt describing the available tools.
    pub fn system_prompt(&self) -> String {
        let mut parts = vec![
            "You are Brain, a commander agent that uses tools to accomplish tasks.".to_string(),
            String::new(),
            "RULES:".to_string(),
            "1. To call a tool, reply with ONLY the JSON object below. No prose, no markdown fences.".to_string(),
            "2. Once you have what you need, reply in plain text with the final answer.".to_string(),
            "3. Never invent tool output. Calls may be refused with a \"blocked\" message; when that happens, answer with what you have.".to_string(),
            String::new(),
            "Tool call format:".to_string(),
            r#"{"function": "tool_name", "arguments": {"arg1": "value1"}}"#.to_string(),
            String::new(),
            "Available tools:".to_string(),
        ];

        for tool in &self.tools {
            parts.push(String::new());
            parts.push(format!("## {}", tool.name()));
            parts.push(tool.description().to_string());
            parts.push(format!("Arguments: {}", tool.usage()));
        }

        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments back."
        }
        fn usage(&self) -> &str {
            r#"{"text": "..."}"#
        }
        async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
            match args.get("text").and_then(Value::as_str) {
                Some(text) => Ok(ToolOutput::text(text)),
                None => Err(EngineError::ToolError("missing 'text'".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_known_tool() {
        let registry = ToolRegistry::empty().with(Arc::new(Echo));
        let out = registry.dispatch("echo", &json!({"text": "hi"})).await;
        assert!(out.success);
        assert_eq!(out.data["text"], "hi");
    }

    #[tokio::test]
    async fn test_tool_errors_become_outputs() {
        let registry = ToolRegistry::empty().with(Arc::new(Echo));
        let out = registry.dispatch("echo", &json!({})).await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("missing 'text'"));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let registry = ToolRegistry::empty().with(Arc::new(Echo));
        let out = registry.dispatch("nope", &json!({})).await;
        assert!(out.error.unwrap().contains("Available tools: echo"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Echo));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_cacheable("echo"));
        assert!(!registry.is_cacheable("missing"));
        assert!(registry.system_prompt().contains("## echo"));
    }
}
