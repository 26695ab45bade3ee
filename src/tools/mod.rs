//! Functions the assistant can call during a chat turn.
//!
//! Native tools run in-process against the portal's own storage. External
//! services (calendar, mail, web search) are attached as MCP servers listed in
//! `mcp.json`; see [`mcp`].

pub mod apps;
pub mod mcp;
pub mod media;
pub mod notes;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::storage::ChatStore;

use self::mcp::McpTools;

#[async_trait]
pub trait NativeTool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn schema(&self) -> serde_json::Value;
    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// Every tool the orchestrator may offer to the model.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    native: Arc<BTreeMap<String, Arc<dyn NativeTool>>>,
    mcp: Option<Arc<McpTools>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("native", &self.native.keys().collect::<Vec<_>>())
            .field("mcp_tool_count", &self.mcp.as_ref().map_or(0, |m| m.len()))
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes, app registry, photo listing and media browsing.
    #[must_use]
    pub fn assistant_tools(store: &ChatStore, media_root: PathBuf) -> Self {
        let media = media::MediaRoot::new(media_root);
        Self::new()
            .with_native_tool(Arc::new(notes::SaveNoteTool::new(store.clone())))
            .with_native_tool(Arc::new(notes::ReadNoteTool::new(store.clone())))
            .with_native_tool(Arc::new(apps::RegisterAppTool::new(store.clone())))
            .with_native_tool(Arc::new(apps::LaunchAppTool::new(store.clone())))
            .with_native_tool(Arc::new(media::ListPhotosTool::new(media.clone())))
            .with_native_tool(Arc::new(media::ListMediaTool::new(media.clone())))
            .with_native_tool(Arc::new(media::ReadMediaTextTool::new(media)))
    }

    #[must_use]
    pub fn with_native_tool(self, tool: Arc<dyn NativeTool>) -> Self {
        let mut native = (*self.native).clone();
        native.insert(tool.name().to_string(), tool);
        Self {
            native: Arc::new(native),
            mcp: self.mcp,
        }
    }

    #[must_use]
    pub fn with_mcp(self, mcp: McpTools) -> Self {
        Self {
            native: self.native,
            mcp: Some(Arc::new(mcp)),
        }
    }

    /// Names as the model sees them.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.native.keys().cloned().collect();
        if let Some(mcp) = &self.mcp {
            names.extend(mcp.names());
        }
        names
    }

    pub fn openai_tools_json(&self) -> Vec<serde_json::Value> {
        let mut tools: Vec<serde_json::Value> = self
            .native
            .values()
            .map(|t| function_json(t.name(), t.description(), t.schema()))
            .collect();
        if let Some(mcp) = &self.mcp {
            tools.extend(
                mcp.definitions()
                    .map(|(name, description, schema)| function_json(name, description, schema)),
            );
        }
        tools
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        if let Some(tool) = self.native.get(name) {
            return tool.call(arguments).await;
        }
        match &self.mcp {
            Some(mcp) if mcp.contains(name) => mcp.call(name, arguments).await,
            _ => Err(anyhow!("unknown tool: {name}")),
        }
    }
}

fn function_json(name: &str, description: &str, parameters: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters
        }
    })
}

/// Tool results are handed back to the model as plain text.
pub fn result_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
