//! External tools served over the Model Context Protocol.
//!
//! Calendar, Drive, Gmail and web search live outside the portal. Any MCP
//! server listed in `mcp.json` is connected at startup and its tools are
//! offered to the model as `<server>__<tool>`:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "calendar": { "command": "npx", "args": ["-y", "@example/google-calendar-mcp"] },
//!     "search":   { "url": "https://search.example/mcp", "env": {} }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use rmcp::{
    model::{CallToolRequestParam, Tool},
    service::ServiceExt,
    transport::{StreamableHttpClientTransport, TokioChildProcess},
};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct McpConfig {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum McpServerEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    RemoteHttp {
        url: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

/// Replace `${NAME}` placeholders with process environment values.
/// Unknown names are left in place.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = input.to_string();
    for (k, v) in std::env::vars() {
        let needle = format!("${{{k}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &v);
        }
    }
    out
}

type DynClientService = rmcp::service::RunningService<
    rmcp::service::RoleClient,
    Box<dyn rmcp::service::DynService<rmcp::service::RoleClient>>,
>;

/// Connected MCP servers and their namespaced tools.
pub struct McpTools {
    services: HashMap<String, Arc<DynClientService>>,
    // namespaced name -> (server, raw tool name)
    index: HashMap<String, (String, String)>,
    tools: Vec<(String, Tool)>,
}

impl std::fmt::Debug for McpTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTools")
            .field("servers", &self.services.keys().collect::<Vec<_>>())
            .field("tool_count", &self.tools.len())
            .finish()
    }
}

impl McpTools {
    /// Connect every server in the file. A missing file means no MCP tools.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let txt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let cfg: McpConfig = serde_json::from_str(&txt)?;
        Ok(Some(Self::connect(&cfg).await?))
    }

    pub async fn connect(cfg: &McpConfig) -> anyhow::Result<Self> {
        let mut services: HashMap<String, Arc<DynClientService>> = HashMap::new();

        for (name, entry) in &cfg.mcp_servers {
            let svc = match entry {
                McpServerEntry::Stdio { command, args, env } => {
                    let mut cmd = Command::new(command);
                    cmd.args(args);
                    for (k, v) in env {
                        cmd.env(k, expand_env_placeholders(v));
                    }
                    let transport = TokioChildProcess::new(cmd)?;
                    ().into_dyn()
                        .serve(transport)
                        .await
                        .with_context(|| format!("failed to connect stdio MCP server '{name}'"))?
                }
                McpServerEntry::RemoteHttp { url, .. } => {
                    let url = expand_env_placeholders(url);
                    let transport = StreamableHttpClientTransport::from_uri(url);
                    ().into_dyn()
                        .serve(transport)
                        .await
                        .with_context(|| format!("failed to connect remote MCP server '{name}'"))?
                }
            };
            services.insert(name.clone(), Arc::new(svc));
        }

        let mut tools: Vec<(String, Tool)> = Vec::new();
        let mut index: HashMap<String, (String, String)> = HashMap::new();

        for (server_name, svc) in &services {
            let result = svc
                .list_tools(Default::default())
                .await
                .with_context(|| format!("tools/list failed for MCP server '{server_name}'"))?;

            for t in result.tools {
                let raw = t.name.to_string();
                let ns_name = sanitize_tool_name(&format!("{server_name}__{raw}"));
                tracing::info!(name: "mcp.tool.discovered", tool = %ns_name, "MCP tool discovered");
                index.insert(ns_name.clone(), (server_name.clone(), raw));
                tools.push((ns_name, t));
            }
        }

        Ok(Self {
            services,
            index,
            tools,
        })
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.tools.iter().map(|(name, _)| name.clone())
    }

    /// `(name, description, parameters schema)` for each tool.
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &str, serde_json::Value)> + '_ {
        self.tools.iter().map(|(name, t)| {
            let params = serde_json::to_value(&*t.input_schema)
                .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
            (
                name.as_str(),
                t.description.as_deref().unwrap_or(""),
                params,
            )
        })
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let (server_name, raw_tool_name) = self
            .index
            .get(name)
            .ok_or_else(|| anyhow!("unknown tool: {name}"))?;

        let service = self
            .services
            .get(server_name)
            .ok_or_else(|| anyhow!("missing server handle: {server_name}"))?;

        let res = service
            .call_tool(CallToolRequestParam {
                name: raw_tool_name.clone().into(),
                arguments: arguments.as_object().cloned(),
            })
            .await
            .with_context(|| format!("tools/call failed for {server_name}::{raw_tool_name}"))?;

        Ok(serde_json::to_value(res)?)
    }
}

/// Function names must match `^[a-zA-Z0-9_-]+$`.
fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
