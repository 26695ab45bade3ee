//! Registered desktop apps, launched through the client's protocol handler.
//!
//! Only the registered name travels in the launch signal. The executable path
//! stays in the database and is resolved by the local launcher.

use async_trait::async_trait;
use serde::Deserialize;

use crate::launcher::launch_signal;
use crate::storage::ChatStore;

use super::NativeTool;

#[derive(Debug, Deserialize)]
struct RegisterArgs {
    app_name: String,
    exe_path: String,
}

#[derive(Debug, Deserialize)]
struct LaunchArgs {
    app_name: String,
}

#[derive(Debug)]
pub struct RegisterAppTool {
    store: ChatStore,
}

impl RegisterAppTool {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NativeTool for RegisterAppTool {
    fn name(&self) -> &str {
        "register_app"
    }

    fn description(&self) -> &str {
        "Register a desktop application under a name so it can be launched later."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "app_name": {"type": "string"},
                "exe_path": {"type": "string", "description": "Full path of the executable"}
            },
            "required": ["app_name", "exe_path"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let args: RegisterArgs = serde_json::from_value(args)?;
        self.store.register_app(&args.app_name, &args.exe_path).await?;
        tracing::info!(name: "tool.register_app", app = %args.app_name, "App registered");
        Ok(serde_json::Value::String(format!(
            "了解だよ！『{}』を登録したから、いつでも起動できるよ。",
            args.app_name
        )))
    }
}

#[derive(Debug)]
pub struct LaunchAppTool {
    store: ChatStore,
}

impl LaunchAppTool {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NativeTool for LaunchAppTool {
    fn name(&self) -> &str {
        "launch_app"
    }

    fn description(&self) -> &str {
        "Launch a previously registered desktop application by name."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "app_name": {"type": "string"}
            },
            "required": ["app_name"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let args: LaunchArgs = serde_json::from_value(args)?;
        let message = match self.store.find_app(&args.app_name).await? {
            Some(app) => launch_signal(&app.app_name),
            None => format!("ごめんね、『{}』はまだ登録されていないみたい。", args.app_name),
        };
        Ok(serde_json::Value::String(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_requires_registration() {
        let store = ChatStore::in_memory().await.unwrap();
        let register = RegisterAppTool::new(store.clone());
        let launch = LaunchAppTool::new(store);

        let miss = launch.call(serde_json::json!({"app_name": "ZZZ"})).await.unwrap();
        assert_eq!(miss, "ごめんね、『ZZZ』はまだ登録されていないみたい。");

        register
            .call(serde_json::json!({"app_name": "ZZZ", "exe_path": "C:\\Games\\ZZZ.exe"}))
            .await
            .unwrap();
        let hit = launch.call(serde_json::json!({"app_name": "ZZZ"})).await.unwrap();
        assert_eq!(hit, "🚀LAUNCH_SIGNAL:lefte-launch://ZZZ");
    }

    #[tokio::test]
    async fn test_missing_argument_is_error() {
        let store = ChatStore::in_memory().await.unwrap();
        let launch = LaunchAppTool::new(store);
        assert!(launch.call(serde_json::json!({})).await.is_err());
    }
}
