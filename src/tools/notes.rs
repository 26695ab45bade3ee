//! Daily notes kept in the chat database.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::storage::{ChatStore, NoteStatus};

use super::NativeTool;

#[derive(Debug, Deserialize)]
struct SaveNoteArgs {
    content: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReadNoteArgs {
    #[serde(default)]
    date: Option<String>,
}

/// `YYYY-MM-DD`, or today when absent or blank.
fn resolve_date(date: Option<&str>) -> anyhow::Result<NaiveDate> {
    match date.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(Local::now().date_naive()),
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid date '{d}': {e}")),
    }
}

#[derive(Debug)]
pub struct SaveNoteTool {
    store: ChatStore,
}

impl SaveNoteTool {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NativeTool for SaveNoteTool {
    fn name(&self) -> &str {
        "save_note"
    }

    fn description(&self) -> &str {
        "Save or append a note for a date (YYYY-MM-DD). Defaults to today."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "Text to add to the note"},
                "date": {"type": "string", "description": "YYYY-MM-DD, defaults to today"}
            },
            "required": ["content"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let args: SaveNoteArgs = serde_json::from_value(args)?;
        let date = resolve_date(args.date.as_deref())?;
        let status = self.store.save_note(date, &args.content).await?;
        tracing::debug!(name: "tool.save_note", date = %date, status = ?status, "Note saved");

        let message = match status {
            NoteStatus::Duplicate => format!("そのメモ「{}」は{date}に既に存在します。", args.content),
            NoteStatus::Created | NoteStatus::Appended => format!("メモを{date}に保存しました。"),
        };
        Ok(serde_json::Value::String(message))
    }
}

#[derive(Debug)]
pub struct ReadNoteTool {
    store: ChatStore,
}

impl ReadNoteTool {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NativeTool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read the note of a date (YYYY-MM-DD). Defaults to today."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "YYYY-MM-DD, defaults to today"}
            }
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let args: ReadNoteArgs = if args.is_null() {
            ReadNoteArgs::default()
        } else {
            serde_json::from_value(args)?
        };
        let date = resolve_date(args.date.as_deref())?;

        let message = match self.store.note(date).await? {
            Some(content) => format!("{date}のメモ:\n{content}"),
            None => format!("{date}にはメモがありません。"),
        };
        Ok(serde_json::Value::String(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_read() {
        let store = ChatStore::in_memory().await.unwrap();
        let save = SaveNoteTool::new(store.clone());
        let read = ReadNoteTool::new(store);

        let out = save
            .call(serde_json::json!({"content": "ゴミ出し", "date": "2026-10-19"}))
            .await
            .unwrap();
        assert_eq!(out, "メモを2026-10-19に保存しました。");

        let dup = save
            .call(serde_json::json!({"content": "ゴミ出し", "date": "2026-10-19"}))
            .await
            .unwrap();
        assert_eq!(dup, "そのメモ「ゴミ出し」は2026-10-19に既に存在します。");

        let note = read.call(serde_json::json!({"date": "2026-10-19"})).await.unwrap();
        assert_eq!(note, "2026-10-19のメモ:\nゴミ出し");
    }

    #[tokio::test]
    async fn test_read_missing_note() {
        let store = ChatStore::in_memory().await.unwrap();
        let read = ReadNoteTool::new(store);
        let out = read.call(serde_json::json!({"date": "2001-01-01"})).await.unwrap();
        assert_eq!(out, "2001-01-01にはメモがありません。");
    }

    #[test]
    fn test_resolve_date() {
        assert_eq!(resolve_date(None).unwrap(), Local::now().date_naive());
        assert_eq!(resolve_date(Some("  ")).unwrap(), Local::now().date_naive());
        assert!(resolve_date(Some("19/10/2026")).is_err());
    }
}
