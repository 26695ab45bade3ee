//! Browsing the media storage directory.
//!
//! All paths are resolved lexically against [`MediaRoot`]; anything that
//! would leave the root is refused before touching the filesystem.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Deserialize;

use super::NativeTool;

/// Characters returned by `read_media_text`.
pub const TEXT_PREVIEW_CHARS: usize = 4000;

const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Debug, Clone)]
pub struct MediaRoot {
    root: PathBuf,
}

impl MediaRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Join `relative` onto the root. `None` when the result escapes it.
    ///
    /// Empty input, `"."` and the literal `''` all mean the root itself.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = relative.trim();
        if relative.is_empty() || relative == "''" {
            return Some(self.root.clone());
        }

        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    parts.pop()?;
                }
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        let mut resolved = self.root.clone();
        resolved.extend(parts);
        Some(resolved)
    }
}

fn format_mtime(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| "-".to_string())
}

fn is_photo(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PHOTO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[derive(Debug)]
pub struct ListPhotosTool {
    media: MediaRoot,
}

impl ListPhotosTool {
    pub fn new(media: MediaRoot) -> Self {
        Self { media }
    }
}

#[async_trait]
impl NativeTool for ListPhotosTool {
    fn name(&self) -> &str {
        "list_photos"
    }

    fn description(&self) -> &str {
        "List URLs of uploaded photos."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let dir = self.media.uploads_dir();
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok("写真アップロード用のディレクトリがまだ作成されていません。".into());
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut photos = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_photo(&name) {
                photos.push(format!("/uploads/{name}"));
            }
        }
        photos.sort();

        if photos.is_empty() {
            return Ok("まだ写真はありません。".into());
        }
        Ok(format!("アップロード済みの写真一覧:\n{}", photos.join("\n")).into())
    }
}

#[derive(Debug, Deserialize)]
struct ListMediaArgs {
    #[serde(default)]
    directory_path: String,
}

#[derive(Debug)]
pub struct ListMediaTool {
    media: MediaRoot,
}

impl ListMediaTool {
    pub fn new(media: MediaRoot) -> Self {
        Self { media }
    }
}

#[async_trait]
impl NativeTool for ListMediaTool {
    fn name(&self) -> &str {
        "list_media"
    }

    fn description(&self) -> &str {
        "List files and folders in the media storage with size and modification time. Use \".\" for the root."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "directory_path": {"type": "string", "description": "Path relative to the media root"}
            },
            "required": ["directory_path"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let args: ListMediaArgs = serde_json::from_value(args)?;
        let Some(target) = self.media.resolve(&args.directory_path) else {
            return Ok("Error: アクセスが許可されていない領域です。".into());
        };
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(format!("Error: '{}' は見つかりませんでした。", args.directory_path).into());
        }

        let mut entries = tokio::fs::read_dir(&target).await?;
        let mut lines = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await?;
            let mtime = format_mtime(&meta);
            if meta.is_dir() {
                lines.push(format!("[DIR] {name} (Size: -, Updated: {mtime})"));
            } else {
                #[allow(clippy::cast_precision_loss)]
                let kb = meta.len() as f64 / 1024.0;
                lines.push(format!("[FILE] {name} (Size: {kb:.1} KB, Updated: {mtime})"));
            }
        }
        lines.sort();

        if lines.is_empty() {
            return Ok("このフォルダは空です。".into());
        }
        Ok(lines.join("\n").into())
    }
}

#[derive(Debug, Deserialize)]
struct ReadTextArgs {
    file_path: String,
}

#[derive(Debug)]
pub struct ReadMediaTextTool {
    media: MediaRoot,
}

impl ReadMediaTextTool {
    pub fn new(media: MediaRoot) -> Self {
        Self { media }
    }
}

#[async_trait]
impl NativeTool for ReadMediaTextTool {
    fn name(&self) -> &str {
        "read_media_text"
    }

    fn description(&self) -> &str {
        "Read the beginning of a UTF-8 text file in the media storage."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Path relative to the media root"}
            },
            "required": ["file_path"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let args: ReadTextArgs = serde_json::from_value(args)?;
        let Some(target) = self.media.resolve(&args.file_path) else {
            return Ok("Error: アクセス権限がありません。".into());
        };
        match tokio::fs::read_to_string(&target).await {
            Ok(text) => Ok(text.chars().take(TEXT_PREVIEW_CHARS).collect::<String>().into()),
            Err(e) => Ok(format!("Error: {e}").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_confines_to_root() {
        let media = MediaRoot::new("/srv/media");
        assert_eq!(media.resolve("").unwrap(), PathBuf::from("/srv/media"));
        assert_eq!(media.resolve("''").unwrap(), PathBuf::from("/srv/media"));
        assert_eq!(media.resolve(".").unwrap(), PathBuf::from("/srv/media"));
        assert_eq!(
            media.resolve("movies/../docs/a.txt").unwrap(),
            PathBuf::from("/srv/media/docs/a.txt")
        );
        assert!(media.resolve("../etc/passwd").is_none());
        assert!(media.resolve("docs/../../x").is_none());
        assert!(media.resolve("/etc/passwd").is_none());
    }

    #[test]
    fn test_is_photo() {
        assert!(is_photo("a.PNG"));
        assert!(is_photo("b.webp"));
        assert!(!is_photo("c.txt"));
        assert!(!is_photo("jpg"));
    }

    #[tokio::test]
    async fn test_list_and_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/memo.txt"), "あ".repeat(5000)).unwrap();
        let media = MediaRoot::new(dir.path());

        let listing = ListMediaTool::new(media.clone())
            .call(serde_json::json!({"directory_path": "."}))
            .await
            .unwrap();
        assert!(listing.as_str().unwrap().starts_with("[DIR] docs"));

        let text = ReadMediaTextTool::new(media.clone())
            .call(serde_json::json!({"file_path": "docs/memo.txt"}))
            .await
            .unwrap();
        assert_eq!(text.as_str().unwrap().chars().count(), TEXT_PREVIEW_CHARS);

        let refused = ReadMediaTextTool::new(media)
            .call(serde_json::json!({"file_path": "../secret"}))
            .await
            .unwrap();
        assert_eq!(refused, "Error: アクセス権限がありません。");
    }

    #[tokio::test]
    async fn test_list_photos() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaRoot::new(dir.path());
        let tool = ListPhotosTool::new(media.clone());

        let none = tool.call(serde_json::Value::Null).await.unwrap();
        assert_eq!(none, "写真アップロード用のディレクトリがまだ作成されていません。");

        std::fs::create_dir(media.uploads_dir()).unwrap();
        std::fs::write(media.uploads_dir().join("1_cat.jpg"), b"x").unwrap();
        std::fs::write(media.uploads_dir().join("2_notes.txt"), b"x").unwrap();

        let out = tool.call(serde_json::Value::Null).await.unwrap();
        assert_eq!(out, "アップロード済みの写真一覧:\n/uploads/1_cat.jpg");
    }
}
