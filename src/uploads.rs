//! File uploads into the media storage.
//!
//! Files land in `<media_root>/uploads/<unix>_<name>` and are served back
//! under `/uploads/`.

use axum::{
    Json,
    extract::{Multipart, State},
};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;
use crate::error::PortalError;
use crate::storage::Role;
use crate::tools::media::MediaRoot;

/// Keep ASCII alphanumerics and `.-_`, replace the rest, drop leading dots.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send a full path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A file written to the uploads directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_name: String,
    /// Public path, `/uploads/<file_name>`.
    pub url: String,
}

pub async fn store_upload(
    media: &MediaRoot,
    original_name: &str,
    bytes: &[u8],
) -> std::io::Result<StoredUpload> {
    let dir = media.uploads_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let file_name = format!("{}_{}", Utc::now().timestamp(), sanitize_filename(original_name));
    tokio::fs::write(dir.join(&file_name), bytes).await?;

    tracing::info!(name: "upload.stored", file = %file_name, bytes = bytes.len(), "Upload stored");
    Ok(StoredUpload {
        url: format!("/uploads/{file_name}"),
        file_name,
    })
}

/// Named file part of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Collected multipart form: text fields and the first file per field name.
#[derive(Debug, Default)]
pub struct FormParts {
    pub text: std::collections::HashMap<String, String>,
    pub files: std::collections::HashMap<String, UploadedFile>,
}

impl FormParts {
    pub async fn read(mut multipart: Multipart) -> Result<Self, PortalError> {
        let mut parts = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?.to_vec();
                    parts.files.entry(name).or_insert(UploadedFile {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let value = field.text().await?;
                    parts.text.insert(name, value);
                }
            }
        }
        Ok(parts)
    }

    /// The file under `field`, rejecting a missing part or an empty filename.
    pub fn take_file(&mut self, field: &str) -> Result<UploadedFile, PortalError> {
        let file = self
            .files
            .remove(field)
            .ok_or_else(|| PortalError::BadRequest(format!("No {field} part in the request")))?;
        if file.file_name.is_empty() {
            return Err(PortalError::BadRequest("No selected file".to_string()));
        }
        Ok(file)
    }
}

#[derive(Debug, Serialize)]
pub struct HddUploadResponse {
    pub success: bool,
    pub path: String,
}

/// POST /upload_to_hdd
pub async fn upload_to_hdd(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<HddUploadResponse>, PortalError> {
    let mut form = FormParts::read(multipart).await?;
    let file = form.take_file("file")?;
    let stored = store_upload(&state.media, &file.file_name, &file.bytes).await?;
    Ok(Json(HddUploadResponse {
        success: true,
        path: stored.url,
    }))
}

#[derive(Debug, Serialize)]
pub struct PhotoUploadResponse {
    pub success: bool,
    pub file_url: String,
}

/// POST /upload_photo
///
/// Also records the upload in today's history.
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PhotoUploadResponse>, PortalError> {
    let mut form = FormParts::read(multipart).await?;
    let file = form.take_file("photo")?;
    let stored = store_upload(&state.media, &file.file_name, &file.bytes).await?;

    state
        .store
        .save_message(
            Role::User,
            &format!("画像をアップロードしました: {}", stored.file_name),
            Some(&stored.url),
            None,
        )
        .await?;

    Ok(Json(PhotoUploadResponse {
        success: true,
        file_url: stored.url,
    }))
}
