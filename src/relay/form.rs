//! `POST /api/chat`: multipart fallback for clients without a socket.
//!
//! The reply still arrives as a `chat_update` broadcast.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use base64::Engine as _;
use serde::Serialize;

use crate::AppState;
use crate::error::PortalError;
use crate::ui::Composer;
use crate::uploads::{FormParts, store_upload};

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub accepted: bool,
}

pub async fn api_chat(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Accepted>), PortalError> {
    let mut form = FormParts::read(multipart).await?;
    let message = form.text.remove("message").unwrap_or_default();
    let model = form
        .text
        .remove("model")
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.assistant.default_model.clone());

    let mut composer = Composer::new(message);
    let mut uploaded = None;
    if let Some(file) = form.files.remove("file").filter(|f| !f.file_name.is_empty()) {
        let mime = file
            .content_type
            .clone()
            .unwrap_or_else(|| mime_guess::from_path(&file.file_name).first_or_octet_stream().to_string());
        composer = composer.with_attachment(base64::engine::general_purpose::STANDARD.encode(&file.bytes), mime);
        match store_upload(&state.media, &file.file_name, &file.bytes).await {
            Ok(stored) => uploaded = Some(stored.url),
            // Inline payload is still sent
            Err(e) => tracing::warn!(name: "upload.failed", error = %e, "Chat attachment upload failed"),
        }
    }

    let req = composer
        .submit(&model, uploaded)
        .ok_or_else(|| PortalError::BadRequest("empty message".to_string()))?;
    state.chat.dispatch(req, None);

    Ok((StatusCode::ACCEPTED, Json(Accepted { accepted: true })))
}
