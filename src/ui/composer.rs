//! The chat input box and its submit rule.

use crate::relay::events::ChatRequest;

/// A picked file, already read as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Composer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.attachment = Some(Attachment {
            base64: base64.into(),
            mime_type: mime_type.into(),
        });
        self
    }

    /// Build the relay request and clear the attachment.
    ///
    /// Nothing is sent for blank text without a file. When the file was
    /// uploaded first, only its server path is sent.
    pub fn submit(&mut self, model: &str, uploaded_path: Option<String>) -> Option<ChatRequest> {
        let message = self.text.trim().to_string();
        if message.is_empty() && self.attachment.is_none() {
            return None;
        }

        let attachment = self.attachment.take();
        self.text.clear();

        let image = match (&uploaded_path, &attachment) {
            (None, Some(a)) => Some(a.base64.clone()),
            _ => None,
        };
        Some(ChatRequest {
            message,
            model: Some(model.to_string()),
            image,
            image_url: uploaded_path,
            mime_type: attachment.map(|a| a.mime_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_only_sends_one_request_with_null_image() {
        let mut composer = Composer::new("天気は？");
        let req = composer.submit("gemini-3-flash-preview", None).unwrap();
        assert_eq!(req.message, "天気は？");
        assert_eq!(req.image, None);
        assert_eq!(req.image_url, None);
        assert_eq!(req.mime_type, None);

        let json = serde_json::to_value(&req).unwrap();
        assert!(json["image"].is_null());

        // Nothing left to send
        assert!(composer.submit("gemini-3-flash-preview", None).is_none());
    }

    #[test]
    fn test_blank_without_file_sends_nothing() {
        assert!(Composer::new("   ").submit("m", None).is_none());
    }

    #[test]
    fn test_uploaded_file_sends_path_not_payload() {
        let mut composer = Composer::new("これ").with_attachment("AAAA", "image/png");
        let req = composer.submit("m", Some("/uploads/1_a.png".to_string())).unwrap();
        assert_eq!(req.image, None);
        assert_eq!(req.image_url.as_deref(), Some("/uploads/1_a.png"));
        assert_eq!(req.mime_type.as_deref(), Some("image/png"));
        assert!(composer.attachment.is_none());
    }

    #[test]
    fn test_failed_upload_falls_back_to_inline() {
        let mut composer = Composer::default().with_attachment("AAAA", "image/jpeg");
        let req = composer.submit("m", None).unwrap();
        assert_eq!(req.message, "");
        assert_eq!(req.image.as_deref(), Some("AAAA"));
    }
}
