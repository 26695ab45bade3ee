//! Provider detection.
//!
//! Providers differ only in where the chat completions route lives.

/// Supported LLM providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Google Gemini through its `OpenAI` compatibility layer
    Gemini,
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Local or self-hosted server (Ollama, llama.cpp, vLLM)
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("generativelanguage.googleapis.com") {
            Self::Gemini
        } else if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Build the chat completions URL for this provider.
    ///
    /// Gemini's base URL already carries its version segment
    /// (`.../v1beta/openai`), so no `/v1` is inserted.
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::Gemini => format!("{base}/chat/completions"),
            Self::OpenRouter if base.ends_with("/api/v1") => format!("{base}/chat/completions"),
            _ if base.ends_with("/v1") => format!("{base}/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_gemini() {
        let provider =
            Provider::detect_from_url("https://generativelanguage.googleapis.com/v1beta/openai/");
        assert_eq!(provider, Provider::Gemini);
    }

    #[test]
    fn test_detect_openai() {
        assert_eq!(
            Provider::detect_from_url("https://api.openai.com"),
            Provider::OpenAI
        );
    }

    #[test]
    fn test_detect_local_is_generic() {
        assert_eq!(
            Provider::detect_from_url("http://127.0.0.1:11434"),
            Provider::Generic
        );
    }

    #[test]
    fn test_build_url_gemini() {
        let url = Provider::Gemini
            .build_chat_url("https://generativelanguage.googleapis.com/v1beta/openai/");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn test_build_url_openai() {
        let url = Provider::OpenAI.build_chat_url("https://api.openai.com");
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_build_url_openrouter() {
        let url = Provider::OpenRouter.build_chat_url("https://openrouter.ai/api/v1");
        assert_eq!(url, "https://openrouter.ai/api/v1/chat/completions");
    }
}
