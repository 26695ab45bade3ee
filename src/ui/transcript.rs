//! Chat transcript: bubbles and their HTML.
//!
//! The same markup is produced for server-rendered history and mirrored by
//! `static/desktpo.js` for live updates.

use chrono::{Local, NaiveDateTime};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

use crate::relay::events::ServerEvent;
use crate::storage::StoredMessage;

/// Text of the placeholder bubble shown while the assistant works.
pub const THINKING_TEXT: &str = "確認中だよ……";
/// Element id of that placeholder, shared with the browser script.
pub const THINKING_ID: &str = "thinking-bubble";

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Whether a link or image target may be emitted: web, mail, inline images,
/// or a relative reference. Anything else with a scheme is dropped.
pub fn is_safe_url(dest: &str) -> bool {
    // Browsers ignore tabs and newlines inside schemes
    let dest: String = dest
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if ["http:", "https:", "mailto:", "data:image/"]
        .iter()
        .any(|p| dest.starts_with(p))
    {
        return true;
    }
    match dest.find(':') {
        None => true,
        Some(colon) => dest[..colon].contains(['/', '?', '#']),
    }
}

fn scrub_url(dest: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&dest) { dest } else { CowStr::Borrowed("#") }
}

/// Markdown to HTML. Raw HTML in the source is shown as text and unsafe link
/// targets become `#`.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
            link_type,
            dest_url: scrub_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
            link_type,
            dest_url: scrub_url(dest_url),
            title,
            id,
        }),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleRole {
    /// Assistant side, styled `gemini`.
    Gemini,
    User,
}

impl BubbleRole {
    /// `assistant` and `gemini` are the assistant; anything else is the user.
    pub fn from_role(role: &str) -> Self {
        match role {
            "assistant" | "gemini" => Self::Gemini,
            _ => Self::User,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::User => "user",
        }
    }
}

/// Normalize an image reference for `<img src>`.
pub fn image_src(image: &str) -> String {
    if image.starts_with("data:") || image.starts_with('/') {
        image.to_string()
    } else {
        format!("/{image}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub role: BubbleRole,
    pub text: String,
    pub image: Option<String>,
    pub voice_url: Option<String>,
    /// `HH:MM`
    pub time: String,
}

impl Bubble {
    pub fn new(role: BubbleRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            image: None,
            voice_url: None,
            time: Local::now().format("%H:%M").to_string(),
        }
    }

    pub fn from_stored(msg: &StoredMessage) -> Self {
        let time = NaiveDateTime::parse_from_str(&msg.timestamp, "%Y-%m-%d %H:%M:%S")
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        Self {
            role: BubbleRole::from_role(&msg.role),
            text: msg.content.clone(),
            image: msg.image_url.clone(),
            voice_url: msg.voice_url.clone(),
            time,
        }
    }

    pub fn render(&self) -> String {
        self.render_with_id(None)
    }

    /// Render with an element id on the outer `div`.
    pub fn render_with_id(&self, id: Option<&str>) -> String {
        let id = id
            .map(|id| format!(r#" id="{}""#, html_escape(id)))
            .unwrap_or_default();
        match self.role {
            BubbleRole::Gemini => {
                let voice = self
                    .voice_url
                    .as_deref()
                    .map(|url| {
                        format!(
                            r#"<button class="voice-btn" data-voice="{}">🔊 Listen</button>"#,
                            html_escape(url)
                        )
                    })
                    .unwrap_or_default();
                format!(
                    r#"<div{id} class="message gemini show"><div class="ai-avatar">L</div><div class="message-content"><div class="res-txt">{}</div><div class="message-footer"><span class="message-time">{}</span>{voice}</div></div></div>"#,
                    render_markdown(&self.text),
                    html_escape(&self.time),
                )
            }
            BubbleRole::User => {
                let image = self
                    .image
                    .as_deref()
                    .map(|img| format!(r#"<img class="message-image" src="{}">"#, html_escape(&image_src(img))))
                    .unwrap_or_default();
                format!(
                    r#"<div{id} class="message user show">{image}<div class="message-text">{}</div><span class="message-time">{}</span></div>"#,
                    html_escape(&self.text),
                    html_escape(&self.time),
                )
            }
        }
    }
}

/// Ordered bubbles plus the optional thinking placeholder.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    bubbles: Vec<Bubble>,
    thinking: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(rows: &[StoredMessage]) -> Self {
        Self {
            bubbles: rows.iter().map(Bubble::from_stored).collect(),
            thinking: false,
        }
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// The local echo of a submitted message, followed by the placeholder.
    pub fn submit(&mut self, text: &str, image: Option<&str>) {
        let mut bubble = Bubble::new(BubbleRole::User, text);
        bubble.image = image.map(str::to_string);
        self.bubbles.push(bubble);
        self.thinking = true;
    }

    /// Apply a relay event. Returns `true` when a bubble was appended.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::ChatUpdate(update) => {
                self.thinking = false;
                let mut bubble = Bubble::new(BubbleRole::Gemini, update.response.clone());
                bubble.voice_url.clone_from(&update.voice_url);
                self.bubbles.push(bubble);
                true
            }
            ServerEvent::AiThinking { active } => {
                self.thinking = *active;
                false
            }
            ServerEvent::ErrorMessage { .. } => {
                self.thinking = false;
                false
            }
            ServerEvent::SysStatus { .. } => false,
        }
    }

    pub fn render(&self) -> String {
        let mut out: String = self.bubbles.iter().map(Bubble::render).collect();
        if self.thinking {
            let placeholder = Bubble::new(BubbleRole::Gemini, THINKING_TEXT);
            out.push_str(&placeholder.render_with_id(Some(THINKING_ID)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::events::ChatUpdate;

    fn update(text: &str) -> ServerEvent {
        ServerEvent::ChatUpdate(ChatUpdate {
            user_message: "q".to_string(),
            response: text.to_string(),
            voice_url: Some("/wav_files/v_1.wav".to_string()),
            launch_url: None,
            timestamp: 0.0,
        })
    }

    #[test]
    fn test_chat_update_appends_exactly_one_bubble() {
        let mut t = Transcript::new();
        t.submit("こんにちは", None);
        assert!(t.is_thinking());
        assert_eq!(t.bubbles().len(), 1);

        assert!(t.apply(&update("やあ")));
        assert_eq!(t.bubbles().len(), 2);
        assert!(!t.is_thinking());
        assert_eq!(t.bubbles()[1].role, BubbleRole::Gemini);
        assert_eq!(t.bubbles()[1].voice_url.as_deref(), Some("/wav_files/v_1.wav"));
    }

    #[test]
    fn test_other_events_do_not_append() {
        let mut t = Transcript::new();
        assert!(!t.apply(&ServerEvent::AiThinking { active: true }));
        assert!(!t.apply(&ServerEvent::SysStatus { cpu_temp: "50.0".into() }));
        assert!(!t.apply(&ServerEvent::error("x")));
        assert!(t.bubbles().is_empty());
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(BubbleRole::from_role("assistant"), BubbleRole::Gemini);
        assert_eq!(BubbleRole::from_role("gemini"), BubbleRole::Gemini);
        assert_eq!(BubbleRole::from_role("model"), BubbleRole::User);
    }

    #[test]
    fn test_image_src() {
        assert_eq!(image_src("data:image/png;base64,AA"), "data:image/png;base64,AA");
        assert_eq!(image_src("/uploads/a.png"), "/uploads/a.png");
        assert_eq!(image_src("uploads/a.png"), "/uploads/a.png");
    }

    #[test]
    fn test_rendering_escapes_user_and_formats_assistant() {
        let user = Bubble::new(BubbleRole::User, "<b>hi</b>").render();
        assert!(user.contains("&lt;b&gt;hi&lt;/b&gt;"));

        let ai = Bubble::new(BubbleRole::Gemini, "**太字** <script>x</script>").render();
        assert!(ai.contains("<strong>太字</strong>"));
        assert!(!ai.contains("<script>"));
    }

    #[test]
    fn test_thinking_placeholder_rendered() {
        let mut t = Transcript::new();
        t.submit("hi", None);
        let html = t.render();
        assert!(html.contains(r#"<div id="thinking-bubble" class="message gemini show">"#));
        assert!(html.contains(THINKING_TEXT));
        t.apply(&update("ok"));
        assert!(!t.render().contains(THINKING_ID));
        assert!(!Bubble::new(BubbleRole::User, "x").render().contains(" id="));
    }

    #[test]
    fn test_markdown_drops_script_links() {
        let html = render_markdown("[click](javascript:alert(document.cookie))");
        assert_eq!(html, "<p><a href=\"#\">click</a></p>\n");

        let html = render_markdown("<JavaScript:alert(1)> ![x](vbscript:run)");
        assert!(html.contains(r##"<a href="#">"##));
        assert!(html.contains(r##"<img src="#" alt="x" />"##));

        let html = render_markdown("[a](https://example.com) [b](/uploads/a.png) [c](mailto:me@example.com)");
        assert!(html.contains(r#"href="https://example.com""#));
        assert!(html.contains(r#"href="/uploads/a.png""#));
        assert!(html.contains(r#"href="mailto:me@example.com""#));
    }

    #[test]
    fn test_safe_url_rules() {
        assert!(is_safe_url("data:image/png;base64,AA"));
        assert!(is_safe_url("notes/today.md"));
        assert!(is_safe_url("./a?b=c:d"));
        assert!(!is_safe_url("data:text/html,<b>"));
        assert!(!is_safe_url("java\tscript:alert(1)"));
        assert!(!is_safe_url(" JAVASCRIPT:alert(1)"));
    }

    #[test]
    fn test_from_stored_time() {
        let msg = StoredMessage {
            id: 1,
            timestamp: "2026-10-19 08:30:12".to_string(),
            role: "user".to_string(),
            content: "x".to_string(),
            image_url: None,
            voice_url: None,
        };
        assert_eq!(Bubble::from_stored(&msg).time, "08:30");
    }
}
