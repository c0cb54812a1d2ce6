use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::content::{Content, ContentPart, Media};
use super::role::Role;
use super::tool::ToolCall;

/// A message to or from an LLM. Immutable once stored in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub created: i64,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            content: Content::default(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            created: Utc::now().timestamp(),
        }
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// The answer to one tool call.
    pub fn tool<S: Into<String>>(tool_call_id: S) -> Self {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        let text = text.into();
        if let Content::Text(existing) = &mut self.content {
            if existing.is_empty() {
                *existing = text;
                return self;
            }
        }
        self.content.push(ContentPart::Text { text });
        self
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.content.push(ContentPart::Media(media));
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn text(&self) -> String {
        self.content.text()
    }

    pub fn media(&self) -> Vec<&Media> {
        self.content.media()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders() {
        let message = Message::user().with_text("Hello");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, Content::Text("Hello".to_string()));

        let message = Message::user()
            .with_text("What is ")
            .with_media(Media::url("https://x.test/cat.png"))
            .with_text("this?");
        assert_eq!(message.text(), "What is this?");
        assert_eq!(message.media().len(), 1);

        let message = Message::tool("call_1").with_name("weather").with_text("sunny");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.name.as_deref(), Some("weather"));
    }

    #[test]
    fn test_serialization() -> anyhow::Result<()> {
        let message = Message::assistant()
            .with_text("checking")
            .with_tool_calls(vec![ToolCall::new("c1", "weather", json!({"city": "Oslo"}))]);
        let value = serde_json::to_value(&message)?;
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "checking");
        assert_eq!(value["tool_calls"][0]["name"], "weather");
        assert!(value.get("name").is_none());

        let deserialized: Message = serde_json::from_value(value)?;
        assert_eq!(deserialized, message);
        Ok(())
    }
}
