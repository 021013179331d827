use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Unix millis; formatted for display only when rendered.
    pub sent_at: i64,
    /// Marks the placeholder shown while an answer is pending.
    #[serde(default, skip_serializing_if = "is_false")]
    pub typing: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Message {
    pub fn user(content: impl Into<String>, sent_at: i64) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sent_at,
            typing: false,
        }
    }

    pub fn assistant(content: impl Into<String>, sent_at: i64) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sent_at,
            typing: false,
        }
    }

    pub fn placeholder(sent_at: i64) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            sent_at,
            typing: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// Unix millis.
    pub created: i64,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created,
            messages: Vec::new(),
        }
    }

    pub fn has_placeholder(&self) -> bool {
        self.messages.iter().any(|m| m.typing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_flag_is_omitted_when_false() {
        let json = serde_json::to_value(Message::user("hi", 1)).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "hi", "sent_at": 1 }));

        let json = serde_json::to_value(Message::placeholder(2)).unwrap();
        assert_eq!(json["typing"], serde_json::json!(true));
        assert_eq!(json["role"], serde_json::json!("assistant"));
    }

    #[test]
    fn conversation_without_messages_field_deserializes() {
        let conv: Conversation =
            serde_json::from_str(r#"{"id":"a1","title":"Notes","created":5}"#).unwrap();
        assert!(conv.messages.is_empty());
        assert!(!conv.has_placeholder());
    }
}
