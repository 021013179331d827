//! Display-ready projection of the store, independent of any terminal.

use chrono::{DateTime, Local};
use eino_shared::{Message, Role};

use crate::store::ConversationStore;

pub const USER_LABEL: &str = "你";
pub const ASSISTANT_LABEL: &str = "Eino";
pub const EMPTY_TITLE: &str = "选择或新建一个对话";
pub const EMPTY_SUBTITLE: &str = "暂无对话";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidebarEntry {
    pub id: String,
    pub title: String,
    pub created: String,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Header {
    Empty,
    Conversation {
        title: String,
        created: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    /// Pending answer, drawn as an animated indicator.
    Typing,
    /// Shown verbatim with newlines as line breaks.
    Plain(String),
    /// Markdown to be rendered, falling back to plain text.
    Rich(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub role: Role,
    pub author: &'static str,
    pub time: String,
    pub body: MessageBody,
}

/// Formats unix millis in the local timezone.
pub fn format_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y/%m/%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Conversations whose title contains `filter`, ignoring case.
pub fn sidebar(store: &ConversationStore, filter: &str) -> Vec<SidebarEntry> {
    let needle = filter.to_lowercase();
    let active = store.active_id();

    store
        .conversations()
        .iter()
        .filter(|c| c.title.to_lowercase().contains(&needle))
        .map(|c| SidebarEntry {
            id: c.id.clone(),
            title: c.title.clone(),
            created: format_time(c.created),
            active: active == Some(c.id.as_str()),
        })
        .collect()
}

pub fn header(store: &ConversationStore) -> Header {
    match store.active() {
        Some(c) => Header::Conversation {
            title: c.title.clone(),
            created: format_time(c.created),
        },
        None => Header::Empty,
    }
}

fn message_view(message: &Message) -> MessageView {
    let author = match message.role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
    };

    let body = if message.typing {
        MessageBody::Typing
    } else {
        match message.role {
            Role::User => MessageBody::Plain(message.content.clone()),
            Role::Assistant => MessageBody::Rich(message.content.clone()),
        }
    };

    MessageView {
        role: message.role,
        author,
        time: format_time(message.sent_at),
        body,
    }
}

/// Messages of the active conversation, oldest first.
pub fn thread(store: &ConversationStore) -> Vec<MessageView> {
    store
        .active()
        .map(|c| c.messages.iter().map(message_view).collect())
        .unwrap_or_default()
}
