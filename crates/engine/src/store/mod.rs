use eino_shared::{Conversation, Message, StoreEvent};
use tokio::sync::broadcast;

use crate::now_millis;
use crate::storage::ConversationStorage;
use crate::title::{DEFAULT_TITLE, derive_title, is_default_title};

const EVENT_BUFFER: usize = 64;

/// In-memory conversation list, most recent first, plus the active pointer.
///
/// Durable mutations save through the injected storage and then broadcast a
/// [`StoreEvent`], so subscribers redraw without callers having to ask.
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    storage: Box<dyn ConversationStorage>,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    pub fn new(storage: impl ConversationStorage + 'static) -> Self {
        let mut conversations = storage.load();

        // A placeholder on disk belongs to a request that can no longer finish
        for conversation in &mut conversations {
            conversation.messages.retain(|m| !m.typing);
        }

        let active_id = conversations.first().map(|c| c.id.clone());
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Self {
            conversations,
            active_id,
            storage: Box::new(storage),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// The active conversation, if the pointer references one that exists.
    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Inserts a new conversation at the front and makes it active.
    pub fn create_conversation(&mut self, title: Option<&str>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let title = title.unwrap_or(DEFAULT_TITLE);

        self.conversations
            .insert(0, Conversation::new(id.clone(), title, now_millis()));
        self.active_id = Some(id.clone());
        tracing::debug!(conversation_id = %id, "Created conversation");

        self.persist();
        self.emit(StoreEvent::ConversationCreated { id: id.clone() });
        self.emit(StoreEvent::ActiveChanged {
            id: Some(id.clone()),
        });
        id
    }

    /// Removes a conversation. Returns false if it did not exist.
    pub fn delete_conversation(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return false;
        }

        let was_active = self.active_id.as_deref() == Some(id);
        if was_active {
            self.active_id = self.conversations.first().map(|c| c.id.clone());
        }

        self.persist();
        self.emit(StoreEvent::ConversationDeleted { id: id.to_string() });
        if was_active {
            self.emit(StoreEvent::ActiveChanged {
                id: self.active_id.clone(),
            });
        }
        true
    }

    /// Renames a conversation. `None` (cancelled) and blank titles are ignored.
    pub fn rename_conversation(&mut self, id: &str, new_title: Option<&str>) -> bool {
        let Some(title) = new_title.map(str::trim).filter(|t| !t.is_empty()) else {
            return false;
        };
        let Some(conversation) = self.get_mut(id) else {
            return false;
        };

        conversation.title = title.to_string();
        self.persist();
        self.emit(StoreEvent::ConversationRenamed {
            id: id.to_string(),
            title: title.to_string(),
        });
        true
    }

    /// Points the active conversation at `id`. Unknown ids are accepted and
    /// simply leave nothing active to display.
    pub fn select_conversation(&mut self, id: &str) {
        self.active_id = Some(id.to_string());
        self.emit(StoreEvent::ActiveChanged {
            id: Some(id.to_string()),
        });
    }

    /// Appends to a conversation's messages. A missing conversation is a no-op.
    pub fn append_message(&mut self, conversation_id: &str, message: Message) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            tracing::debug!(conversation_id, "Dropping message for missing conversation");
            return false;
        };

        conversation.messages.push(message);
        self.persist();
        self.emit(StoreEvent::MessageAppended {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    pub fn clear_messages(&mut self, conversation_id: &str) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };

        conversation.messages.clear();
        self.persist();
        self.emit(StoreEvent::MessagesCleared {
            conversation_id: conversation_id.to_string(),
        });
        true
    }

    /// Replaces a default title with one derived from `text`.
    /// Returns the new title, or `None` if the title had already been set.
    pub fn apply_derived_title(&mut self, conversation_id: &str, text: &str) -> Option<String> {
        let conversation = self.get_mut(conversation_id)?;
        if !is_default_title(&conversation.title) {
            return None;
        }

        let title = derive_title(text);
        conversation.title = title.clone();
        self.persist();
        self.emit(StoreEvent::ConversationRenamed {
            id: conversation_id.to_string(),
            title: title.clone(),
        });
        Some(title)
    }

    /// Shows the typing placeholder, replacing any previous one.
    pub fn push_placeholder(&mut self, conversation_id: &str) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };

        conversation.messages.retain(|m| !m.typing);
        conversation.messages.push(Message::placeholder(now_millis()));
        self.emit(StoreEvent::PlaceholderChanged {
            conversation_id: conversation_id.to_string(),
            pending: true,
        });
        true
    }

    /// Removes the typing placeholder. Returns false if there was none.
    pub fn take_placeholder(&mut self, conversation_id: &str) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };
        let Some(index) = conversation.messages.iter().position(|m| m.typing) else {
            return false;
        };

        conversation.messages.remove(index);
        self.emit(StoreEvent::PlaceholderChanged {
            conversation_id: conversation_id.to_string(),
            pending: false,
        });
        true
    }

    fn persist(&self) {
        if let Err(e) = self.storage.save(&self.conversations) {
            tracing::error!("Failed to save conversations: {}", e);
            self.emit(StoreEvent::PersistFailed {
                message: e.to_string(),
            });
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
