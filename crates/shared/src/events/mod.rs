use serde::{Deserialize, Serialize};

/// Change notifications emitted by the conversation store after a mutation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    ConversationCreated {
        id: String,
    },
    ConversationDeleted {
        id: String,
    },
    ConversationRenamed {
        id: String,
        title: String,
    },
    ActiveChanged {
        id: Option<String>,
    },
    MessageAppended {
        conversation_id: String,
    },
    PlaceholderChanged {
        conversation_id: String,
        pending: bool,
    },
    MessagesCleared {
        conversation_id: String,
    },
    PersistFailed {
        message: String,
    },
}
