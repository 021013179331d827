pub mod events;
pub mod model;
pub mod wire;

pub use events::StoreEvent;
pub use model::{Conversation, Message, Role};
pub use wire::{AskRequest, extract_answer};
