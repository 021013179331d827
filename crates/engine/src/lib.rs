pub mod client;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod store;
pub mod title;
pub mod view;

pub use eino_shared::{Conversation, Message, Role, StoreEvent};
pub use error::{ClientError, StorageError};
pub use reqwest::StatusCode;

/// Current wall-clock time as unix millis.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
