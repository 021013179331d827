use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eino_shared::{AskRequest, Message};

use crate::client::AnswerClient;
use crate::error::ClientError;
use crate::now_millis;
use crate::store::ConversationStore;
use crate::title::FALLBACK_TITLE;

/// Prefix of the assistant message reporting a failed request.
pub const ERROR_PREFIX: &str = "请求出错：";

/// Result of starting a send.
#[derive(Debug)]
pub enum BeginOutcome {
    /// Nothing was active, so a conversation was created instead of sending.
    Created(String),
    /// Input was blank.
    Ignored,
    /// A request is already in flight.
    Busy,
    Started(PendingSend),
}

/// How a send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Created,
    Ignored,
    Busy,
    Resolved,
    Failed,
    /// The conversation was deleted while the request was in flight.
    Dropped,
}

/// Resets the "sending" flag however the send ends, including being dropped.
#[derive(Debug)]
struct SendGuard(Arc<AtomicBool>);

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An in-flight send. Holding it keeps the send affordance disabled.
#[derive(Debug)]
pub struct PendingSend {
    conversation_id: String,
    request: AskRequest,
    _guard: SendGuard,
}

impl PendingSend {
    pub fn request(&self) -> &AskRequest {
        &self.request
    }
}

/// Runs one user turn: user message, title, placeholder, request, answer.
pub struct SendPipeline {
    client: Arc<dyn AnswerClient>,
    sending: Arc<AtomicBool>,
    send_conversation_id: bool,
}

impl SendPipeline {
    pub fn new(client: Arc<dyn AnswerClient>) -> Self {
        Self {
            client,
            sending: Arc::new(AtomicBool::new(false)),
            send_conversation_id: false,
        }
    }

    /// Include the local conversation id in each request.
    pub fn with_conversation_id(mut self, enabled: bool) -> Self {
        self.send_conversation_id = enabled;
        self
    }

    pub fn client(&self) -> Arc<dyn AnswerClient> {
        self.client.clone()
    }

    /// True while a request is in flight and sending is disabled.
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    /// Everything up to the network call. Consumes `input` once a send starts.
    pub fn begin(&self, store: &mut ConversationStore, input: &mut String) -> BeginOutcome {
        if self.is_sending() {
            return BeginOutcome::Busy;
        }

        let Some(conversation_id) = store.active().map(|c| c.id.clone()) else {
            let id = store.create_conversation(Some(FALLBACK_TITLE));
            return BeginOutcome::Created(id);
        };

        let text = input.trim().to_string();
        if text.is_empty() {
            return BeginOutcome::Ignored;
        }
        input.clear();

        store.append_message(&conversation_id, Message::user(text.clone(), now_millis()));
        if let Some(title) = store.apply_derived_title(&conversation_id, &text) {
            tracing::debug!(%conversation_id, %title, "Derived conversation title");
        }
        store.push_placeholder(&conversation_id);

        self.sending.store(true, Ordering::Release);
        let request = AskRequest {
            question: text,
            conversation_id: self.send_conversation_id.then(|| conversation_id.clone()),
        };

        BeginOutcome::Started(PendingSend {
            conversation_id,
            request,
            _guard: SendGuard(self.sending.clone()),
        })
    }

    /// Replaces the placeholder with the answer or the error.
    pub fn complete(
        &self,
        store: &mut ConversationStore,
        pending: PendingSend,
        outcome: Result<String, ClientError>,
    ) -> SendOutcome {
        let conversation_id = pending.conversation_id.as_str();

        if store.get(conversation_id).is_none() {
            tracing::debug!(conversation_id, "Conversation deleted before the answer arrived");
            return SendOutcome::Dropped;
        }

        store.take_placeholder(conversation_id);
        let (content, result) = match outcome {
            Ok(answer) => (answer, SendOutcome::Resolved),
            Err(e) => {
                tracing::warn!(conversation_id, "Request failed: {}", e);
                (format!("{}{}", ERROR_PREFIX, e), SendOutcome::Failed)
            }
        };
        store.append_message(conversation_id, Message::assistant(content, now_millis()));

        result
    }

    /// `begin`, the request, and `complete` in one go.
    pub async fn send(&self, store: &mut ConversationStore, input: &mut String) -> SendOutcome {
        let pending = match self.begin(store, input) {
            BeginOutcome::Created(_) => return SendOutcome::Created,
            BeginOutcome::Ignored => return SendOutcome::Ignored,
            BeginOutcome::Busy => return SendOutcome::Busy,
            BeginOutcome::Started(pending) => pending,
        };

        let outcome = self.client.ask(pending.request()).await;
        self.complete(store, pending, outcome)
    }
}
