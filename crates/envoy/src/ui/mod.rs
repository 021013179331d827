mod copy;
mod markdown;
mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use eino_engine::ClientError;
use eino_engine::client::AnswerClient;
use eino_engine::pipeline::{BeginOutcome, PendingSend, SendOutcome, SendPipeline};
use eino_engine::store::ConversationStore;
use eino_engine::view::{self, SidebarEntry};
use eino_shared::{AskRequest, StoreEvent};
use futures_util::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};

use copy::{Clipboard, CopyAffordance, SystemClipboard};

const TICK: Duration = Duration::from_millis(300);
const SCROLL_STEP: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Search,
    Sidebar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    Delete(String),
    Clear(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Rename { id: String, buffer: String },
    Confirm(Confirm),
}

/// Everything a key press can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Send,
    NewConversation,
    ToggleFocus,
    FocusInput,
    FocusSearch,
    FocusSidebar,
    Insert(char),
    Newline,
    Backspace,
    SelectPrev,
    SelectNext,
    RenameSelected,
    DeleteSelected,
    RenameActive,
    ClearActive,
    CopyCode(usize),
    ScrollUp,
    ScrollDown,
    ModalConfirm,
    ModalCancel,
}

pub fn map_key(app: &App, key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    if ctrl && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    if let Some(modal) = &app.modal {
        return match (modal, key.code) {
            (_, KeyCode::Esc) => Some(Action::ModalCancel),
            (_, KeyCode::Enter) => Some(Action::ModalConfirm),
            (Modal::Rename { .. }, KeyCode::Backspace) => Some(Action::Backspace),
            (Modal::Rename { .. }, KeyCode::Char(c)) => Some(Action::Insert(c)),
            (Modal::Confirm(_), KeyCode::Char('y' | 'Y')) => Some(Action::ModalConfirm),
            (Modal::Confirm(_), KeyCode::Char('n' | 'N')) => Some(Action::ModalCancel),
            _ => None,
        };
    }

    if ctrl {
        return match key.code {
            KeyCode::Enter => Some(Action::Send),
            KeyCode::Char('n') => Some(Action::NewConversation),
            KeyCode::Char('f') => Some(Action::FocusSearch),
            // Global and header-local clear
            KeyCode::Char('l') | KeyCode::Char('k') => Some(Action::ClearActive),
            KeyCode::Char('r') => Some(Action::RenameActive),
            _ => None,
        };
    }

    if alt {
        return match key.code {
            KeyCode::Enter => Some(Action::Newline),
            KeyCode::Char(c @ '1'..='9') => Some(Action::CopyCode(c as usize - '1' as usize)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Tab => return Some(Action::ToggleFocus),
        KeyCode::PageUp => return Some(Action::ScrollUp),
        KeyCode::PageDown => return Some(Action::ScrollDown),
        _ => {}
    }

    match (app.focus, key.code) {
        (Focus::Input, KeyCode::Esc) => Some(Action::Quit),
        (_, KeyCode::Esc) => Some(Action::FocusInput),
        (Focus::Input, KeyCode::Enter) => Some(Action::Send),
        (Focus::Input | Focus::Search, KeyCode::Char(c)) => Some(Action::Insert(c)),
        (Focus::Input | Focus::Search, KeyCode::Backspace) => Some(Action::Backspace),
        (Focus::Search, KeyCode::Enter | KeyCode::Down) => Some(Action::FocusSidebar),
        (Focus::Sidebar, KeyCode::Up | KeyCode::Char('k')) => Some(Action::SelectPrev),
        (Focus::Sidebar, KeyCode::Down | KeyCode::Char('j')) => Some(Action::SelectNext),
        (Focus::Sidebar, KeyCode::Char('r')) => Some(Action::RenameSelected),
        (Focus::Sidebar, KeyCode::Char('d') | KeyCode::Delete) => Some(Action::DeleteSelected),
        (Focus::Sidebar, KeyCode::Enter) => Some(Action::FocusInput),
        _ => None,
    }
}

pub struct App {
    store: ConversationStore,
    pipeline: SendPipeline,
    events: broadcast::Receiver<StoreEvent>,
    clipboard: Box<dyn Clipboard>,
    copy: CopyAffordance,
    pending: Option<PendingSend>,
    input: String,
    filter: String,
    focus: Focus,
    selected: usize,
    modal: Option<Modal>,
    status: Option<String>,
    markdown: bool,
    scroll_back: u16,
    tick: usize,
    dirty: bool,
    quit: bool,
}

impl App {
    pub fn new(
        store: ConversationStore,
        pipeline: SendPipeline,
        markdown: bool,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        let events = store.subscribe();
        let mut app = Self {
            store,
            pipeline,
            events,
            clipboard,
            copy: CopyAffordance::default(),
            pending: None,
            input: String::new(),
            filter: String::new(),
            focus: Focus::Input,
            selected: 0,
            modal: None,
            status: None,
            markdown,
            scroll_back: 0,
            tick: 0,
            dirty: true,
            quit: false,
        };
        app.sync_selection();
        app
    }

    fn entries(&self) -> Vec<SidebarEntry> {
        view::sidebar(&self.store, &self.filter)
    }

    fn selected_entry(&self) -> Option<SidebarEntry> {
        self.entries().into_iter().nth(self.selected)
    }

    /// Moves the sidebar highlight onto the active conversation when it is listed.
    fn sync_selection(&mut self) {
        let entries = self.entries();
        if let Some(index) = entries.iter().position(|e| e.active) {
            self.selected = index;
        } else {
            self.selected = self.selected.min(entries.len().saturating_sub(1));
        }
    }

    fn move_selection(&mut self, forward: bool) {
        let entries = self.entries();
        if entries.is_empty() {
            return;
        }

        self.selected = if forward {
            (self.selected + 1).min(entries.len() - 1)
        } else {
            self.selected.saturating_sub(1)
        };
        self.store.select_conversation(&entries[self.selected].id);
    }

    fn edit_buffer(&mut self) -> Option<&mut String> {
        if let Some(Modal::Rename { buffer, .. }) = &mut self.modal {
            return Some(buffer);
        }
        match self.focus {
            Focus::Input => Some(&mut self.input),
            Focus::Search => Some(&mut self.filter),
            Focus::Sidebar => None,
        }
    }

    /// Applies an action. Returns a request to dispatch when a send started.
    pub fn apply(&mut self, action: Action) -> Option<AskRequest> {
        self.dirty = true;
        if !matches!(action, Action::CopyCode(_)) {
            self.status = None;
        }

        match action {
            Action::Quit => self.quit = true,
            Action::Send => return self.send(),
            Action::NewConversation => {
                self.store.create_conversation(None);
                self.focus = Focus::Input;
            }
            Action::ToggleFocus => {
                self.focus = match self.focus {
                    Focus::Input => Focus::Sidebar,
                    Focus::Search | Focus::Sidebar => Focus::Input,
                };
            }
            Action::FocusInput => self.focus = Focus::Input,
            Action::FocusSearch => self.focus = Focus::Search,
            Action::FocusSidebar => self.focus = Focus::Sidebar,
            Action::Insert(c) => {
                if let Some(buffer) = self.edit_buffer() {
                    buffer.push(c);
                }
                if self.focus == Focus::Search && self.modal.is_none() {
                    self.sync_selection();
                }
            }
            Action::Newline => {
                if self.focus == Focus::Input {
                    self.input.push('\n');
                }
            }
            Action::Backspace => {
                if let Some(buffer) = self.edit_buffer() {
                    buffer.pop();
                }
                if self.focus == Focus::Search && self.modal.is_none() {
                    self.sync_selection();
                }
            }
            Action::SelectPrev => self.move_selection(false),
            Action::SelectNext => self.move_selection(true),
            Action::RenameSelected => {
                if let Some(entry) = self.selected_entry() {
                    self.modal = Some(Modal::Rename {
                        id: entry.id,
                        buffer: entry.title,
                    });
                }
            }
            Action::RenameActive => {
                if let Some(c) = self.store.active() {
                    self.modal = Some(Modal::Rename {
                        id: c.id.clone(),
                        buffer: c.title.clone(),
                    });
                }
            }
            Action::DeleteSelected => {
                if let Some(entry) = self.selected_entry() {
                    self.modal = Some(Modal::Confirm(Confirm::Delete(entry.id)));
                }
            }
            Action::ClearActive => {
                if let Some(id) = self.store.active().map(|c| c.id.clone()) {
                    self.modal = Some(Modal::Confirm(Confirm::Clear(id)));
                }
            }
            Action::CopyCode(index) => {
                self.copy.copy(index, self.clipboard.as_mut());
            }
            Action::ScrollUp => self.scroll_back = self.scroll_back.saturating_add(SCROLL_STEP),
            Action::ScrollDown => self.scroll_back = self.scroll_back.saturating_sub(SCROLL_STEP),
            Action::ModalConfirm => match self.modal.take() {
                Some(Modal::Rename { id, buffer }) => {
                    self.store.rename_conversation(&id, Some(&buffer));
                }
                Some(Modal::Confirm(Confirm::Delete(id))) => {
                    self.store.delete_conversation(&id);
                }
                Some(Modal::Confirm(Confirm::Clear(id))) => {
                    self.store.clear_messages(&id);
                }
                None => {}
            },
            Action::ModalCancel => self.modal = None,
        }
        None
    }

    fn send(&mut self) -> Option<AskRequest> {
        match self.pipeline.begin(&mut self.store, &mut self.input) {
            BeginOutcome::Started(pending) => {
                let request = pending.request().clone();
                self.pending = Some(pending);
                self.scroll_back = 0;
                Some(request)
            }
            BeginOutcome::Created(_) => {
                self.status = Some("已新建对话，请再次发送".to_string());
                None
            }
            BeginOutcome::Ignored | BeginOutcome::Busy => None,
        }
    }

    /// Applies the answer (or error) of the request in flight.
    pub fn finish_send(&mut self, outcome: Result<String, ClientError>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if self.pipeline.complete(&mut self.store, pending, outcome) == SendOutcome::Dropped {
            self.status = Some("对话已删除，回复已丢弃".to_string());
        }
        self.dirty = true;
    }

    pub fn is_sending(&self) -> bool {
        self.pipeline.is_sending()
    }

    /// Pulls store events; any event means the screen is stale.
    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.dirty = true;
                    match event {
                        StoreEvent::PersistFailed { message } => {
                            self.status = Some(format!("保存失败：{}", message));
                        }
                        StoreEvent::ActiveChanged { .. }
                        | StoreEvent::ConversationCreated { .. }
                        | StoreEvent::ConversationDeleted { .. } => {
                            self.scroll_back = 0;
                            self.sync_selection();
                        }
                        StoreEvent::MessageAppended { .. } | StoreEvent::PlaceholderChanged { .. } => {
                            self.scroll_back = 0;
                        }
                        _ => {}
                    }
                }
                Err(TryRecvError::Lagged(_)) => {
                    self.dirty = true;
                    self.sync_selection();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn on_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        if self.store.active().is_some_and(|c| c.has_placeholder()) {
            self.dirty = true;
        }
        if self.copy.expire() {
            self.dirty = true;
        }
    }
}

fn dispatch(
    client: Arc<dyn AnswerClient>,
    request: AskRequest,
    tx: mpsc::UnboundedSender<Result<String, ClientError>>,
) {
    tokio::spawn(async move {
        let outcome = client.ask(&request).await;
        let _ = tx.send(outcome);
    });
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut keys = EventStream::new();
    let mut ticker = tokio::time::interval(TICK);

    while !app.quit {
        app.drain_events();
        if app.dirty {
            terminal.draw(|frame| render::draw(frame, app))?;
            app.dirty = false;
        }

        tokio::select! {
            event = keys.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(request) = map_key(app, key).and_then(|action| app.apply(action)) {
                        dispatch(app.pipeline.client(), request, tx.clone());
                    }
                }
                Some(Ok(Event::Resize(..))) => app.dirty = true,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            Some(outcome) = rx.recv() => app.finish_send(outcome),
            _ = ticker.tick() => app.on_tick(),
        }
    }

    Ok(())
}

pub async fn interactive_chat(
    store: ConversationStore,
    pipeline: SendPipeline,
    markdown: bool,
) -> Result<()> {
    tracing::info!(conversations = store.conversations().len(), "Starting interactive chat");
    let mut app = App::new(store, pipeline, markdown, Box::new(SystemClipboard));

    let mut terminal = ratatui::init();
    let result = run(&mut terminal, &mut app).await;
    ratatui::restore();

    result
}

/// Sends one message to the active conversation and prints the answer.
pub async fn single_message(
    mut store: ConversationStore,
    pipeline: SendPipeline,
    message: String,
) -> Result<()> {
    let answer = ask_once(&mut store, &pipeline, message).await?;
    println!("{}", answer);
    Ok(())
}

/// One send against the active conversation, creating it first if needed.
/// Anything but an answer is an error.
async fn ask_once(
    store: &mut ConversationStore,
    pipeline: &SendPipeline,
    message: String,
) -> Result<String> {
    if store.active().is_none() {
        store.create_conversation(None);
    }

    let mut input = message;
    let outcome = pipeline.send(store, &mut input).await;
    let reply = store
        .active()
        .and_then(|c| c.messages.last())
        .map(|m| m.content.clone())
        .unwrap_or_default();

    match outcome {
        SendOutcome::Resolved => Ok(reply),
        SendOutcome::Failed => bail!("{}", reply),
        SendOutcome::Ignored => bail!("Nothing to send"),
        other => bail!("Message not sent: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eino_engine::client::ApiClient;
    use eino_engine::StatusCode;
    use eino_engine::storage::MemoryStorage;
    use eino_shared::Role;

    struct NoClipboard;

    impl Clipboard for NoClipboard {
        fn set_text(&mut self, _: String) -> Result<(), String> {
            Err("unavailable".into())
        }
    }

    pub(super) fn app_with(titles: &[&str]) -> App {
        let mut store = ConversationStore::new(MemoryStorage::new());
        for title in titles.iter().rev() {
            store.create_conversation(Some(*title));
        }
        // Never contacted; requests are completed by hand
        let pipeline = SendPipeline::new(Arc::new(ApiClient::new("http://127.0.0.1:9")));
        App::new(store, pipeline, true, Box::new(NoClipboard))
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.apply(Action::Insert(c));
        }
    }

    #[test]
    fn keys_map_to_actions() {
        let app = app_with(&["One"]);

        assert_eq!(map_key(&app, key(KeyCode::Enter, KeyModifiers::NONE)), Some(Action::Send));
        assert_eq!(map_key(&app, key(KeyCode::Enter, KeyModifiers::CONTROL)), Some(Action::Send));
        assert_eq!(map_key(&app, key(KeyCode::Enter, KeyModifiers::SUPER)), Some(Action::Send));
        assert_eq!(map_key(&app, key(KeyCode::Enter, KeyModifiers::ALT)), Some(Action::Newline));
        assert_eq!(
            map_key(&app, key(KeyCode::Char('2'), KeyModifiers::ALT)),
            Some(Action::CopyCode(1))
        );
        assert_eq!(
            map_key(&app, key(KeyCode::Char('n'), KeyModifiers::CONTROL)),
            Some(Action::NewConversation)
        );
        assert_eq!(map_key(&app, key(KeyCode::Esc, KeyModifiers::NONE)), Some(Action::Quit));
    }

    #[test]
    fn modal_captures_keys() {
        let mut app = app_with(&["One"]);
        app.apply(Action::ClearActive);

        assert_eq!(
            map_key(&app, key(KeyCode::Char('y'), KeyModifiers::NONE)),
            Some(Action::ModalConfirm)
        );
        assert_eq!(map_key(&app, key(KeyCode::Esc, KeyModifiers::NONE)), Some(Action::ModalCancel));
        assert_eq!(map_key(&app, key(KeyCode::Char('x'), KeyModifiers::NONE)), None);
        assert_eq!(map_key(&app, key(KeyCode::Tab, KeyModifiers::NONE)), None);
    }

    #[test]
    fn send_round_trip_through_app() {
        let mut app = app_with(&["Chat"]);
        type_text(&mut app, "hello");

        let request = app.apply(Action::Send).expect("request dispatched");
        assert_eq!(request.question, "hello");
        assert!(app.is_sending());
        assert!(app.input.is_empty());

        // Sending again while busy does nothing
        type_text(&mut app, "again");
        assert!(app.apply(Action::Send).is_none());

        app.finish_send(Ok("hi there".into()));
        assert!(!app.is_sending());

        let messages = &app.store.active().unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "hi there");
    }

    #[test]
    fn send_without_conversation_creates_one() {
        let mut app = app_with(&[]);
        type_text(&mut app, "hello");

        assert!(app.apply(Action::Send).is_none());
        assert_eq!(app.store.conversations().len(), 1);
        assert_eq!(app.input, "hello");
        assert!(app.status.is_some());
    }

    #[test]
    fn delete_requires_confirmation() {
        let mut app = app_with(&["Keep", "Drop"]);
        app.apply(Action::FocusSidebar);
        app.apply(Action::SelectNext);
        app.apply(Action::DeleteSelected);
        assert!(matches!(app.modal, Some(Modal::Confirm(Confirm::Delete(_)))));

        app.apply(Action::ModalCancel);
        assert_eq!(app.store.conversations().len(), 2);

        app.apply(Action::DeleteSelected);
        app.apply(Action::ModalConfirm);
        let titles: Vec<_> = app.store.conversations().iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Keep"]);
    }

    #[test]
    fn blank_rename_keeps_title() {
        let mut app = app_with(&["Original"]);
        app.apply(Action::RenameActive);
        for _ in 0.."Original".len() {
            app.apply(Action::Backspace);
        }
        type_text(&mut app, "   ");
        app.apply(Action::ModalConfirm);

        assert_eq!(app.store.active().unwrap().title, "Original");
    }

    #[test]
    fn search_filters_sidebar() {
        let mut app = app_with(&["Trip Plan", "Budget"]);
        app.apply(Action::FocusSearch);
        type_text(&mut app, "TRIP");

        let entries = app.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Trip Plan");
        assert_eq!(app.input, "");
    }

    #[test]
    fn clear_confirmation_empties_thread() {
        let mut app = app_with(&["Chat"]);
        type_text(&mut app, "question");
        app.apply(Action::Send);
        app.finish_send(Err(ClientError::Status(StatusCode::BAD_GATEWAY)));

        app.apply(Action::ClearActive);
        app.apply(Action::ModalConfirm);
        assert!(app.store.active().unwrap().messages.is_empty());
    }

    #[test]
    fn persist_failures_reach_the_status_line() {
        let mut app = app_with(&["Chat"]);
        app.drain_events();
        assert!(app.status.is_none());

        app.events = {
            let (tx, rx) = broadcast::channel(4);
            tx.send(StoreEvent::PersistFailed {
                message: "disk full".into(),
            })
            .unwrap();
            rx
        };
        app.drain_events();
        assert_eq!(app.status.as_deref(), Some("保存失败：disk full"));
    }

    #[tokio::test]
    async fn ask_once_fails_when_service_is_unreachable() {
        let mut store = ConversationStore::new(MemoryStorage::new());
        let pipeline = SendPipeline::new(Arc::new(ApiClient::new("http://127.0.0.1:9")));

        let err = ask_once(&mut store, &pipeline, "hello".into()).await.unwrap_err();
        assert!(err.to_string().starts_with(eino_engine::pipeline::ERROR_PREFIX));

        // The failed turn is still recorded in a freshly created conversation
        let messages = &store.active().unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert!(!pipeline.is_sending());
    }

    #[tokio::test]
    async fn ask_once_rejects_blank_messages() {
        let mut store = ConversationStore::new(MemoryStorage::new());
        let pipeline = SendPipeline::new(Arc::new(ApiClient::new("http://127.0.0.1:9")));

        let err = ask_once(&mut store, &pipeline, "   ".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "Nothing to send");
        assert!(store.active().unwrap().messages.is_empty());
    }
}
