//! Conversation lifecycle and message history

use crate::handoff::ChatTarget;
use async_trait::async_trait;
use flora_api::{
    ApiError, Conversation, HistoryParams, Message, MessageExchange, Page, Pagination, Result,
    StartConversation,
};
use flora_store::FloraStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chat operations a session needs from the backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn start_conversation(&self, request: &StartConversation) -> Result<Conversation>;
    async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageExchange>;
    async fn conversation(&self, id: u64) -> Result<Conversation>;
    async fn history(&self, params: &HistoryParams) -> Result<Page<Message>>;
}

#[async_trait]
impl ChatBackend for FloraStore {
    async fn start_conversation(&self, request: &StartConversation) -> Result<Conversation> {
        FloraStore::start_conversation(self, request).await
    }

    async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageExchange> {
        FloraStore::send_message(self, conversation_id, content).await
    }

    async fn conversation(&self, id: u64) -> Result<Conversation> {
        FloraStore::conversation(self, id).await
    }

    async fn history(&self, params: &HistoryParams) -> Result<Page<Message>> {
        FloraStore::history(self, params).await
    }
}

#[async_trait]
impl<B: ChatBackend + ?Sized> ChatBackend for Arc<B> {
    async fn start_conversation(&self, request: &StartConversation) -> Result<Conversation> {
        (**self).start_conversation(request).await
    }

    async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageExchange> {
        (**self).send_message(conversation_id, content).await
    }

    async fn conversation(&self, id: u64) -> Result<Conversation> {
        (**self).conversation(id).await
    }

    async fn history(&self, params: &HistoryParams) -> Result<Page<Message>> {
        (**self).history(params).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Starting,
    Active { conversation_id: u64 },
    StartFailed { message: String },
}

/// One chat conversation as seen by a user.
///
/// `start` and `send` take `&mut self`, so a second submission cannot be
/// issued while one is outstanding.
pub struct ConversationSession<B> {
    backend: B,
    state: SessionState,
    messages: Vec<Message>,
    send_error: Option<String>,
    scroll_anchor: Option<u64>,
}

impl<B: ChatBackend> ConversationSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: SessionState::NotStarted,
            messages: Vec::new(),
            send_error: None,
            scroll_anchor: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn conversation_id(&self) -> Option<u64> {
        match self.state {
            SessionState::Active { conversation_id } => Some(conversation_id),
            _ => None,
        }
    }

    /// Messages ordered by creation time, then id
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Inline error from the last failed send, cleared by the next success
    pub fn send_error(&self) -> Option<&str> {
        self.send_error.as_deref()
    }

    /// Id of the message the view should scroll to
    pub fn scroll_anchor(&self) -> Option<u64> {
        self.scroll_anchor
    }

    /// Start the conversation for `target`.
    ///
    /// Does nothing once active. After a failure the session stays in
    /// `StartFailed` until `start` is called again.
    pub async fn start(&mut self, target: &ChatTarget) -> Result<u64> {
        if let SessionState::Active { conversation_id } = self.state {
            debug!(conversation_id, "Conversation already active");
            return Ok(conversation_id);
        }

        self.state = SessionState::Starting;
        let request = StartConversation {
            identification_id: target.identification_id.clone(),
            secret: target.secret.clone(),
        };
        match self.backend.start_conversation(&request).await {
            Ok(conversation) => {
                let conversation_id = conversation.id;
                info!(
                    conversation_id,
                    identification_id = %target.identification_id,
                    "Conversation started"
                );
                self.state = SessionState::Active { conversation_id };
                self.replace_messages(conversation.messages);
                Ok(conversation_id)
            }
            Err(e) => {
                warn!(error = %e, "Failed to start conversation");
                self.state = SessionState::StartFailed {
                    message: e.user_message(),
                };
                Err(e)
            }
        }
    }

    /// Send a message, then reload the conversation so messages added
    /// elsewhere show up too.
    ///
    /// On failure the history is left as it was and the error is kept for
    /// inline display. A failed reload keeps the appended exchange.
    pub async fn send(&mut self, content: &str) -> Result<()> {
        let conversation_id = self.active_id()?;
        match self.backend.send_message(conversation_id, content).await {
            Ok(exchange) => {
                self.send_error = None;
                self.push(exchange.user_message);
                self.push(exchange.bot_message);
                self.sort_and_anchor();
                match self.backend.conversation(conversation_id).await {
                    Ok(conversation) => self.replace_messages(conversation.messages),
                    Err(e) => warn!(conversation_id, error = %e, "Failed to reload conversation"),
                }
                Ok(())
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Failed to send message");
                self.send_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Replace local history with the server's copy of the conversation
    pub async fn refresh(&mut self) -> Result<()> {
        let conversation_id = self.active_id()?;
        let conversation = self.backend.conversation(conversation_id).await?;
        self.replace_messages(conversation.messages);
        Ok(())
    }

    fn active_id(&self) -> Result<u64> {
        self.conversation_id()
            .ok_or_else(|| ApiError::invalid("conversation has not been started"))
    }

    fn push(&mut self, message: Message) {
        if !self.messages.iter().any(|m| m.id == message.id) {
            self.messages.push(message);
        }
    }

    fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.sort_and_anchor();
    }

    fn sort_and_anchor(&mut self) {
        self.messages
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        self.scroll_anchor = self.messages.last().map(|m| m.id);
    }
}

/// Page-by-page view of a conversation's stored history
#[derive(Debug, Clone)]
pub struct HistoryPager {
    params: HistoryParams,
    total: Option<u64>,
}

impl HistoryPager {
    pub fn new(conversation_id: u64) -> Self {
        Self {
            params: HistoryParams::first_page(conversation_id),
            total: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.params.limit = if limit == 0 {
            HistoryParams::DEFAULT_LIMIT
        } else {
            limit
        };
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.params.page = page.max(1);
        self
    }

    pub fn params(&self) -> HistoryParams {
        self.params
    }

    /// Paging controls; known once a page has been loaded
    pub fn pagination(&self) -> Option<Pagination> {
        self.total
            .map(|total| Pagination::new(self.params.page, total, self.params.limit))
    }

    pub async fn load<B: ChatBackend + ?Sized>(&mut self, backend: &B) -> Result<Page<Message>> {
        let page = backend.history(&self.params).await?;
        self.total = Some(page.total);
        Ok(page)
    }

    /// Move to page `n`; false (and no change) when out of range or current
    pub fn go_to(&mut self, n: u32) -> bool {
        match self.pagination().and_then(|p| p.change_page(n)) {
            Some(page) => {
                self.params.page = page;
                true
            }
            None => false,
        }
    }

    pub fn next(&mut self) -> bool {
        self.go_to(self.params.page.saturating_add(1))
    }

    pub fn prev(&mut self) -> bool {
        self.go_to(self.params.page.saturating_sub(1))
    }
}
