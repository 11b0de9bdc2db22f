//! The open conversation: loader, scroll anchor, read cursor and composer
//! for one contact at a time.
//!
//! Network calls are made without holding the view lock. Every response is
//! checked against the request token it was issued with, and every timer
//! against the anchor generation, so switching contacts mid-flight never
//! mixes two conversations.

use crate::events::{ReadCursorWritten, SendFailed};
use crate::send::{Draft, SendError, normalize_recipient};
use crate::session::MessagingSession;
use chrono::{DateTime, Utc};
use inbox_core::partition::{self, filter_by_origin};
use inbox_core::scroll::{InputKind, ScheduledScroll, ScrollAnchor, ScrollCommand, Viewport};
use inbox_core::stream::{
    LiveOutcome, LoaderState, MessagePage, MessageStream, PageOutcome, PageRequest, RequestToken,
    near_top,
};
use inbox_core::{CanonicalId, Message, SourceError};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// The rendering surface the view scrolls.
pub trait ViewportHandle: Send + Sync {
    fn metrics(&self) -> Viewport;
    fn apply(&self, command: ScrollCommand);
}

#[derive(Debug)]
struct ViewState {
    stream: MessageStream,
    anchor: ScrollAnchor,
    /// Read cursor as it was when the conversation was opened.
    read_cursor: Option<DateTime<Utc>>,
    automatic_only: bool,
    draft: Draft,
    sending: bool,
    send_error: Option<String>,
    timers: Vec<JoinHandle<()>>,
}

impl ViewState {
    fn abort_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

/// What a renderer needs to draw the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSnapshot {
    pub contact: Option<CanonicalId>,
    pub state: LoaderState,
    pub has_more: bool,
    pub loading_more: bool,
    pub unread: Vec<Message>,
    pub read: Vec<Message>,
    pub draft: String,
    pub sending: bool,
    pub send_error: Option<String>,
}

impl ConversationSnapshot {
    pub fn message_count(&self) -> usize {
        self.unread.len() + self.read.len()
    }
}

#[derive(Clone)]
pub struct ConversationView {
    session: Arc<MessagingSession>,
    viewport: Arc<dyn ViewportHandle>,
    state: Arc<Mutex<ViewState>>,
}

impl ConversationView {
    pub fn new(session: Arc<MessagingSession>, viewport: Arc<dyn ViewportHandle>) -> Self {
        let config = session.config();
        let state = ViewState {
            stream: MessageStream::new(config.paging.page_size),
            anchor: ScrollAnchor::new(config.scroll.clone()),
            read_cursor: None,
            automatic_only: false,
            draft: Draft::default(),
            sending: false,
            send_error: None,
            timers: Vec::new(),
        };
        Self {
            session,
            viewport,
            state: Arc::new(Mutex::new(state)),
        }
    }

    async fn fetch(&self, request: &PageRequest) -> Result<MessagePage, SourceError> {
        self.session
            .backend()
            .fetch_page(
                self.session.organization(),
                &request.token.contact,
                &request.cursor,
                request.limit,
            )
            .await
    }

    /// Opens `contact`, dropping whatever the previous selection had in
    /// flight, and loads its newest page.
    pub async fn select_contact(&self, contact: CanonicalId) -> Result<PageOutcome, SourceError> {
        let request = {
            let mut state = self.state.lock().await;
            state.abort_timers();
            state.anchor.reset();
            state.send_error = None;
            state.draft.clear();
            state.read_cursor = self
                .session
                .contacts()
                .get(&contact)
                .and_then(|c| c.last_read_at);
            state.stream.select(contact)
        };

        let result = self.fetch(&request).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(page) => {
                let outcome = state.stream.apply_page(&request.token, page);
                if let PageOutcome::Initial(_) = outcome {
                    let cursor = state.read_cursor;
                    state.stream.apply_read_cursor(cursor);
                    let scheduled = state.anchor.on_initial_loaded();
                    self.spawn_scroll(&mut state, scheduled);
                    self.spawn_read_cursor(&mut state, request.token.clone());
                }
                Ok(outcome)
            }
            Err(e) => {
                if state.stream.fail(&request.token) {
                    Err(e)
                } else {
                    debug!("dropping stale initial load error for {}: {e}", request.token.contact);
                    Ok(PageOutcome::Stale)
                }
            }
        }
    }

    /// Closes the conversation.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.abort_timers();
        state.anchor.reset();
        state.stream.clear();
        state.draft.clear();
        state.send_error = None;
    }

    /// Loads the next older page. `Ok(None)` when nothing was requested
    /// (history exhausted, a load already running, nothing selected).
    pub async fn load_more(&self) -> Result<Option<PageOutcome>, SourceError> {
        let request = {
            let mut state = self.state.lock().await;
            let Some(request) = state.stream.load_more() else {
                return Ok(None);
            };
            let height = self.viewport.metrics().scroll_height;
            state.anchor.before_prepend(height);
            request
        };

        let result = self.fetch(&request).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(page) => {
                let outcome = state.stream.apply_page(&request.token, page);
                if let PageOutcome::Prepended(_) = outcome {
                    let cursor = state.read_cursor;
                    state.stream.apply_read_cursor(cursor);
                    if let Some(scheduled) = state.anchor.on_prepended() {
                        self.spawn_scroll(&mut state, scheduled);
                    }
                }
                Ok(Some(outcome))
            }
            Err(e) => {
                if state.stream.fail(&request.token) {
                    state.anchor.cancel_prepend();
                    Err(e)
                } else {
                    Ok(Some(PageOutcome::Stale))
                }
            }
        }
    }

    /// Scroll listener: loads older history once the user nears the top.
    pub async fn on_scroll(&self, viewport: Viewport) -> Result<Option<PageOutcome>, SourceError> {
        if near_top(&viewport, &self.session.config().paging) {
            self.load_more().await
        } else {
            Ok(None)
        }
    }

    /// The top sentinel scrolled into view. Only touch viewports rely on it.
    pub async fn on_sentinel_visible(&self) -> Result<Option<PageOutcome>, SourceError> {
        let width = self.viewport.metrics().width;
        if InputKind::for_width(width, &self.session.config().paging).uses_sentinel() {
            self.load_more().await
        } else {
            Ok(None)
        }
    }

    /// Feeds a live message into the session and, when it belongs to the
    /// open conversation, into the stream.
    pub async fn on_live_message(&self, contact: &CanonicalId, message: Message) -> LiveOutcome {
        self.session.record_message(contact, &message);

        let mut state = self.state.lock().await;
        let before = self.viewport.metrics();
        let outcome = state.stream.live_append(contact, message);
        if let LiveOutcome::Appended { at_tail: true } = outcome
            && let Some(scheduled) = state.anchor.on_live_append(&before)
        {
            self.spawn_scroll(&mut state, scheduled);
        }
        outcome
    }

    pub async fn set_automatic_only(&self, automatic_only: bool) {
        self.state.lock().await.automatic_only = automatic_only;
    }

    pub async fn set_draft(&self, text: impl Into<String>) {
        self.state.lock().await.draft.set(text);
    }

    /// Sends the draft to the open contact. `Ok(None)` when there is nothing
    /// to send or a send is already running. On failure the draft is kept
    /// and the error is exposed in the snapshot.
    pub async fn send_draft(&self) -> Result<Option<Message>, SendError> {
        let (contact, recipient, text) = {
            let mut state = self.state.lock().await;
            let Some(contact) = state.stream.contact().cloned() else {
                return Err(SendError::NoActiveContact);
            };
            if state.sending {
                debug!("send ignored, previous send still running");
                return Ok(None);
            }
            let Some(text) = state.draft.outgoing().map(str::to_string) else {
                return Ok(None);
            };
            let stored_id = self
                .session
                .contacts()
                .get(&contact)
                .map(|c| c.stored_id)
                .unwrap_or_else(|| contact.to_string());
            let recipient =
                normalize_recipient(&stored_id, &self.session.config().identity.country_code)?;
            state.sending = true;
            state.send_error = None;
            (contact, recipient, text)
        };

        let result = self
            .session
            .backend()
            .send_text(self.session.organization(), &recipient, &text)
            .await;

        let message = {
            let mut state = self.state.lock().await;
            state.sending = false;
            let still_open = state.stream.contact() == Some(&contact);
            match result {
                Ok(message) => {
                    if still_open && state.draft.outgoing() == Some(text.as_str()) {
                        state.draft.clear();
                    }
                    message
                }
                Err(e) => {
                    warn!("Failed to send message to {recipient}: {e}");
                    if still_open {
                        state.send_error = Some(e.to_string());
                    }
                    let _ = self.session.events().send_failed.send(Arc::new(SendFailed {
                        contact: contact.clone(),
                        error: e.to_string(),
                    }));
                    return Err(SendError::Transport(e));
                }
            }
        };

        self.on_live_message(&contact, message.clone()).await;
        Ok(Some(message))
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        let state = self.state.lock().await;
        let visible = filter_by_origin(state.stream.messages(), state.automatic_only);
        let parts = partition::partition(visible);
        ConversationSnapshot {
            contact: state.stream.contact().cloned(),
            state: state.stream.state(),
            has_more: state.stream.has_more(),
            loading_more: state.stream.is_loading_more(),
            unread: parts.unread.into_iter().cloned().collect(),
            read: parts.read.into_iter().cloned().collect(),
            draft: state.draft.text().to_string(),
            sending: state.sending,
            send_error: state.send_error.clone(),
        }
    }

    fn spawn_scroll(&self, state: &mut ViewState, scheduled: ScheduledScroll) {
        state.timers.retain(|t| !t.is_finished());
        let view = self.clone();
        state.timers.push(tokio::spawn(async move {
            tokio::time::sleep(scheduled.delay).await;
            let command = {
                let mut state = view.state.lock().await;
                let now = view.viewport.metrics();
                state.anchor.fire(&scheduled, &now)
            };
            if let Some(command) = command {
                debug!("scroll: {command:?}");
                view.viewport.apply(command);
            }
        }));
    }

    /// After the settle delay, writes the newest loaded timestamp as the
    /// contact's read-through cursor. One write per opened conversation.
    fn spawn_read_cursor(&self, state: &mut ViewState, token: RequestToken) {
        let view = self.clone();
        let delay = self.session.config().read.cursor_settle();
        state.timers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let read_through = {
                let state = view.state.lock().await;
                if !state.stream.is_current(&token) {
                    return;
                }
                partition::read_through(state.stream.messages())
            };
            let Some(read_through) = read_through else {
                debug!("read cursor: nothing loaded for {}", token.contact);
                return;
            };

            let session = &view.session;
            match session
                .backend()
                .write_read_cursor(session.organization(), &token.contact, read_through)
                .await
            {
                Ok(()) => {
                    if let Some(contact) = session.contacts().mark_read(&token.contact, read_through) {
                        session.publish_contact(&contact);
                    }
                    let _ = session
                        .events()
                        .read_cursor_written
                        .send(Arc::new(ReadCursorWritten {
                            contact: token.contact.clone(),
                            read_through,
                        }));
                }
                Err(e) => warn!("Failed to write read cursor for {}: {e}", token.contact),
            }
        }));
    }
}
