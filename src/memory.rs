//! In-memory collaborators for tests and the CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inbox_core::error::Result;
use inbox_core::message::{ContentKind, MessageOrigin};
use inbox_core::partition::unread_count;
use inbox_core::profile::ProfileSnapshot;
use inbox_core::scroll::{ScrollCommand, Viewport};
use inbox_core::stream::{MessagePage, PageCursor};
use inbox_core::traits::{
    ContactSource, MessageSender, MessageSource, ProfileCacheService, ReadCursorWriter,
};
use inbox_core::{CanonicalId, Contact, Direction, Message, SourceError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::conversation::ViewportHandle;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    contacts: Mutex<Vec<Contact>>,
    messages: Mutex<HashMap<CanonicalId, Vec<Message>>>,
    profiles: Mutex<Option<ProfileSnapshot>>,
    fetch_delays: Mutex<HashMap<CanonicalId, Duration>>,
    /// Already-loaded boundary messages repeated on older pages.
    page_overlap: usize,
    /// Country code for keying contacts; the default one when unset.
    country_code: Option<String>,
    fail_fetches: AtomicBool,
    fail_sends: AtomicBool,
    snapshot_fetches: AtomicUsize,
    page_fetches: AtomicUsize,
    next_id: AtomicU64,
    read_cursors: Mutex<Vec<(CanonicalId, DateTime<Utc>)>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(mut self, snapshot: ProfileSnapshot) -> Self {
        *self.profiles.get_mut() = Some(snapshot);
        self
    }

    pub fn with_fetch_delay(mut self, contact: CanonicalId, delay: Duration) -> Self {
        self.fetch_delays.get_mut().insert(contact, delay);
        self
    }

    pub fn with_page_overlap(mut self, overlap: usize) -> Self {
        self.page_overlap = overlap;
        self
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }

    fn canonical_id(&self, raw: &str) -> CanonicalId {
        match &self.country_code {
            Some(cc) => CanonicalId::with_country(raw, cc),
            None => CanonicalId::new(raw),
        }
    }

    pub async fn add_contact(&self, contact: Contact) {
        self.contacts.lock().await.push(contact);
    }

    pub async fn add_messages(&self, contact: &CanonicalId, messages: Vec<Message>) {
        self.messages
            .lock()
            .await
            .entry(contact.clone())
            .or_default()
            .extend(messages);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot_fetches(&self) -> usize {
        self.snapshot_fetches.load(Ordering::SeqCst)
    }

    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    pub async fn read_cursor_writes(&self) -> Vec<(CanonicalId, DateTime<Utc>)> {
        self.read_cursors.lock().await.clone()
    }

    pub async fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    fn page_of(&self, mut history: Vec<Message>, cursor: &PageCursor, limit: usize) -> MessagePage {
        history.sort_by(Message::chronological_cmp);
        let end = match cursor {
            PageCursor::Latest => history.len(),
            PageCursor::Before { timestamp, id } => history
                .iter()
                .position(|m| (m.effective_timestamp(), &m.id) >= (*timestamp, id))
                .unwrap_or(history.len()),
        };
        let start = end.saturating_sub(limit);
        let end = match cursor {
            PageCursor::Latest => end,
            PageCursor::Before { .. } => (end + self.page_overlap).min(history.len()),
        };
        let mut messages = history[start..end].to_vec();
        messages.reverse();
        MessagePage {
            messages,
            has_more: start > 0,
        }
    }
}

#[async_trait]
impl ContactSource for MemoryBackend {
    async fn list_contacts(&self, _organization: &str) -> Result<Vec<Contact>> {
        let contacts = self.contacts.lock().await.clone();
        let messages = self.messages.lock().await;
        Ok(contacts
            .into_iter()
            .map(|mut contact| {
                if let Some(history) = messages.get(&self.canonical_id(&contact.stored_id)) {
                    contact.unread_count =
                        Some(unread_count(history, contact.last_read_at) as u32);
                    let newest = history.iter().max_by(|a, b| a.chronological_cmp(b));
                    if let Some(newest) = newest
                        && contact.last_message_at.is_none()
                    {
                        contact.last_message_at = newest.effective_timestamp();
                        contact.last_message_preview = Some(newest.display_text().to_string());
                    }
                }
                contact
            })
            .collect())
    }
}

#[async_trait]
impl MessageSource for MemoryBackend {
    async fn fetch_page(
        &self,
        _organization: &str,
        contact: &CanonicalId,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<MessagePage> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.fetch_delays.lock().await.get(contact).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("message store offline".into()));
        }
        let history = self
            .messages
            .lock()
            .await
            .get(contact)
            .cloned()
            .unwrap_or_default();
        Ok(self.page_of(history, cursor, limit))
    }
}

#[async_trait]
impl ProfileCacheService for MemoryBackend {
    async fn fetch_snapshot(&self, organization: &str) -> Result<ProfileSnapshot> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        self.profiles.lock().await.clone().ok_or_else(|| {
            SourceError::Unavailable(format!("no profile cache for {organization}"))
        })
    }
}

#[async_trait]
impl ReadCursorWriter for MemoryBackend {
    async fn write_read_cursor(
        &self,
        _organization: &str,
        contact: &CanonicalId,
        read_through: DateTime<Utc>,
    ) -> Result<()> {
        self.read_cursors
            .lock()
            .await
            .push((contact.clone(), read_through));
        for stored in self.contacts.lock().await.iter_mut() {
            if &self.canonical_id(&stored.stored_id) == contact {
                stored.last_read_at = stored.last_read_at.max(Some(read_through));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSender for MemoryBackend {
    async fn send_text(&self, _organization: &str, recipient: &str, text: &str) -> Result<Message> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SourceError::Rejected(format!("recipient {recipient} unreachable")));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = Message::new(format!("sent-{n}"), Direction::Outbound, Utc::now())
            .with_external_id(format!("wamid.sent-{n}"))
            .with_text(text);
        message.source = MessageOrigin::Manual;
        message.content_kind = ContentKind::Text;

        self.sent
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        self.add_messages(&self.canonical_id(recipient), vec![message.clone()])
            .await;
        Ok(message)
    }
}

/// Viewport stand-in that records every command and applies it to its own
/// metrics.
#[derive(Debug, Default)]
pub struct RecordingViewport {
    metrics: std::sync::Mutex<Viewport>,
    commands: std::sync::Mutex<Vec<ScrollCommand>>,
}

impl RecordingViewport {
    pub fn new(metrics: Viewport) -> Self {
        Self {
            metrics: std::sync::Mutex::new(metrics),
            commands: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn set_metrics(&self, metrics: Viewport) {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner()) = metrics;
    }

    /// Simulates layout: content grows by `delta` pixels.
    pub fn grow(&self, delta: f64) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .scroll_height += delta;
    }

    pub fn commands(&self) -> Vec<ScrollCommand> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ViewportHandle for RecordingViewport {
    fn metrics(&self) -> Viewport {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, command: ScrollCommand) {
        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        metrics.scroll_top = match command {
            ScrollCommand::ScrollToBottom => (metrics.scroll_height - metrics.client_height).max(0.0),
            ScrollCommand::SetOffset(offset) => offset,
        };
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
    }
}
