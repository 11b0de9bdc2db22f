//! Paginated message history for the active contact.
//!
//! The stream owns the loaded messages and the loader state machine:
//!
//! ```text
//! Empty -> LoadingInitial -> Ready <-> LoadingMore
//! ```
//!
//! It performs no I/O. Operations that need data return a [`PageRequest`];
//! the caller fetches it and hands the result back through
//! [`MessageStream::apply_page`] together with the request's token. Tokens
//! carry the contact and a selection generation, so a response that arrives
//! after the user moved on is recognized and dropped.

use crate::config::PagingConfig;
use crate::identity::CanonicalId;
use crate::message::Message;
use crate::partition;
use crate::scroll::{InputKind, Viewport};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Empty,
    LoadingInitial,
    Ready,
    LoadingMore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderTransition {
    Select,
    InitialLoaded,
    InitialFailed,
    RequestMore,
    MoreLoaded,
    MoreFailed,
    Clear,
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: LoaderState,
    pub attempted: LoaderTransition,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {:?} in state {:?}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Identifies the selection a request was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub contact: CanonicalId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// The most recent `limit` messages.
    Latest,
    /// Messages strictly older than the given position.
    Before {
        timestamp: Option<DateTime<Utc>>,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub token: RequestToken,
    pub cursor: PageCursor,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Any order; the stream sorts on merge.
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub merged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// First page for this selection landed.
    Initial(MergeStats),
    /// An older page was merged in front of the loaded history.
    Prepended(MergeStats),
    /// Response for a superseded selection or a request no longer pending.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// Inserted in order. `at_tail` is false when the message was older
    /// than something already loaded.
    Appended { at_tail: bool },
    /// Same delivery already loaded; fields were folded in.
    Merged,
    /// Initial page still loading; held until it lands.
    Buffered,
    /// Not for the active contact, or nothing selected.
    Ignored,
}

/// Merges `incoming` into `existing` and restores chronological order.
///
/// External-id matches take precedence over id matches; a match is folded
/// into the already loaded message instead of being appended.
pub fn merge_messages(existing: &mut Vec<Message>, incoming: Vec<Message>) -> MergeStats {
    let mut by_external: HashMap<String, usize> = HashMap::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for (pos, msg) in existing.iter().enumerate() {
        if let Some(ext) = &msg.external_id {
            by_external.entry(ext.clone()).or_insert(pos);
        }
        by_id.entry(msg.id.clone()).or_insert(pos);
    }

    let mut stats = MergeStats::default();
    for msg in incoming {
        let target = msg
            .external_id
            .as_ref()
            .and_then(|ext| by_external.get(ext))
            .or_else(|| by_id.get(&msg.id))
            .copied();

        match target {
            Some(pos) => {
                existing[pos].absorb(msg);
                if let Some(ext) = &existing[pos].external_id {
                    by_external.entry(ext.clone()).or_insert(pos);
                }
                stats.merged += 1;
            }
            None => {
                let pos = existing.len();
                if let Some(ext) = &msg.external_id {
                    by_external.insert(ext.clone(), pos);
                }
                by_id.insert(msg.id.clone(), pos);
                existing.push(msg);
                stats.added += 1;
            }
        }
    }

    existing.sort_by(Message::chronological_cmp);
    stats
}

/// Position of the loaded record for the same delivery as `incoming`,
/// with the same precedence as [`merge_messages`]: an external-id match
/// anywhere beats an id match.
fn find_delivery(loaded: &[Message], incoming: &Message) -> Option<usize> {
    incoming
        .external_id
        .as_ref()
        .and_then(|ext| {
            loaded
                .iter()
                .position(|m| m.external_id.as_ref() == Some(ext))
        })
        .or_else(|| loaded.iter().position(|m| m.id == incoming.id))
}

/// Whether a scroll position asks for older history.
pub fn near_top(viewport: &Viewport, config: &PagingConfig) -> bool {
    let threshold = match InputKind::for_width(viewport.width, config) {
        InputKind::Touch => config.near_top_touch,
        InputKind::Pointer => config.near_top_pointer,
    };
    viewport.scroll_top < threshold
}

#[derive(Debug)]
pub struct MessageStream {
    contact: Option<CanonicalId>,
    generation: u64,
    state: LoaderState,
    messages: Vec<Message>,
    has_more: bool,
    pending_live: Vec<Message>,
    page_size: usize,
}

impl MessageStream {
    pub fn new(page_size: usize) -> Self {
        Self {
            contact: None,
            generation: 0,
            state: LoaderState::Empty,
            messages: Vec::new(),
            has_more: false,
            pending_live: Vec::new(),
            page_size: page_size.max(1),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn contact(&self) -> Option<&CanonicalId> {
        self.contact.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading_more(&self) -> bool {
        self.state == LoaderState::LoadingMore
    }

    pub fn token(&self) -> Option<RequestToken> {
        self.contact.clone().map(|contact| RequestToken {
            contact,
            generation: self.generation,
        })
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        token.generation == self.generation && self.contact.as_ref() == Some(&token.contact)
    }

    pub fn apply_transition(
        &mut self,
        transition: LoaderTransition,
    ) -> Result<(), InvalidTransition> {
        use LoaderState::*;
        use LoaderTransition as T;

        let next = match (self.state, &transition) {
            // Select and Clear are accepted from every state.
            (_, T::Select) => LoadingInitial,
            (_, T::Clear) => Empty,
            (LoadingInitial, T::InitialLoaded) => Ready,
            (LoadingInitial, T::InitialFailed) => Empty,
            (Ready, T::RequestMore) => LoadingMore,
            (LoadingMore, T::MoreLoaded) => Ready,
            (LoadingMore, T::MoreFailed) => Ready,
            (current, _) => {
                return Err(InvalidTransition {
                    current_state: current,
                    attempted: transition.clone(),
                });
            }
        };
        self.state = next;
        Ok(())
    }

    /// Starts a fresh selection and returns the request for its newest page.
    /// Anything in flight for the previous selection becomes stale.
    pub fn select(&mut self, contact: CanonicalId) -> PageRequest {
        self.generation += 1;
        self.contact = Some(contact.clone());
        self.messages.clear();
        self.pending_live.clear();
        self.has_more = false;
        let _ = self.apply_transition(LoaderTransition::Select);

        debug!(
            "stream: selected {} (generation {})",
            contact, self.generation
        );
        PageRequest {
            token: RequestToken {
                contact,
                generation: self.generation,
            },
            cursor: PageCursor::Latest,
            limit: self.page_size,
        }
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.contact = None;
        self.messages.clear();
        self.pending_live.clear();
        self.has_more = false;
        let _ = self.apply_transition(LoaderTransition::Clear);
    }

    /// Request for the next older page, or `None` when there is nothing to
    /// load or a load is already running.
    pub fn load_more(&mut self) -> Option<PageRequest> {
        if !self.has_more {
            debug!("stream: load_more ignored, history exhausted");
            return None;
        }
        let oldest = self.messages.first()?;
        let cursor = PageCursor::Before {
            timestamp: oldest.effective_timestamp(),
            id: oldest.id.clone(),
        };
        if let Err(e) = self.apply_transition(LoaderTransition::RequestMore) {
            debug!("stream: load_more ignored: {e}");
            return None;
        }
        let token = self.token()?;
        Some(PageRequest {
            token,
            cursor,
            limit: self.page_size,
        })
    }

    pub fn apply_page(&mut self, token: &RequestToken, page: MessagePage) -> PageOutcome {
        if !self.is_current(token) {
            debug!(
                "stream: dropping stale page for {} (generation {}, current {})",
                token.contact, token.generation, self.generation
            );
            return PageOutcome::Stale;
        }

        match self.state {
            LoaderState::LoadingInitial => {
                let mut incoming = page.messages;
                incoming.append(&mut self.pending_live);
                let stats = merge_messages(&mut self.messages, incoming);
                self.has_more = page.has_more;
                let _ = self.apply_transition(LoaderTransition::InitialLoaded);
                debug!(
                    "stream: initial page for {}: {} messages, has_more={}",
                    token.contact,
                    self.messages.len(),
                    self.has_more
                );
                PageOutcome::Initial(stats)
            }
            LoaderState::LoadingMore => {
                let stats = merge_messages(&mut self.messages, page.messages);
                // A page made only of duplicates cannot move the cursor.
                self.has_more = page.has_more && stats.added > 0;
                let _ = self.apply_transition(LoaderTransition::MoreLoaded);
                debug!(
                    "stream: older page for {}: {} new, {} duplicates",
                    token.contact, stats.added, stats.merged
                );
                PageOutcome::Prepended(stats)
            }
            state => {
                debug!("stream: page arrived with no request pending ({state:?})");
                PageOutcome::Stale
            }
        }
    }

    /// Records a failed fetch. Returns false when the failure was stale.
    pub fn fail(&mut self, token: &RequestToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        let transition = match self.state {
            LoaderState::LoadingInitial => LoaderTransition::InitialFailed,
            LoaderState::LoadingMore => LoaderTransition::MoreFailed,
            _ => return false,
        };
        warn!("stream: fetch failed for {} in {:?}", token.contact, self.state);
        self.apply_transition(transition).is_ok()
    }

    pub fn live_append(&mut self, contact: &CanonicalId, message: Message) -> LiveOutcome {
        if self.contact.as_ref() != Some(contact) {
            return LiveOutcome::Ignored;
        }
        match self.state {
            LoaderState::Empty => LiveOutcome::Ignored,
            LoaderState::LoadingInitial => {
                self.pending_live.push(message);
                LiveOutcome::Buffered
            }
            LoaderState::Ready | LoaderState::LoadingMore => {
                if let Some(pos) = find_delivery(&self.messages, &message) {
                    self.messages[pos].absorb(message);
                    self.messages.sort_by(Message::chronological_cmp);
                    return LiveOutcome::Merged;
                }
                let pos = self
                    .messages
                    .binary_search_by(|m| m.chronological_cmp(&message))
                    .unwrap_or_else(|pos| pos);
                self.messages.insert(pos, message);
                LiveOutcome::Appended {
                    at_tail: pos + 1 == self.messages.len(),
                }
            }
        }
    }

    /// Projects the contact's read-through cursor onto loaded messages.
    pub fn apply_read_cursor(&mut self, cursor: Option<DateTime<Utc>>) {
        partition::apply_read_cursor(&mut self.messages, cursor);
    }
}
