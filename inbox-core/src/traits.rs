//! Collaborators the inbox consumes. Implementations live outside the core
//! (platform adapters, or the in-memory ones used by tests and the CLI).

use crate::contact::Contact;
use crate::error::Result;
use crate::identity::CanonicalId;
use crate::message::Message;
use crate::profile::ProfileSnapshot;
use crate::stream::{MessagePage, PageCursor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Every contact of the organization, in any order.
    async fn list_contacts(&self, organization: &str) -> Result<Vec<Contact>>;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Up to `limit` messages of one conversation at `cursor`, newest
    /// first or in any order. `has_more` tells whether older ones exist.
    async fn fetch_page(
        &self,
        organization: &str,
        contact: &CanonicalId,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<MessagePage>;
}

#[async_trait]
pub trait ProfileCacheService: Send + Sync {
    async fn fetch_snapshot(&self, organization: &str) -> Result<ProfileSnapshot>;
}

#[async_trait]
pub trait ReadCursorWriter: Send + Sync {
    async fn write_read_cursor(
        &self,
        organization: &str,
        contact: &CanonicalId,
        read_through: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends a text and returns the platform's record of the new message.
    async fn send_text(&self, organization: &str, recipient: &str, text: &str)
    -> Result<Message>;
}

pub trait Backend:
    ContactSource + MessageSource + ProfileCacheService + ReadCursorWriter + MessageSender + Send + Sync
{
}

impl<T> Backend for T where
    T: ContactSource
        + MessageSource
        + ProfileCacheService
        + ReadCursorWriter
        + MessageSender
        + Send
        + Sync
{
}
