//! Messaging session for one organization.
//!
//! Holds what every conversation view shares: the profile index (fetched
//! once, never invalidated), the live contact book and the event bus.

use crate::contacts::ContactBook;
use crate::conversation::{ConversationView, ViewportHandle};
use crate::events::{ContactUpdated, EventBus, MessageAppended, ProfileCacheUnavailable};
use inbox_core::filter::{ContactFilter, ContactRow, build_rows};
use inbox_core::traits::Backend;
use inbox_core::{
    CanonicalId, Contact, ContactEvent, InboxConfig, Message, ProfileIndex, ResolvedContact,
    SourceError, resolve,
};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct MessagingSession {
    organization: String,
    config: InboxConfig,
    backend: Arc<dyn Backend>,
    profiles: OnceCell<Arc<ProfileIndex>>,
    contacts: ContactBook,
    events: EventBus,
}

impl std::fmt::Debug for MessagingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingSession")
            .field("organization", &self.organization)
            .field("contacts", &self.contacts.len())
            .field("profiles_loaded", &self.profiles.initialized())
            .finish()
    }
}

impl MessagingSession {
    pub fn new(
        organization: impl Into<String>,
        backend: Arc<dyn Backend>,
        config: InboxConfig,
    ) -> Arc<Self> {
        let contacts = ContactBook::with_country_code(config.identity.country_code.clone());
        Arc::new(Self {
            organization: organization.into(),
            config,
            backend,
            profiles: OnceCell::new(),
            contacts,
            events: EventBus::new(),
        })
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Canonical id of a phone number as this session keys it.
    pub fn canonical_id(&self, raw: &str) -> CanonicalId {
        self.contacts.canonical_id(raw)
    }

    /// The profile index, fetching the snapshot on first use. A failed fetch
    /// is logged and leaves the session without enrichment for its lifetime.
    pub async fn profile_index(&self) -> Arc<ProfileIndex> {
        self.profiles
            .get_or_init(|| async {
                let identity = &self.config.identity;
                match self.backend.fetch_snapshot(&self.organization).await {
                    Ok(snapshot) => {
                        info!(
                            "Loaded profile cache for {} ({} keys)",
                            self.organization,
                            snapshot.len()
                        );
                        Arc::new(ProfileIndex::build(snapshot, identity))
                    }
                    Err(e) => {
                        warn!(
                            "Profile cache unavailable for {}, continuing without it: {e}",
                            self.organization
                        );
                        let _ = self.events.profile_cache_unavailable.send(Arc::new(
                            ProfileCacheUnavailable {
                                organization: self.organization.clone(),
                                error: e.to_string(),
                            },
                        ));
                        Arc::new(ProfileIndex::empty(identity))
                    }
                }
            })
            .await
            .clone()
    }

    /// Reloads every contact from the contact source.
    pub async fn refresh_contacts(&self) -> Result<usize, SourceError> {
        let contacts = self.backend.list_contacts(&self.organization).await?;
        let count = self.contacts.replace_all(contacts);
        info!("Loaded {count} contacts for {}", self.organization);
        Ok(count)
    }

    pub fn apply_contact_event(&self, event: ContactEvent) -> Option<Contact> {
        let contact = self.contacts.apply_event(event)?;
        self.publish_contact(&contact);
        Some(contact)
    }

    /// Records a live message in the contact book and broadcasts it. The
    /// open conversation, if any, is fed separately through
    /// [`ConversationView::on_live_message`].
    pub fn record_message(&self, contact: &CanonicalId, message: &Message) {
        if let Some(updated) = self.contacts.record_message(contact, message) {
            self.publish_contact(&updated);
        }
        let _ = self.events.message_appended.send(Arc::new(MessageAppended {
            contact: contact.clone(),
            message: message.clone(),
        }));
    }

    pub(crate) fn publish_contact(&self, contact: &Contact) {
        let _ = self
            .events
            .contact_updated
            .send(Arc::new(ContactUpdated {
                contact: contact.clone(),
            }));
    }

    pub async fn resolve_contact(&self, id: &CanonicalId) -> Option<ResolvedContact> {
        let contact = self.contacts.get(id)?;
        let index = self.profile_index().await;
        Some(resolve(&contact, &index))
    }

    /// Listable contacts, resolved, filtered and most recent first.
    pub async fn contact_list(&self, filter: &ContactFilter) -> Vec<ContactRow> {
        let index = self.profile_index().await;
        build_rows(self.contacts.all(), &index)
            .into_iter()
            .filter(|row| filter.matches(row))
            .collect()
    }

    pub fn open_conversation(self: &Arc<Self>, viewport: Arc<dyn ViewportHandle>) -> ConversationView {
        ConversationView::new(Arc::clone(self), viewport)
    }
}
