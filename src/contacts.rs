//! Live contact book keyed by canonical id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use inbox_core::config::DEFAULT_COUNTRY_CODE;
use inbox_core::message::Message;
use inbox_core::{CanonicalId, Contact, ContactEvent};
use log::{debug, warn};

/// Keyed by the country-code-normalized id, so both written forms of one
/// number land on the same record.
#[derive(Debug)]
pub struct ContactBook {
    contacts: DashMap<CanonicalId, Contact>,
    country_code: String,
}

impl Default for ContactBook {
    fn default() -> Self {
        Self::with_country_code(DEFAULT_COUNTRY_CODE)
    }
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country_code(country_code: impl Into<String>) -> Self {
        Self {
            contacts: DashMap::new(),
            country_code: country_code.into(),
        }
    }

    pub fn canonical_id(&self, raw: &str) -> CanonicalId {
        CanonicalId::with_country(raw, &self.country_code)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, id: &CanonicalId) -> Option<Contact> {
        self.contacts.get(id).map(|c| c.value().clone())
    }

    pub fn all(&self) -> Vec<Contact> {
        self.contacts.iter().map(|c| c.value().clone()).collect()
    }

    /// Replaces the whole book. Records sharing a canonical id are merged.
    pub fn replace_all(&self, contacts: Vec<Contact>) -> usize {
        self.contacts.clear();
        for contact in contacts {
            self.upsert(contact);
        }
        self.contacts.len()
    }

    /// Inserts or merges a record. Returns the stored result, or `None` for
    /// records without a usable phone number.
    pub fn upsert(&self, contact: Contact) -> Option<Contact> {
        let id = contact.canonical_id_for(&self.country_code);
        if id.is_empty() {
            warn!(
                "Ignoring contact without digits in stored id {:?}",
                contact.stored_id
            );
            return None;
        }
        let entry = self
            .contacts
            .entry(id)
            .and_modify(|existing| existing.merge_update(contact.clone()))
            .or_insert_with(|| contact.clone());
        Some(entry.value().clone())
    }

    pub fn apply_event(&self, event: ContactEvent) -> Option<Contact> {
        debug!(
            "contact event for {}",
            event.contact().canonical_id_for(&self.country_code)
        );
        self.upsert(event.into_contact())
    }

    /// Bumps recency and, for inbound messages past the read cursor, the
    /// unread count.
    pub fn record_message(&self, id: &CanonicalId, message: &Message) -> Option<Contact> {
        let mut entry = self.contacts.get_mut(id)?;
        let at = message.effective_timestamp();

        let is_newer = match (entry.last_message_at, at) {
            (Some(current), Some(at)) => at >= current,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if is_newer {
            if at.is_some() {
                entry.last_message_at = at;
            }
            entry.last_message_preview = Some(message.display_text().to_string());
        }

        let past_cursor = match (entry.last_read_at, at) {
            (Some(cursor), Some(at)) => at > cursor,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if message.is_inbound() && past_cursor {
            entry.unread_count = Some(entry.unread() + 1);
        }
        Some(entry.value().clone())
    }

    /// Moves the read cursor forward and clears the unread count.
    pub fn mark_read(&self, id: &CanonicalId, read_through: DateTime<Utc>) -> Option<Contact> {
        let mut entry = self.contacts.get_mut(id)?;
        entry.last_read_at = entry.last_read_at.max(Some(read_through));
        entry.unread_count = Some(0);
        Some(entry.value().clone())
    }
}
