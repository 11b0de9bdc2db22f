use crate::identity::CanonicalId;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation partner as stored by the business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Phone number as typed by the business, formatting included.
    #[serde(alias = "phone", alias = "waId")]
    pub stored_id: String,
    /// Opaque platform recipient (`...@lid`, `...@s.whatsapp.net`).
    #[serde(default, alias = "remoteJid", skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,

    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub stored_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_link_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_push_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_profile_name: Option<String>,
    #[serde(default, alias = "profilePicUrl", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,

    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    /// Read-through cursor: everything up to this instant is read.
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub last_read_at: Option<DateTime<Utc>>,
    /// Absent on partial updates; see [`Contact::unread`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
    #[serde(default, alias = "hasAutomaticMessages")]
    pub has_automatic_message_flag: bool,
}

impl Contact {
    pub fn new(stored_id: impl Into<String>) -> Self {
        Self {
            stored_id: stored_id.into(),
            ..Default::default()
        }
    }

    pub fn canonical_id(&self) -> CanonicalId {
        CanonicalId::new(&self.stored_id)
    }

    pub fn canonical_id_for(&self, country_code: &str) -> CanonicalId {
        CanonicalId::with_country(&self.stored_id, country_code)
    }

    pub fn unread(&self) -> u32 {
        self.unread_count.unwrap_or(0)
    }

    /// Only contacts with at least one message appear in the list.
    pub fn is_listable(&self) -> bool {
        self.last_message_at.is_some()
            || self
                .last_message_preview
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
    }

    /// Folds a newer record for the same contact into this one. Fields the
    /// update leaves empty keep their current value; timestamps never move
    /// backwards.
    pub fn merge_update(&mut self, update: Contact) {
        fn take(slot: &mut Option<String>, incoming: Option<String>) {
            if incoming.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                *slot = incoming;
            }
        }

        if !update.stored_id.trim().is_empty() {
            self.stored_id = update.stored_id;
        }
        take(&mut self.platform_id, update.platform_id);
        take(&mut self.stored_name, update.stored_name);
        take(&mut self.patient_link_name, update.patient_link_name);
        take(&mut self.cached_push_name, update.cached_push_name);
        take(&mut self.cached_profile_name, update.cached_profile_name);
        take(&mut self.photo_url, update.photo_url);

        if update.last_message_at >= self.last_message_at {
            self.last_message_at = update.last_message_at.or(self.last_message_at);
            take(&mut self.last_message_preview, update.last_message_preview);
        }
        self.last_read_at = self.last_read_at.max(update.last_read_at);
        if update.unread_count.is_some() {
            self.unread_count = update.unread_count;
        }
        self.has_automatic_message_flag |= update.has_automatic_message_flag;
    }
}

/// Create/update notification from the contact source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    Created(Contact),
    Updated(Contact),
}

impl ContactEvent {
    pub fn contact(&self) -> &Contact {
        match self {
            ContactEvent::Created(c) | ContactEvent::Updated(c) => c,
        }
    }

    pub fn into_contact(self) -> Contact {
        match self {
            ContactEvent::Created(c) | ContactEvent::Updated(c) => c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_collaborator_shape() {
        let json = r#"{
            "waId": "+55 (51) 99999-9999",
            "remoteJid": "123456@lid",
            "name": "Maria Silva",
            "profilePicUrl": "https://cdn/m.jpg",
            "lastMessageAt": "2024-03-01T12:30:00Z",
            "lastReadAt": "garbage",
            "hasAutomaticMessages": true
        }"#;
        let contact: Contact = serde_json::from_str(json).unwrap();

        assert_eq!(contact.canonical_id().as_str(), "5551999999999");
        assert_eq!(contact.platform_id.as_deref(), Some("123456@lid"));
        assert_eq!(contact.stored_name.as_deref(), Some("Maria Silva"));
        assert!(contact.last_message_at.is_some());
        assert!(contact.last_read_at.is_none());
        assert!(contact.has_automatic_message_flag);
        assert!(contact.is_listable());
    }

    #[test]
    fn test_contact_without_messages_is_not_listable() {
        let mut contact = Contact::new("5551999999999");
        assert!(!contact.is_listable());

        contact.last_message_preview = Some("   ".into());
        assert!(!contact.is_listable());

        contact.last_message_preview = Some("oi".into());
        assert!(contact.is_listable());
    }

    #[test]
    fn test_merge_update_keeps_known_fields() {
        let mut current = Contact::new("5551999999999");
        current.stored_name = Some("Maria".into());
        current.last_message_at = timestamp::parse("2024-03-01T12:00:00Z");
        current.last_read_at = timestamp::parse("2024-03-01T11:00:00Z");

        let mut update = Contact::new("5551999999999");
        update.cached_push_name = Some("Mari".into());
        update.last_message_at = timestamp::parse("2024-03-01T13:00:00Z");
        update.last_message_preview = Some("tudo bem?".into());
        update.unread_count = Some(2);

        current.merge_update(update);

        assert_eq!(current.stored_name.as_deref(), Some("Maria"));
        assert_eq!(current.cached_push_name.as_deref(), Some("Mari"));
        assert_eq!(current.last_message_at, timestamp::parse("2024-03-01T13:00:00Z"));
        assert_eq!(current.last_read_at, timestamp::parse("2024-03-01T11:00:00Z"));
        assert_eq!(current.unread(), 2);
    }

    #[test]
    fn test_partial_update_without_unread_keeps_count() {
        let mut current = Contact::new("5551999999999");
        current.unread_count = Some(3);

        let update: Contact =
            serde_json::from_str(r#"{"waId": "5551999999999", "name": "Maria"}"#).unwrap();
        assert_eq!(update.unread_count, None);
        current.merge_update(update);
        assert_eq!(current.unread(), 3);

        let cleared: Contact =
            serde_json::from_str(r#"{"waId": "5551999999999", "unreadCount": 0}"#).unwrap();
        current.merge_update(cleared);
        assert_eq!(current.unread_count, Some(0));
    }

    #[test]
    fn test_merge_update_ignores_older_last_message() {
        let mut current = Contact::new("5551999999999");
        current.last_message_at = timestamp::parse("2024-03-01T13:00:00Z");
        current.last_message_preview = Some("newest".into());

        let mut stale = Contact::new("5551999999999");
        stale.last_message_at = timestamp::parse("2024-03-01T10:00:00Z");
        stale.last_message_preview = Some("older".into());

        current.merge_update(stale);
        assert_eq!(current.last_message_preview.as_deref(), Some("newest"));
    }
}
