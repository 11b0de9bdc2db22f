use crate::contact::Contact;
use crate::profile::ProfileIndex;
use crate::resolver::{ResolvedContact, resolve};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A contact paired with its resolved display identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRow {
    pub contact: Contact,
    pub resolved: ResolvedContact,
}

impl ContactRow {
    pub fn new(contact: Contact, index: &ProfileIndex) -> Self {
        let resolved = resolve(&contact, index);
        Self { contact, resolved }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContactFilter {
    pub search: String,
    /// Keep only contacts that received automatic messages.
    pub automatic_only: bool,
}

impl ContactFilter {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: text.into(),
            ..Default::default()
        }
    }

    pub fn automatic_only(mut self, automatic_only: bool) -> Self {
        self.automatic_only = automatic_only;
        self
    }

    /// Case-insensitive match on the resolved name or formatted phone, or a
    /// raw substring of the stored id.
    pub fn matches(&self, row: &ContactRow) -> bool {
        if self.automatic_only && !row.contact.has_automatic_message_flag {
            return false;
        }
        let needle = self.search.trim();
        if needle.is_empty() {
            return true;
        }
        let lowered = needle.to_lowercase();
        row.resolved.display_name.to_lowercase().contains(&lowered)
            || row.resolved.formatted_phone.to_lowercase().contains(&lowered)
            || row.contact.stored_id.contains(needle)
    }

    pub fn apply<'a>(&self, rows: &'a [ContactRow]) -> Vec<&'a ContactRow> {
        rows.iter().filter(|row| self.matches(row)).collect()
    }
}

/// Most recent conversation first; ties broken by canonical id.
pub fn recency_cmp(a: &ContactRow, b: &ContactRow) -> Ordering {
    b.contact
        .last_message_at
        .cmp(&a.contact.last_message_at)
        .then_with(|| a.resolved.canonical_id.cmp(&b.resolved.canonical_id))
}

/// Resolves listable contacts and orders them for display.
pub fn build_rows(
    contacts: impl IntoIterator<Item = Contact>,
    index: &ProfileIndex,
) -> Vec<ContactRow> {
    let mut rows: Vec<ContactRow> = contacts
        .into_iter()
        .filter(Contact::is_listable)
        .map(|contact| ContactRow::new(contact, index))
        .collect();
    rows.sort_by(recency_cmp);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::timestamp;

    fn contact(id: &str, name: Option<&str>, at: Option<&str>) -> Contact {
        let mut c = Contact::new(id);
        c.stored_name = name.map(String::from);
        c.last_message_at = at.and_then(timestamp::parse);
        c
    }

    fn rows() -> Vec<ContactRow> {
        let index = ProfileIndex::empty(&IdentityConfig::default());
        let mut automatic = contact("5511888888888", Some("Carlos"), Some("2024-03-01T10:00:00Z"));
        automatic.has_automatic_message_flag = true;
        build_rows(
            vec![
                contact("5551999999999", Some("Maria Silva"), Some("2024-03-01T12:00:00Z")),
                automatic,
                contact("5521777777777", None, Some("2024-03-01T11:00:00Z")),
                contact("5531666666666", Some("Sem mensagens"), None),
            ],
            &index,
        )
    }

    fn names<'a>(rows: impl IntoIterator<Item = &'a ContactRow>) -> Vec<&'a str> {
        rows.into_iter()
            .map(|r| r.resolved.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_build_rows_lists_only_contacts_with_messages_by_recency() {
        let rows = rows();
        assert_eq!(
            names(&rows),
            ["Maria Silva", "+55 (21) 77777-7777", "Carlos"]
        );
    }

    #[test]
    fn test_search_by_name_is_case_insensitive() {
        let rows = rows();
        let filter = ContactFilter::search("maria");
        assert_eq!(names(filter.apply(&rows)), ["Maria Silva"]);
    }

    #[test]
    fn test_search_by_phone_forms() {
        let rows = rows();
        assert_eq!(names(ContactFilter::search("(21)").apply(&rows)), ["+55 (21) 77777-7777"]);
        assert_eq!(names(ContactFilter::search("551188").apply(&rows)), ["Carlos"]);
    }

    #[test]
    fn test_empty_search_keeps_everything() {
        let rows = rows();
        assert_eq!(ContactFilter::search("   ").apply(&rows).len(), 3);
    }

    #[test]
    fn test_automatic_only() {
        let rows = rows();
        let filter = ContactFilter::default().automatic_only(true);
        assert_eq!(names(filter.apply(&rows)), ["Carlos"]);

        let filter = ContactFilter::search("maria").automatic_only(true);
        assert!(filter.apply(&rows).is_empty());
    }
}
