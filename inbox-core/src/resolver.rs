//! Display identity for a contact.
//!
//! Combines the stored contact record with the profile index following a
//! fixed priority chain per field. The chains are business policy: changing
//! their order changes what users see.

use crate::contact::Contact;
use crate::identity::{CanonicalId, format_phone};
use crate::profile::{MatchKind, ProfileField, ProfileIndex};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NameSource {
    StoredName,
    PatientLink,
    ProfilePushName,
    CachedPushName,
    CachedProfileName,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PhotoSource {
    /// Profile cache entry keyed by the platform identifier.
    ProfileByPlatformId,
    /// Profile cache entry found through a variant or structural match.
    ProfileByNumber,
    /// Photo URL persisted on the contact record.
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContact {
    pub canonical_id: CanonicalId,
    pub display_name: String,
    pub formatted_phone: String,
    pub photo_url: Option<String>,
    pub name_source: NameSource,
    pub photo_source: Option<PhotoSource>,
}

impl ResolvedContact {
    /// Letter shown in the placeholder avatar when there is no photo.
    pub fn initial(&self) -> char {
        self.display_name
            .chars()
            .find(|c| c.is_alphanumeric())
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A stored name that is really just the phone number again, in either
/// country-code form.
fn is_phone_echo(
    name: &str,
    contact: &Contact,
    formatted: &str,
    id: &CanonicalId,
    country_code: &str,
) -> bool {
    if name == formatted || name == contact.stored_id.trim() {
        return true;
    }
    let phone_chars = name
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '(' | ')' | '-' | '.'));
    phone_chars && !id.is_empty() && CanonicalId::with_country(name, country_code) == *id
}

fn resolve_name(
    contact: &Contact,
    index: &ProfileIndex,
    id: &CanonicalId,
    formatted: &str,
) -> (String, NameSource) {
    let stored = non_blank(contact.stored_name.as_deref())
        .map(|n| (n, NameSource::StoredName))
        .or_else(|| {
            non_blank(contact.patient_link_name.as_deref()).map(|n| (n, NameSource::PatientLink))
        });
    if let Some((name, source)) = stored
        && !is_phone_echo(name, contact, formatted, id, &index.config().country_code)
    {
        return (name.to_string(), source);
    }

    if let Some(found) = index.lookup(id, contact.platform_id.as_deref(), ProfileField::PushName) {
        return (found.value.trim().to_string(), NameSource::ProfilePushName);
    }

    if let Some(name) = non_blank(contact.cached_push_name.as_deref()) {
        return (name.to_string(), NameSource::CachedPushName);
    }
    if let Some(name) = non_blank(contact.cached_profile_name.as_deref()) {
        return (name.to_string(), NameSource::CachedProfileName);
    }
    (formatted.to_string(), NameSource::Phone)
}

fn resolve_photo(
    contact: &Contact,
    index: &ProfileIndex,
    id: &CanonicalId,
) -> Option<(String, PhotoSource)> {
    if let Some(found) = index.lookup(id, contact.platform_id.as_deref(), ProfileField::PhotoUrl) {
        let source = match found.kind {
            MatchKind::PlatformId => PhotoSource::ProfileByPlatformId,
            MatchKind::Variant | MatchKind::Structural | MatchKind::PlatformStructural => {
                PhotoSource::ProfileByNumber
            }
        };
        return Some((found.value.to_string(), source));
    }
    non_blank(contact.photo_url.as_deref()).map(|url| (url.to_string(), PhotoSource::Persisted))
}

/// Resolves the display name and photo for one contact.
///
/// Pure: the same contact and index always produce the same result.
pub fn resolve(contact: &Contact, index: &ProfileIndex) -> ResolvedContact {
    let country_code = &index.config().country_code;
    let id = contact.canonical_id_for(country_code);
    let formatted = format_phone(&contact.stored_id, country_code);
    let (display_name, name_source) = resolve_name(contact, index, &id, &formatted);
    let photo = resolve_photo(contact, index, &id);

    ResolvedContact {
        canonical_id: id,
        display_name,
        formatted_phone: formatted,
        photo_url: photo.as_ref().map(|(url, _)| url.clone()),
        name_source,
        photo_source: photo.map(|(_, source)| source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::profile::{ProfileEntry, ProfileSnapshot};

    fn index(entries: &[(&str, Option<&str>, Option<&str>)]) -> ProfileIndex {
        let snapshot = ProfileSnapshot::new(entries.iter().map(|(k, name, photo)| {
            (
                k.to_string(),
                ProfileEntry {
                    push_name: name.map(String::from),
                    photo_url: photo.map(String::from),
                },
            )
        }));
        ProfileIndex::build(snapshot, &IdentityConfig::default())
    }

    #[test]
    fn test_push_name_from_variant_without_country_code() {
        let idx = index(&[("51999999999@s.whatsapp.net", Some("Maria"), None)]);
        let contact = Contact::new("5551999999999");

        let resolved = resolve(&contact, &idx);
        assert_eq!(resolved.display_name, "Maria");
        assert_eq!(resolved.name_source, NameSource::ProfilePushName);
    }

    #[test]
    fn test_stored_name_wins_over_cache() {
        let idx = index(&[("5551999999999", Some("Mari"), None)]);
        let mut contact = Contact::new("5551999999999");
        contact.stored_name = Some("  Maria Silva ".into());
        contact.patient_link_name = Some("Paciente".into());

        let resolved = resolve(&contact, &idx);
        assert_eq!(resolved.display_name, "Maria Silva");
        assert_eq!(resolved.name_source, NameSource::StoredName);
    }

    #[test]
    fn test_patient_link_name_used_without_stored_name() {
        let idx = index(&[]);
        let mut contact = Contact::new("5551999999999");
        contact.patient_link_name = Some("Joana".into());

        assert_eq!(resolve(&contact, &idx).name_source, NameSource::PatientLink);
    }

    #[test]
    fn test_stored_name_equal_to_phone_falls_through() {
        let idx = index(&[("5551999999999@c.us", Some("Maria"), None)]);
        for echo in [
            "+55 (51) 99999-9999",
            "5551999999999",
            "+55 51 99999 9999",
            "(51) 99999-9999",
        ] {
            let mut contact = Contact::new("5551999999999");
            contact.stored_name = Some(echo.into());
            assert_eq!(resolve(&contact, &idx).display_name, "Maria", "{echo}");
        }
    }

    #[test]
    fn test_phone_echo_without_push_name_uses_cached_fields() {
        let idx = index(&[]);
        let mut contact = Contact::new("5551999999999");
        contact.stored_name = Some("+55 (51) 99999-9999".into());
        contact.cached_profile_name = Some("Maria (perfil)".into());

        let resolved = resolve(&contact, &idx);
        assert_eq!(resolved.display_name, "Maria (perfil)");
        assert_eq!(resolved.name_source, NameSource::CachedProfileName);

        contact.cached_push_name = Some("Maria (push)".into());
        assert_eq!(resolve(&contact, &idx).display_name, "Maria (push)");
    }

    #[test]
    fn test_falls_back_to_formatted_phone() {
        let idx = index(&[]);
        let contact = Contact::new("5551999999999");

        let resolved = resolve(&contact, &idx);
        assert_eq!(resolved.display_name, "+55 (51) 99999-9999");
        assert_eq!(resolved.name_source, NameSource::Phone);
        assert_eq!(resolved.photo_url, None);
        assert_eq!(resolved.initial(), '5');
    }

    #[test]
    fn test_photo_priority_chain() {
        let idx = index(&[
            ("777@lid", None, Some("https://cdn/lid.jpg")),
            ("5551999999999", None, Some("https://cdn/num.jpg")),
        ]);

        let mut contact = Contact::new("5551999999999");
        contact.photo_url = Some("https://cdn/persisted.jpg".into());
        contact.platform_id = Some("777@lid".into());
        let resolved = resolve(&contact, &idx);
        assert_eq!(resolved.photo_url.as_deref(), Some("https://cdn/lid.jpg"));
        assert_eq!(resolved.photo_source, Some(PhotoSource::ProfileByPlatformId));

        contact.platform_id = None;
        let resolved = resolve(&contact, &idx);
        assert_eq!(resolved.photo_url.as_deref(), Some("https://cdn/num.jpg"));
        assert_eq!(resolved.photo_source, Some(PhotoSource::ProfileByNumber));

        let resolved = resolve(&contact, &index(&[]));
        assert_eq!(resolved.photo_source, Some(PhotoSource::Persisted));
    }

    #[test]
    fn test_country_code_invariance() {
        let idx = index(&[("51999999999@c.us", Some("Maria"), Some("https://cdn/m.jpg"))]);
        let with_cc = resolve(&Contact::new("+55 51 99999-9999"), &idx);
        let without_cc = resolve(&Contact::new("(51) 99999-9999"), &idx);

        assert_eq!(with_cc.canonical_id, without_cc.canonical_id);
        assert_eq!(with_cc.display_name, without_cc.display_name);
        assert_eq!(with_cc.photo_url, without_cc.photo_url);
    }

    #[test]
    fn test_resolve_is_stable() {
        let idx = index(&[
            ("x:51999999999", Some("A"), None),
            ("y:5551999999999", Some("B"), None),
        ]);
        let contact = Contact::new("5551999999999");
        assert_eq!(resolve(&contact, &idx), resolve(&contact, &idx));
    }

    #[test]
    fn test_initial_letter() {
        let idx = index(&[]);
        let mut contact = Contact::new("5551999999999");
        contact.stored_name = Some("élida".into());
        assert_eq!(resolve(&contact, &idx).initial(), 'É');
    }
}
