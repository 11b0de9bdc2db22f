//! Profile cache snapshot and the index used to match contacts against it.
//!
//! The snapshot comes from the platform in one bulk fetch and maps loosely
//! shaped identifier keys to a push name and a photo URL. Several keys may
//! describe the same person. [`ProfileIndex`] is built once per snapshot and
//! turns the matching policy into hash lookups:
//!
//! - exact key -> entry position
//! - stripped digits -> entry positions, in snapshot order
//!
//! Lookups are field-specific: a name lookup only accepts entries carrying
//! a push name, a photo lookup only entries carrying a photo URL.

use crate::config::IdentityConfig;
use crate::identity::{CanonicalId, strip_annotations};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(
        default,
        alias = "profilePicUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
}

impl ProfileEntry {
    fn field(&self, field: ProfileField) -> Option<&str> {
        let value = match field {
            ProfileField::PushName => self.push_name.as_deref(),
            ProfileField::PhotoUrl => self.photo_url.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    PushName,
    PhotoUrl,
}

/// Read-only bulk snapshot. Key order is the order the keys were given in,
/// including the document order of a JSON object. A repeated key keeps its
/// first position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSnapshot {
    entries: Vec<(String, ProfileEntry)>,
}

impl ProfileSnapshot {
    pub fn new(entries: impl IntoIterator<Item = (String, ProfileEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProfileEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<'de> Deserialize<'de> for ProfileSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}

struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = ProfileSnapshot;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of profile keys to profile entries")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries: Vec<(String, ProfileEntry)> =
            Vec::with_capacity(access.size_hint().unwrap_or(0));
        let mut seen: HashMap<String, usize> = HashMap::new();
        while let Some((key, entry)) = access.next_entry::<String, ProfileEntry>()? {
            match seen.get(&key) {
                Some(&pos) => entries[pos].1 = entry,
                None => {
                    seen.insert(key.clone(), entries.len());
                    entries.push((key, entry));
                }
            }
        }
        Ok(ProfileSnapshot { entries })
    }
}

impl Serialize for ProfileSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

/// How a profile value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact hit on the contact's platform identifier.
    PlatformId,
    /// Exact hit on one of the generated variants.
    Variant,
    /// Digits of a cache key equal the contact's number (either country form).
    Structural,
    /// Digits of a cache key equal the platform identifier's digits.
    PlatformStructural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileMatch<'a> {
    pub value: &'a str,
    pub key: &'a str,
    pub kind: MatchKind,
}

/// Best-effort profile for one contact. Absent fields mean "no data".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedProfile {
    pub push_name: Option<String>,
    pub photo_url: Option<String>,
    pub photo_kind: Option<MatchKind>,
}

#[derive(Debug, Default)]
pub struct ProfileIndex {
    snapshot: ProfileSnapshot,
    exact: HashMap<String, usize>,
    by_digits: HashMap<String, Vec<usize>>,
    config: IdentityConfig,
}

impl ProfileIndex {
    pub fn build(snapshot: ProfileSnapshot, config: &IdentityConfig) -> Self {
        let mut exact = HashMap::with_capacity(snapshot.len());
        let mut by_digits: HashMap<String, Vec<usize>> = HashMap::new();

        for (pos, (key, _)) in snapshot.entries.iter().enumerate() {
            exact.entry(key.clone()).or_insert(pos);
            let digits = strip_annotations(key, config);
            if !digits.is_empty() {
                by_digits.entry(digits).or_default().push(pos);
            }
        }

        log::debug!(
            "profile index built: {} keys, {} distinct numbers",
            snapshot.len(),
            by_digits.len()
        );

        Self {
            snapshot,
            exact,
            by_digits,
            config: config.clone(),
        }
    }

    pub fn empty(config: &IdentityConfig) -> Self {
        Self::build(ProfileSnapshot::default(), config)
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ProfileEntry> {
        self.exact.get(key).map(|&pos| &self.snapshot.entries[pos].1)
    }

    fn exact_field(&self, key: &str, field: ProfileField) -> Option<(&str, &str)> {
        let &pos = self.exact.get(key)?;
        let (k, entry) = &self.snapshot.entries[pos];
        entry.field(field).map(|v| (k.as_str(), v))
    }

    /// First entry, in snapshot order, whose stripped digits equal any of
    /// `forms` and which carries `field`.
    fn structural_field(&self, forms: &[String], field: ProfileField) -> Option<(&str, &str)> {
        let mut candidates: Vec<usize> = forms
            .iter()
            .filter_map(|f| self.by_digits.get(f))
            .flatten()
            .copied()
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        candidates.into_iter().find_map(|pos| {
            let (k, entry) = &self.snapshot.entries[pos];
            entry.field(field).map(|v| (k.as_str(), v))
        })
    }

    /// Looks up one profile field for a contact.
    ///
    /// Order: platform id exact, generated variants exact (generation
    /// order), structural match on the number, structural match on the
    /// platform id's digits.
    pub fn lookup(
        &self,
        id: &CanonicalId,
        platform_id: Option<&str>,
        field: ProfileField,
    ) -> Option<ProfileMatch<'_>> {
        let platform_id = platform_id.map(str::trim).filter(|p| !p.is_empty());

        if let Some(pid) = platform_id
            && let Some((key, value)) = self.exact_field(pid, field)
        {
            return Some(ProfileMatch {
                value,
                key,
                kind: MatchKind::PlatformId,
            });
        }

        for variant in id.variants(&self.config) {
            if let Some((key, value)) = self.exact_field(&variant, field) {
                return Some(ProfileMatch {
                    value,
                    key,
                    kind: MatchKind::Variant,
                });
            }
        }

        if let Some((key, value)) =
            self.structural_field(&id.digit_forms(&self.config.country_code), field)
        {
            return Some(ProfileMatch {
                value,
                key,
                kind: MatchKind::Structural,
            });
        }

        let pid = platform_id?;
        let pid_digits = CanonicalId::with_country(
            &strip_annotations(pid, &self.config),
            &self.config.country_code,
        );
        self.structural_field(&pid_digits.digit_forms(&self.config.country_code), field)
            .map(|(key, value)| ProfileMatch {
                value,
                key,
                kind: MatchKind::PlatformStructural,
            })
    }

    pub fn lookup_profile(&self, id: &CanonicalId, platform_id: Option<&str>) -> MatchedProfile {
        let name = self.lookup(id, platform_id, ProfileField::PushName);
        let photo = self.lookup(id, platform_id, ProfileField::PhotoUrl);
        MatchedProfile {
            push_name: name.map(|m| m.value.to_string()),
            photo_url: photo.map(|m| m.value.to_string()),
            photo_kind: photo.map(|m| m.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: Option<&str>, photo: Option<&str>) -> ProfileEntry {
        ProfileEntry {
            push_name: name.map(String::from),
            photo_url: photo.map(String::from),
        }
    }

    fn index(entries: Vec<(&str, ProfileEntry)>) -> ProfileIndex {
        let snapshot = ProfileSnapshot::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)));
        ProfileIndex::build(snapshot, &IdentityConfig::default())
    }

    #[test]
    fn test_variant_without_country_code_matches() {
        let idx = index(vec![("51999999999@s.whatsapp.net", entry(Some("Maria"), None))]);
        let id = CanonicalId::new("5551999999999");

        let found = idx
            .lookup(&id, None, ProfileField::PushName)
            .expect("variant should match");
        assert_eq!(found.value, "Maria");
        assert_eq!(found.kind, MatchKind::Variant);
    }

    #[test]
    fn test_platform_id_takes_priority() {
        let idx = index(vec![
            ("5551999999999", entry(Some("By number"), None)),
            ("98765@lid", entry(Some("By platform"), None)),
        ]);
        let id = CanonicalId::new("5551999999999");

        let found = idx
            .lookup(&id, Some("98765@lid"), ProfileField::PushName)
            .expect("platform id should match");
        assert_eq!(found.value, "By platform");
        assert_eq!(found.kind, MatchKind::PlatformId);
    }

    #[test]
    fn test_generation_order_breaks_ties() {
        let idx = index(vec![
            ("51999999999", entry(Some("Local"), None)),
            ("5551999999999@c.us", entry(Some("Legacy"), None)),
        ]);
        let id = CanonicalId::new("5551999999999");

        let found = idx.lookup(&id, None, ProfileField::PushName).unwrap();
        assert_eq!(found.value, "Legacy");
    }

    #[test]
    fn test_hit_is_field_specific() {
        let idx = index(vec![
            ("5551999999999", entry(Some("Maria"), None)),
            ("51999999999@c.us", entry(None, Some("https://cdn/p.jpg"))),
        ]);
        let id = CanonicalId::new("5551999999999");

        let photo = idx.lookup(&id, None, ProfileField::PhotoUrl).unwrap();
        assert_eq!(photo.value, "https://cdn/p.jpg");
        assert_eq!(photo.key, "51999999999@c.us");
    }

    #[test]
    fn test_structural_match_on_unknown_annotation() {
        let idx = index(vec![
            ("+55 51 99999-9999@g.us", entry(Some("Odd key"), None)),
            ("11111111111", entry(Some("Other"), None)),
        ]);
        let id = CanonicalId::new("(51) 99999-9999");

        let found = idx.lookup(&id, None, ProfileField::PushName).unwrap();
        assert_eq!(found.value, "Odd key");
        assert_eq!(found.kind, MatchKind::Structural);
    }

    #[test]
    fn test_structural_match_respects_snapshot_order() {
        let idx = index(vec![
            ("a:51999999999", entry(Some("First"), None)),
            ("b:5551999999999", entry(Some("Second"), None)),
        ]);
        let id = CanonicalId::new("5551999999999");

        let found = idx.lookup(&id, None, ProfileField::PushName).unwrap();
        assert_eq!(found.value, "First");
    }

    #[test]
    fn test_platform_structural_fallback() {
        let idx = index(vec![("x-12345678", entry(None, Some("https://cdn/lid.jpg")))]);
        let id = CanonicalId::new("5551999999999");

        let found = idx
            .lookup(&id, Some("12345678@lid"), ProfileField::PhotoUrl)
            .unwrap();
        assert_eq!(found.kind, MatchKind::PlatformStructural);
    }

    #[test]
    fn test_no_match_and_blank_values() {
        let idx = index(vec![("5551999999999", entry(Some("  "), None))]);
        let id = CanonicalId::new("5551999999999");

        assert!(idx.lookup(&id, None, ProfileField::PushName).is_none());
        assert!(idx.lookup(&id, None, ProfileField::PhotoUrl).is_none());
        assert!(
            idx.lookup(&CanonicalId::new(""), None, ProfileField::PushName)
                .is_none()
        );
    }

    #[test]
    fn test_snapshot_deserializes_from_object() {
        let json = r#"{
            "5551999999999@s.whatsapp.net": {"pushName": "Maria", "profilePicUrl": "https://cdn/m.jpg"},
            "5511888888888": {}
        }"#;
        let snapshot: ProfileSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.len(), 2);

        let idx = ProfileIndex::build(snapshot, &IdentityConfig::default());
        let profile = idx.lookup_profile(&CanonicalId::new("5551999999999"), None);
        assert_eq!(profile.push_name.as_deref(), Some("Maria"));
        assert_eq!(profile.photo_url.as_deref(), Some("https://cdn/m.jpg"));
    }

    #[test]
    fn test_snapshot_keeps_document_key_order() {
        let json = r#"{
            "b:5551999999999": {"pushName": "Listed first"},
            "a:51999999999": {"pushName": "Listed second"}
        }"#;
        let snapshot: ProfileSnapshot = serde_json::from_str(json).unwrap();
        let keys: Vec<_> = snapshot.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b:5551999999999", "a:51999999999"]);

        let encoded = serde_json::to_string(&snapshot).unwrap();
        assert!(encoded.find("b:555").unwrap() < encoded.find("a:519").unwrap());

        let idx = ProfileIndex::build(snapshot, &IdentityConfig::default());
        let found = idx
            .lookup(&CanonicalId::new("5551999999999"), None, ProfileField::PushName)
            .unwrap();
        assert_eq!(found.value, "Listed first");
        assert_eq!(found.kind, MatchKind::Structural);
    }

    #[test]
    fn test_snapshot_repeated_key_keeps_first_position() {
        let json = r#"{
            "x:1": {"pushName": "old"},
            "y:2": {"pushName": "other"},
            "x:1": {"pushName": "new"}
        }"#;
        let snapshot: ProfileSnapshot = serde_json::from_str(json).unwrap();
        let entries: Vec<_> = snapshot
            .iter()
            .map(|(k, e)| (k, e.push_name.as_deref()))
            .collect();
        assert_eq!(entries, [("x:1", Some("new")), ("y:2", Some("other"))]);
    }
}
