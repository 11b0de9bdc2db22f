//! Phone identity normalization.
//!
//! A business stores phone numbers in whatever shape the user typed them
//! ("+55 (51) 99999-9999", "51999999999", ...). The messaging platform and
//! its profile cache key the same person by yet other shapes
//! ("5551999999999@s.whatsapp.net", "51999999999@c.us"). Everything here is
//! pure string work: no lookup, no failure.

use crate::config::{DEFAULT_COUNTRY_CODE, IdentityConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Digit count of a number written without its country code (area code
/// included).
const LOCAL_NUMBER_LENGTHS: RangeInclusive<usize> = 10..=11;

/// A phone number reduced to ASCII digits, carrying the country code.
///
/// `"+55 (51) 99999-9999"` and `"(51) 99999-9999"` derive the same id.
/// Derivation is idempotent: `CanonicalId::new(c.as_str()) == c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Canonical id under the default country code.
    pub fn new(stored_id: &str) -> Self {
        Self::with_country(stored_id, DEFAULT_COUNTRY_CODE)
    }

    /// Digits of `stored_id`, with `country_code` prefixed when the number
    /// is written in local form.
    pub fn with_country(stored_id: &str, country_code: &str) -> Self {
        let digits = digits_only(stored_id);
        if is_local_number(&digits, country_code) {
            Self(format!("{country_code}{digits}"))
        } else {
            Self(digits)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The same number with the country code stripped if present, or
    /// prepended if absent. `None` when that would yield an empty id.
    pub fn country_sibling(&self, country_code: &str) -> Option<String> {
        if self.0.is_empty() || country_code.is_empty() {
            return None;
        }
        match self.0.strip_prefix(country_code) {
            Some("") => None,
            Some(local) => Some(local.to_string()),
            None => Some(format!("{}{}", country_code, self.0)),
        }
    }

    /// Digit forms a structural cache match may take: the id itself, then
    /// its country-code sibling.
    pub fn digit_forms(&self, country_code: &str) -> Vec<String> {
        if self.0.is_empty() {
            return Vec::new();
        }
        let mut forms = vec![self.0.clone()];
        if let Some(sibling) = self.country_sibling(country_code) {
            forms.push(sibling);
        }
        forms
    }

    /// Exact-key lookup list in priority order.
    ///
    /// `id`, `id` + each suffix, then the country-code sibling and its
    /// suffixed forms. The order is business policy: the first key present
    /// in the cache wins.
    pub fn variants(&self, config: &IdentityConfig) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for base in self.digit_forms(&config.country_code) {
            push_unique(&mut out, base.clone());
            for suffix in &config.suffixes {
                push_unique(&mut out, format!("{}{}", base, suffix));
            }
        }
        out
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CanonicalId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<CanonicalId> for String {
    fn from(value: CanonicalId) -> Self {
        value.0
    }
}

/// Local form: a local-length number that does not already read as
/// country code plus a local-length number.
fn is_local_number(digits: &str, country_code: &str) -> bool {
    !country_code.is_empty()
        && LOCAL_NUMBER_LENGTHS.contains(&digits.len())
        && !digits
            .strip_prefix(country_code)
            .is_some_and(|rest| LOCAL_NUMBER_LENGTHS.contains(&rest.len()))
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
    if !out.contains(&candidate) {
        out.push(candidate);
    }
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Removes every configured suffix annotation, then every non-digit.
pub fn strip_annotations(key: &str, config: &IdentityConfig) -> String {
    let mut stripped = key.to_string();
    for suffix in &config.suffixes {
        if !suffix.is_empty() {
            stripped = stripped.replace(suffix.as_str(), "");
        }
    }
    digits_only(&stripped)
}

/// Human-readable phone number.
///
/// 13 digits with the country code become `+CC (AA) NNNNN-NNNN`, 11 digits
/// become `(AA) NNNNN-NNNN`; anything else is shown as stored.
pub fn format_phone(stored_id: &str, country_code: &str) -> String {
    let digits = digits_only(stored_id);
    let cc_len = country_code.len();
    if !country_code.is_empty() && digits.len() == 11 + cc_len && digits.starts_with(country_code)
    {
        let local = &digits[cc_len..];
        return format!(
            "+{} ({}) {}-{}",
            country_code,
            &local[..2],
            &local[2..7],
            &local[7..]
        );
    }
    if digits.len() == 11 {
        return format!("({}) {}-{}", &digits[..2], &digits[2..7], &digits[7..]);
    }
    stored_id.to_string()
}
