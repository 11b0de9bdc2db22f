use inbox_core::SourceError;
use inbox_core::identity::digits_only;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no conversation is open")]
    NoActiveContact,

    #[error("recipient {0:?} has no phone digits")]
    InvalidRecipient(String),

    #[error("send failed: {0}")]
    Transport(#[from] SourceError),
}

/// Text being composed. Survives failed sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    text: String,
}

impl Draft {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// The text to send, or `None` when there is nothing but whitespace.
    pub fn outgoing(&self) -> Option<&str> {
        Some(self.text.trim()).filter(|t| !t.is_empty())
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Digits-only recipient with the country code prefixed when absent.
pub fn normalize_recipient(stored_id: &str, country_code: &str) -> Result<String, SendError> {
    let digits = digits_only(stored_id);
    if digits.is_empty() {
        return Err(SendError::InvalidRecipient(stored_id.to_string()));
    }
    if digits.starts_with(country_code) {
        Ok(digits)
    } else {
        Ok(format!("{country_code}{digits}"))
    }
}
