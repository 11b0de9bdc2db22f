use crate::timestamp;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;

/// Text shown for a message with neither body nor caption.
pub const UNSUPPORTED_PLACEHOLDER: &str = "[unsupported message]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Platform read flag. `Unknown` when the payload carried none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum ReadState {
    Read,
    Unread,
    #[default]
    Unknown,
}

impl From<Option<bool>> for ReadState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => ReadState::Read,
            Some(false) => ReadState::Unread,
            None => ReadState::Unknown,
        }
    }
}

impl From<ReadState> for Option<bool> {
    fn from(value: ReadState) -> Self {
        match value {
            ReadState::Read => Some(true),
            ReadState::Unread => Some(false),
            ReadState::Unknown => None,
        }
    }
}

/// Who produced an outbound message: an automation (reminders,
/// confirmations) or a person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    Automatic,
    Manual,
    #[default]
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ContentKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            ContentKind::Image
        } else if mime.starts_with("video/") {
            ContentKind::Video
        } else if mime.starts_with("audio/") {
            ContentKind::Audio
        } else if mime.starts_with("application/") {
            ContentKind::Document
        } else {
            ContentKind::Unknown
        }
    }

    pub fn is_media(self) -> bool {
        matches!(
            self,
            ContentKind::Image | ContentKind::Video | ContentKind::Audio | ContentKind::Document
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Platform message id; the same delivery may show up on two pages.
    #[serde(default, alias = "wamId", alias = "wam_id", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub direction: Direction,
    #[serde(default, alias = "messageTimestamp", deserialize_with = "timestamp::lenient")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: ReadState,
    #[serde(default, alias = "messageSource")]
    pub source: MessageOrigin,
    #[serde(default, alias = "type")]
    pub content_kind: ContentKind,
    #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, alias = "mediaMimetype", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Message {
    pub fn new(id: impl Into<String>, direction: Direction, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            external_id: None,
            direction,
            timestamp: Some(at),
            created_at: None,
            read: ReadState::Unknown,
            source: MessageOrigin::Unspecified,
            content_kind: ContentKind::Unknown,
            body: None,
            caption: None,
            media_url: None,
            mime_type: None,
        }
    }

    pub fn with_text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.content_kind = ContentKind::Text;
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    /// Platform timestamp, falling back to the record's creation time.
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.or(self.created_at)
    }

    /// Declared kind, else inferred from the MIME type, else `Text` when
    /// there is a body.
    pub fn kind(&self) -> ContentKind {
        if self.content_kind != ContentKind::Unknown {
            return self.content_kind;
        }
        let inferred = self
            .mime_type
            .as_deref()
            .map(ContentKind::from_mime)
            .unwrap_or_default();
        if inferred == ContentKind::Unknown && self.text().is_some() {
            ContentKind::Text
        } else {
            inferred
        }
    }

    /// Body text, else media caption.
    pub fn text(&self) -> Option<&str> {
        [self.body.as_deref(), self.caption.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
    }

    pub fn display_text(&self) -> &str {
        self.text().unwrap_or(UNSUPPORTED_PLACEHOLDER)
    }

    /// Chronological order: effective timestamp, then id. Messages without
    /// any timestamp sort first.
    pub fn chronological_cmp(&self, other: &Message) -> Ordering {
        self.effective_timestamp()
            .cmp(&other.effective_timestamp())
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Folds a newer copy of the same delivery into this one. Incoming
    /// fields win when present; a known read flag replaces `Unknown`; the
    /// local id is kept.
    pub fn absorb(&mut self, incoming: Message) {
        self.external_id = incoming.external_id.or(self.external_id.take());
        self.direction = incoming.direction;
        self.timestamp = incoming.timestamp.or(self.timestamp);
        self.created_at = incoming.created_at.or(self.created_at);
        if incoming.read != ReadState::Unknown {
            self.read = incoming.read;
        }
        if incoming.source != MessageOrigin::Unspecified {
            self.source = incoming.source;
        }
        if incoming.content_kind != ContentKind::Unknown {
            self.content_kind = incoming.content_kind;
        }
        self.body = incoming.body.or(self.body.take());
        self.caption = incoming.caption.or(self.caption.take());
        self.media_url = incoming.media_url.or(self.media_url.take());
        self.mime_type = incoming.mime_type.or(self.mime_type.take());
    }
}

/// `HH:MM` for messages from the same calendar day as `now` (in `now`'s
/// time zone), `DD/MM/YYYY HH:MM` otherwise, empty when unknown.
pub fn format_message_time<Tz>(at: Option<DateTime<Utc>>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(at) = at else {
        return String::new();
    };
    let local = at.with_timezone(&now.timezone());
    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%d/%m/%Y %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(raw: &str) -> DateTime<Utc> {
        timestamp::parse(raw).unwrap()
    }

    #[test]
    fn test_deserialize_platform_payload() {
        let json = r#"{
            "id": "doc-1",
            "wam_id": "wamid.ABC",
            "direction": "inbound",
            "messageTimestamp": "2024-03-01T12:00:00Z",
            "createdAt": 1709294400000,
            "messageSource": "automatic",
            "type": "sticker",
            "mediaUrl": "https://cdn/s.webp",
            "mediaMimetype": "image/webp"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();

        assert_eq!(msg.external_id.as_deref(), Some("wamid.ABC"));
        assert_eq!(msg.read, ReadState::Unknown);
        assert_eq!(msg.source, MessageOrigin::Automatic);
        assert_eq!(msg.content_kind, ContentKind::Unknown);
        assert_eq!(msg.kind(), ContentKind::Image);
        assert_eq!(msg.display_text(), UNSUPPORTED_PLACEHOLDER);
    }

    #[test]
    fn test_read_flag_round_trips_through_option() {
        let msg: Message =
            serde_json::from_str(r#"{"id": "1", "direction": "outbound", "read": false}"#).unwrap();
        assert_eq!(msg.read, ReadState::Unread);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["read"], serde_json::Value::Bool(false));
    }

    #[test]
    fn test_effective_timestamp_prefers_platform_time() {
        let mut msg = Message::new("1", Direction::Inbound, at("2024-03-01T12:00:00Z"));
        msg.created_at = Some(at("2024-03-01T12:00:05Z"));
        assert_eq!(msg.effective_timestamp(), Some(at("2024-03-01T12:00:00Z")));

        msg.timestamp = None;
        assert_eq!(msg.effective_timestamp(), Some(at("2024-03-01T12:00:05Z")));
    }

    #[test]
    fn test_text_extraction() {
        let mut msg = Message::new("1", Direction::Inbound, at("2024-03-01T12:00:00Z"));
        msg.body = Some("  ".into());
        msg.caption = Some("foto do exame".into());
        msg.mime_type = Some("application/pdf".into());
        assert_eq!(msg.display_text(), "foto do exame");
        assert_eq!(msg.kind(), ContentKind::Document);

        let plain = Message::new("2", Direction::Inbound, at("2024-03-01T12:00:00Z")).with_text("oi");
        assert_eq!(plain.kind(), ContentKind::Text);
    }

    #[test]
    fn test_chronological_order_breaks_ties_by_id() {
        let t = at("2024-03-01T12:00:00Z");
        let a = Message::new("a", Direction::Inbound, t);
        let b = Message::new("b", Direction::Outbound, t);
        let mut undated = Message::new("z", Direction::Inbound, t);
        undated.timestamp = None;

        assert_eq!(a.chronological_cmp(&b), Ordering::Less);
        assert_eq!(undated.chronological_cmp(&a), Ordering::Less);
    }

    #[test]
    fn test_absorb_keeps_local_id_and_known_read_flag() {
        let t = at("2024-03-01T12:00:00Z");
        let mut local = Message::new("local-1", Direction::Inbound, t).with_text("oi");
        local.read = ReadState::Read;

        let mut incoming = Message::new("remote-9", Direction::Inbound, t).with_external_id("wamid.1");
        incoming.caption = Some("legenda".into());
        local.absorb(incoming);

        assert_eq!(local.id, "local-1");
        assert_eq!(local.external_id.as_deref(), Some("wamid.1"));
        assert_eq!(local.read, ReadState::Read);
        assert_eq!(local.body.as_deref(), Some("oi"));
        assert_eq!(local.caption.as_deref(), Some("legenda"));
    }

    #[test]
    fn test_format_message_time() {
        let tz = FixedOffset::west_opt(3 * 3600).unwrap();
        let now = at("2024-03-01T20:00:00Z").with_timezone(&tz);

        assert_eq!(format_message_time(Some(at("2024-03-01T12:05:00Z")), &now), "09:05");
        assert_eq!(
            format_message_time(Some(at("2024-03-01T02:00:00Z")), &now),
            "29/02/2024 23:00"
        );
        assert_eq!(format_message_time(None, &now), "");
    }
}
