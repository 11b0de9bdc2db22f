//! Unread/read split of a conversation.
//!
//! Read state is coarse: one read-through cursor per contact. Inbound
//! messages at or before the cursor count as read; an explicit read flag
//! from the platform is kept as is.

use crate::message::{Message, MessageOrigin, ReadState};
use chrono::{DateTime, Utc};

pub fn is_unread(message: &Message) -> bool {
    message.is_inbound() && message.read != ReadState::Read
}

/// Marks inbound messages at or before `cursor` as read.
pub fn apply_read_cursor(messages: &mut [Message], cursor: Option<DateTime<Utc>>) {
    let Some(cursor) = cursor else {
        return;
    };
    for message in messages.iter_mut().filter(|m| m.is_inbound()) {
        if message.effective_timestamp().is_some_and(|at| at <= cursor) {
            message.read = ReadState::Read;
        }
    }
}

/// Inbound messages newer than the cursor; every inbound message when there
/// is no cursor yet.
pub fn unread_count<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
    cursor: Option<DateTime<Utc>>,
) -> usize {
    messages
        .into_iter()
        .filter(|m| m.is_inbound())
        .filter(|m| match (cursor, m.effective_timestamp()) {
            (None, _) => true,
            (Some(cursor), Some(at)) => at > cursor,
            (Some(_), None) => false,
        })
        .count()
}

/// Newest timestamp among `messages`: the value to write as the cursor once
/// the conversation has been seen.
pub fn read_through<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Option<DateTime<Utc>> {
    messages
        .into_iter()
        .filter_map(Message::effective_timestamp)
        .max()
}

pub fn filter_by_origin<'a>(
    messages: &'a [Message],
    automatic_only: bool,
) -> impl Iterator<Item = &'a Message> + 'a {
    messages
        .iter()
        .filter(move |m| !automatic_only || m.source == MessageOrigin::Automatic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row<'a> {
    UnreadHeader(usize),
    Message(&'a Message),
    Separator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition<'a> {
    pub unread: Vec<&'a Message>,
    pub read: Vec<&'a Message>,
}

impl<'a> Partition<'a> {
    pub fn len(&self) -> usize {
        self.unread.len() + self.read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unread.is_empty() && self.read.is_empty()
    }

    /// Display order: unread header and messages, a separator when both
    /// sections are present, then read messages.
    pub fn rows(&self) -> Vec<Row<'a>> {
        let mut rows = Vec::with_capacity(self.len() + 2);
        if !self.unread.is_empty() {
            rows.push(Row::UnreadHeader(self.unread.len()));
            rows.extend(self.unread.iter().map(|m| Row::Message(*m)));
        }
        if !self.unread.is_empty() && !self.read.is_empty() {
            rows.push(Row::Separator);
        }
        rows.extend(self.read.iter().map(|m| Row::Message(*m)));
        rows
    }
}

/// Splits chronologically ordered messages. Each section keeps the input
/// order, oldest first.
pub fn partition<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Partition<'a> {
    let (unread, read) = messages.into_iter().partition(|m| is_unread(m));
    Partition { unread, read }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn make_message(n: i64, direction: Direction, read: ReadState) -> Message {
        let mut msg = Message::new(format!("m{n}"), direction, base() + Duration::minutes(n))
            .with_text(format!("message {n}"));
        msg.read = read;
        msg
    }

    fn sample() -> Vec<Message> {
        vec![
            make_message(1, Direction::Inbound, ReadState::Read),
            make_message(2, Direction::Outbound, ReadState::Unknown),
            make_message(3, Direction::Inbound, ReadState::Unknown),
            make_message(4, Direction::Outbound, ReadState::Unread),
            make_message(5, Direction::Inbound, ReadState::Unread),
        ]
    }

    #[test]
    fn test_partition_is_complete_and_unread_is_inbound() {
        let messages = sample();
        let parts = partition(&messages);

        assert_eq!(parts.len(), messages.len());
        assert!(parts.unread.iter().all(|m| m.is_inbound()));
        for msg in &messages {
            let in_unread = parts.unread.iter().any(|m| m.id == msg.id);
            let in_read = parts.read.iter().any(|m| m.id == msg.id);
            assert!(in_unread ^ in_read, "{} must be in exactly one section", msg.id);
        }

        let unread: Vec<_> = parts.unread.iter().map(|m| m.id.as_str()).collect();
        let read: Vec<_> = parts.read.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(unread, ["m3", "m5"]);
        assert_eq!(read, ["m1", "m2", "m4"]);
    }

    #[test]
    fn test_rows_layout() {
        let messages = sample();
        let rows = partition(&messages).rows();

        assert_eq!(rows[0], Row::UnreadHeader(2));
        assert_eq!(rows[3], Row::Separator);
        assert_eq!(rows.len(), 5 + 2);
    }

    #[test]
    fn test_rows_without_unread_have_no_separator() {
        let messages = vec![make_message(1, Direction::Outbound, ReadState::Unknown)];
        let rows = partition(&messages).rows();
        assert_eq!(rows, vec![Row::Message(&messages[0])]);
    }

    #[test]
    fn test_apply_read_cursor() {
        let mut messages = sample();
        apply_read_cursor(&mut messages, Some(base() + Duration::minutes(3)));

        assert_eq!(messages[2].read, ReadState::Read);
        assert_eq!(messages[3].read, ReadState::Unread, "outbound untouched");
        assert_eq!(messages[4].read, ReadState::Unread);

        let parts = partition(&messages);
        assert_eq!(parts.unread.len(), 1);
    }

    #[test]
    fn test_unread_count_from_cursor() {
        let messages = sample();
        assert_eq!(unread_count(&messages, None), 3);
        assert_eq!(unread_count(&messages, Some(base() + Duration::minutes(1))), 2);
        assert_eq!(unread_count(&messages, Some(base() + Duration::minutes(5))), 0);
    }

    #[test]
    fn test_read_through_is_newest_timestamp() {
        let messages = sample();
        assert_eq!(read_through(&messages), Some(base() + Duration::minutes(5)));
        assert_eq!(read_through(&Vec::<Message>::new()), None);
    }

    #[test]
    fn test_filter_by_origin() {
        let mut messages = sample();
        messages[1].source = MessageOrigin::Automatic;

        assert_eq!(filter_by_origin(&messages, false).count(), 5);
        let automatic: Vec<_> = filter_by_origin(&messages, true).collect();
        assert_eq!(automatic.len(), 1);
        assert_eq!(automatic[0].id, "m2");
    }
}
