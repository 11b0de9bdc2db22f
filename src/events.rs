use chrono::{DateTime, Utc};
use inbox_core::{CanonicalId, Contact, Message};
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct ContactUpdated {
    pub contact: Contact,
}

#[derive(Debug, Clone)]
pub struct MessageAppended {
    pub contact: CanonicalId,
    pub message: Message,
}

#[derive(Debug, Clone)]
pub struct ReadCursorWritten {
    pub contact: CanonicalId,
    pub read_through: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SendFailed {
    pub contact: CanonicalId,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ProfileCacheUnavailable {
    pub organization: String,
    pub error: String,
}

macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// One broadcast channel per event type. Sends with no subscriber
        /// are dropped.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    (contact_updated, Arc<ContactUpdated>),
    (message_appended, Arc<MessageAppended>),
    (read_cursor_written, Arc<ReadCursorWritten>),
    (send_failed, Arc<SendFailed>),
    (profile_cache_unavailable, Arc<ProfileCacheUnavailable>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
