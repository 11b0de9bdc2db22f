pub use inbox_core;

pub mod contacts;
pub mod conversation;
pub mod events;
pub mod memory;
pub mod send;
pub mod session;

pub use contacts::ContactBook;
pub use conversation::{ConversationSnapshot, ConversationView, ViewportHandle};
pub use events::EventBus;
pub use send::{Draft, SendError};
pub use session::MessagingSession;
