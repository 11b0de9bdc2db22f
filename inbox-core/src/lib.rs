pub mod config;
pub mod contact;
pub mod error;
pub mod filter;
pub mod identity;
pub mod message;
pub mod partition;
pub mod profile;
pub mod resolver;
pub mod scroll;
pub mod stream;
pub mod timestamp;
pub mod traits;

pub use config::InboxConfig;
pub use contact::{Contact, ContactEvent};
pub use error::{ConfigError, SourceError};
pub use identity::CanonicalId;
pub use message::{Direction, Message, MessageOrigin, ReadState};
pub use profile::{ProfileIndex, ProfileSnapshot};
pub use resolver::{ResolvedContact, resolve};
