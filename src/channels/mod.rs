//! Chat transports.
//!
//! The scheduler only needs [`Notifier`]; the runtime additionally drives a
//! [`ChatTransport`] to receive commands and button taps.

pub mod telegram;
pub mod traits;

pub use telegram::TelegramAdapter;
pub use traits::{ChatTransport, InboundEvent, InlineAction, Notifier, OutboundMessage};
