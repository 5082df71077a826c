pub mod channel_event;
pub mod message;
pub mod thread;

pub use channel_event::ChannelEvent;
pub use message::{DeliveryStatus, Message, MessageId, RemoteMessage};
pub use thread::{LastMessage, Thread};

/// Current wall-clock time as epoch milliseconds.
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
