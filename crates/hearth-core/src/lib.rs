//! Realtime chat synchronization core for the Hearth household app.
//!
//! Keeps a per-thread message list and the thread-list summary consistent
//! across an unreliable pub/sub transport, serves instantly from a local
//! cache (stale-while-revalidate), reconciles optimistic sends, and
//! propagates deduplicated read/delivery receipts.

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod runtime;
pub mod store;
pub mod sync;
pub mod tracing_setup;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ChatApi, HttpChatApi, MessagesPayload, ThreadListPayload};
pub use config::SyncConfig;
pub use error::SyncError;
pub use events::StateEvent;
pub use models::{ChannelEvent, DeliveryStatus, Message, MessageId, Thread};
pub use runtime::SyncRuntime;
pub use sync::{ChannelState, QueryResult, Subscription, Transport};
