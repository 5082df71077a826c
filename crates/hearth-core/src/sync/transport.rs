//! Seam to the pub/sub transport.
//!
//! The transport implementation (websocket, SDK, whatever the host app uses)
//! is an external collaborator. The core only assumes at-least-once delivery
//! within a topic and no ordering guarantee across topics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::models::ChannelEvent;

/// Lifecycle of one topic registration.
///
/// `Unsubscribed` is terminal and only reached when the reference count hits
/// zero; everything else cycles through reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Error,
    Closed,
    Reconnecting,
}

/// Live event feed for one topic. The stream ending (sender dropped) means
/// the underlying connection errored or closed.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a subscription on `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, SyncError>;

    /// Publish an event on `topic`.
    async fn publish(&self, topic: &str, event: ChannelEvent) -> Result<(), SyncError>;
}
