use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_ms;

/// Delivery progression for messages the current user sent.
///
/// The derived ordering is meaningful: `Sent < Delivered < Read`, and a
/// message's status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Identity of a message: a locally-generated placeholder while the record is
/// optimistic, or the server-issued id once confirmed.
///
/// A message moves from `Local` to `Server` exactly once, by whole-record
/// replacement, never by mutating the id in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Local(String),
    Server(String),
}

impl MessageId {
    /// Fresh placeholder id for an optimistic record.
    pub fn new_local() -> Self {
        MessageId::Local(Uuid::new_v4().to_string())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    /// The server id, if this message has been confirmed.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            MessageId::Server(id) => Some(id),
            MessageId::Local(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Local(id) | MessageId::Server(id) => id,
        }
    }
}

/// Wire shape of a message as the backend serves and broadcasts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub content: String,
    /// Epoch milliseconds, server clock.
    pub created_at: u64,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

/// A chat message as held in the in-memory state.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: String,
    pub sender_id: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: u64,
    /// Delivery progression; tracked only for the current user's own messages.
    pub status: Option<DeliveryStatus>,
    /// Set on messages received from other members until the user reads them.
    pub unread: bool,
}

impl Message {
    /// Synthesize an optimistic record for a message the user just typed.
    pub fn new_local(thread_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            id: MessageId::new_local(),
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: now_ms(),
            status: Some(DeliveryStatus::Sent),
            unread: false,
        }
    }

    /// Build the in-memory record for a server-known message.
    ///
    /// Own messages carry a status (the server's, or `Delivered` since the
    /// server evidently has the message). The unread flag for messages from
    /// others is decided by the store, which knows the viewing context.
    pub fn from_remote(remote: &RemoteMessage, current_user: &str) -> Self {
        let own = remote.sender_id == current_user;
        Self {
            id: MessageId::Server(remote.id.clone()),
            thread_id: remote.thread_id.clone(),
            sender_id: remote.sender_id.clone(),
            content: remote.content.clone(),
            created_at: remote.created_at,
            status: if own {
                Some(remote.status.unwrap_or(DeliveryStatus::Delivered))
            } else {
                None
            },
            unread: false,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.is_local()
    }

    /// Advance the delivery status. Returns true when something changed;
    /// regressions (`delivered` after `read`) are a no-op.
    pub fn apply_status(&mut self, status: DeliveryStatus) -> bool {
        match self.status {
            Some(current) if current >= status => false,
            _ => {
                self.status = Some(status);
                true
            }
        }
    }
}
