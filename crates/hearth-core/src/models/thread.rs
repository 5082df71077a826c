use serde::{Deserialize, Serialize};

use super::message::Message;

/// Denormalized summary of the newest message in a thread, shown in the
/// thread list without loading the thread itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    /// Epoch milliseconds.
    pub created_at: u64,
}

/// A chat thread as listed in the household overview.
///
/// Threads are created server-side; the client only reads them and patches
/// the denormalized summary fields locally when a new message arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Thread {
    /// Patch the summary fields for a newly observed message, if it is newer
    /// than the current summary.
    pub fn patch_last_message(&mut self, msg: &Message) {
        let newer = self
            .last_message
            .as_ref()
            .map(|last| msg.created_at >= last.created_at)
            .unwrap_or(true);
        if newer {
            self.last_message = Some(LastMessage {
                id: msg.id.as_str().to_string(),
                content: msg.content.clone(),
                sender_id: msg.sender_id.clone(),
                created_at: msg.created_at,
            });
        }
    }
}
