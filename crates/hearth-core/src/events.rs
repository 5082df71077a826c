use crate::sync::transport::ChannelState;

/// Notifications pushed to the UI layer whenever the in-memory state changes.
///
/// The UI reads the actual data back out of the store; these events only say
/// *what* changed, not what the new value is.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// The thread list (membership, summaries, or unread counts) changed.
    ThreadsUpdated,
    /// The message list for one thread changed.
    MessagesUpdated { thread_id: String },
    /// A pub/sub channel moved through its lifecycle (for reconnect
    /// affordances; never an error surface).
    ChannelState { topic: String, state: ChannelState },
    /// A deduplicated item-state event arrived on a thread topic.
    ItemStateChanged { item_id: String, state: String },
}
