//! Cache-key and topic-name conventions.
//!
//! Centralized location for the namespaced strings shared between the cache,
//! the query layer, and the subscription manager.

/// Cache key holding the household thread list.
pub const THREAD_LIST_CACHE_KEY: &str = "thread-list";

/// Cache key holding one thread's message window.
pub fn messages_cache_key(thread_id: &str) -> String {
    format!("messages:{}", thread_id)
}

/// Pub/sub topic carrying events for a single thread.
pub fn thread_topic(thread_id: &str) -> String {
    format!("thread-{}", thread_id)
}

/// Pub/sub topic carrying household-wide events (new messages in threads the
/// user is not currently viewing).
pub fn household_topic(household_id: &str) -> String {
    format!("household-{}", household_id)
}
