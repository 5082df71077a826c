pub mod cache;
pub mod chat_store;

pub use cache::{CacheEntry, CacheStore};
pub use chat_store::{ChatStore, ReceiptOutcome};
