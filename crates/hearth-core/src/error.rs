use thiserror::Error;

/// Errors produced by the synchronization core.
///
/// Only `Api` is meant to reach the UI layer: failed writes (send, mark-read)
/// and failed foreground fetches. Transport trouble is absorbed internally by
/// reconnect/backoff and fallback polling, and cache trouble never becomes an
/// error at all.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend rejected a request, or the request never completed.
    #[error("api error: {message}")]
    Api {
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        message: String,
    },

    /// A pub/sub channel could not be opened or died. Recovered locally.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message was sent with no thread selected. Queries treat a missing
    /// selection as a valid empty state; sends cannot.
    #[error("no thread selected")]
    NoThreadSelected,
}
