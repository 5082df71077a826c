//! Stale-while-revalidate query layer over the REST reads.
//!
//! Activating a query serves whatever the cache holds immediately (stale or
//! not) and always issues a background network fetch. A successful fetch
//! replaces the cache entry wholesale; a failed fetch leaves the cache
//! untouched and surfaces the error to whoever awaited it. Retries live in
//! the subscription manager's fallback polling, not here.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{MessagesPayload, ThreadListPayload};
use crate::constants::{messages_cache_key, THREAD_LIST_CACHE_KEY};
use crate::error::SyncError;
use crate::events::StateEvent;
use crate::runtime::SyncContext;

/// What a query activation hands back for first paint.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub data: T,
    /// The cached payload is older than the staleness threshold. It is still
    /// shown; consumers may add a loading affordance.
    pub stale: bool,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct QueryLayer {
    ctx: Arc<SyncContext>,
}

impl QueryLayer {
    pub(crate) fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    fn staleness_threshold(&self) -> Duration {
        self.ctx.config.staleness_threshold
    }

    /// Serve the cached thread list immediately and revalidate in the
    /// background. `None` means a cold cache; the background fetch still runs.
    pub fn activate_thread_list(&self) -> Option<QueryResult<ThreadListPayload>> {
        let cached = self.ctx.cache.get::<ThreadListPayload>(THREAD_LIST_CACHE_KEY);
        if let Some(entry) = &cached {
            let seeded = {
                let mut store = self.ctx.store.lock();
                if store.threads.is_empty() {
                    store.set_thread_list(&entry.payload);
                    true
                } else {
                    false
                }
            };
            if seeded {
                let _ = self.ctx.events.send(StateEvent::ThreadsUpdated);
            }
        }

        let layer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = layer.refresh_thread_list().await {
                tracing::debug!("thread list revalidation failed: {}", e);
            }
        });

        cached.map(|entry| QueryResult {
            stale: entry.is_stale(self.staleness_threshold()),
            data: entry.payload,
            from_cache: true,
        })
    }

    /// Fetch the thread list now. On success the cache entry is replaced
    /// wholesale and the store updated; on failure both are left untouched.
    pub async fn refresh_thread_list(&self) -> Result<(), SyncError> {
        let payload = self.ctx.api.fetch_threads().await?;
        self.ctx.cache.put(THREAD_LIST_CACHE_KEY, &payload);
        self.ctx.store.lock().set_thread_list(&payload);
        let _ = self.ctx.events.send(StateEvent::ThreadsUpdated);
        Ok(())
    }

    /// Messages query for the currently selected thread.
    ///
    /// With no thread selected this is inert: an empty, well-formed result
    /// and no network fetch. This is a valid state, not an error.
    pub fn activate_messages(&self) -> QueryResult<MessagesPayload> {
        let thread_id = match self.ctx.store.lock().selected_thread.clone() {
            Some(id) => id,
            None => {
                return QueryResult {
                    data: MessagesPayload::empty(),
                    stale: false,
                    from_cache: false,
                }
            }
        };

        let cached = self
            .ctx
            .cache
            .get::<MessagesPayload>(&messages_cache_key(&thread_id));
        if let Some(entry) = &cached {
            let seeded = {
                let mut store = self.ctx.store.lock();
                let empty = store
                    .messages_by_thread
                    .get(&thread_id)
                    .map(|m| m.is_empty())
                    .unwrap_or(true);
                if empty {
                    let mut tracker = self.ctx.tracker.lock();
                    store.set_messages(&entry.payload, |id| tracker.take_pending(id));
                    true
                } else {
                    false
                }
            };
            if seeded {
                let _ = self.ctx.events.send(StateEvent::MessagesUpdated {
                    thread_id: thread_id.clone(),
                });
            }
        }

        let layer = self.clone();
        let revalidate_thread = thread_id.clone();
        tokio::spawn(async move {
            if let Err(e) = layer.refresh_messages(revalidate_thread).await {
                tracing::debug!("messages revalidation failed: {}", e);
            }
        });

        match cached {
            Some(entry) => QueryResult {
                stale: entry.is_stale(self.staleness_threshold()),
                data: entry.payload,
                from_cache: true,
            },
            None => QueryResult {
                data: MessagesPayload::empty(),
                stale: false,
                from_cache: false,
            },
        }
    }

    /// Fetch one thread's messages now.
    ///
    /// The result is discarded if the user moved to a different thread while
    /// the fetch was in flight. The cache keeps only the newest-N window.
    pub async fn refresh_messages(&self, thread_id: String) -> Result<(), SyncError> {
        let payload = self.ctx.api.fetch_messages(&thread_id).await?;

        {
            let store = self.ctx.store.lock();
            if store.selected_thread.as_deref() != Some(thread_id.as_str()) {
                return Ok(());
            }
        }

        let mut trimmed = payload.clone();
        let window = self.ctx.config.message_cache_window;
        if trimmed.messages.len() > window {
            // FIFO eviction: the oldest entries fall off the front.
            let overflow = trimmed.messages.len() - window;
            trimmed.messages.drain(..overflow);
        }
        self.ctx.cache.put(&messages_cache_key(&thread_id), &trimmed);

        {
            let mut store = self.ctx.store.lock();
            let mut tracker = self.ctx.tracker.lock();
            store.set_messages(&payload, |id| tracker.take_pending(id));
        }
        let _ = self
            .ctx
            .events
            .send(StateEvent::MessagesUpdated { thread_id });
        Ok(())
    }
}
