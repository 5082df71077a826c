//! Wiring: one `SyncRuntime` per session owns the store, cache, receipt
//! tracker, channel registry, and the event channel the UI consumes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::{ChatApi, MessagesPayload, ThreadListPayload};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::StateEvent;
use crate::models::{DeliveryStatus, Message};
use crate::store::{CacheStore, ChatStore};
use crate::sync::queries::{QueryLayer, QueryResult};
use crate::sync::receipts::{announce_receipts, ReceiptTracker};
use crate::sync::send;
use crate::sync::subscriptions::SubscriptionManager;
use crate::sync::transport::{ChannelState, Transport};
use crate::sync::ChannelRegistry;

/// Everything the engines share. All mutation is guarded by the two mutexes;
/// lock order is store before tracker, and no lock is held across an await.
pub(crate) struct SyncContext {
    pub config: SyncConfig,
    pub api: Arc<dyn ChatApi>,
    pub transport: Arc<dyn Transport>,
    pub store: Mutex<ChatStore>,
    pub cache: CacheStore,
    pub tracker: Mutex<ReceiptTracker>,
    pub registry: ChannelRegistry,
    pub events: UnboundedSender<StateEvent>,
}

/// The synchronization engine's public face.
pub struct SyncRuntime {
    ctx: Arc<SyncContext>,
    queries: QueryLayer,
    manager: SubscriptionManager,
    events_rx: Option<UnboundedReceiver<StateEvent>>,
}

impl SyncRuntime {
    pub fn new(config: SyncConfig, api: Arc<dyn ChatApi>, transport: Arc<dyn Transport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cache = CacheStore::open(&config.cache_dir, config.cache_max_age);
        let ctx = Arc::new(SyncContext {
            api,
            transport,
            store: Mutex::new(ChatStore::new()),
            cache,
            tracker: Mutex::new(ReceiptTracker::new()),
            registry: ChannelRegistry::new(),
            events: events_tx,
            config,
        });
        Self {
            queries: QueryLayer::new(ctx.clone()),
            manager: SubscriptionManager::new(ctx.clone()),
            ctx,
            events_rx: Some(events_rx),
        }
    }

    /// Take the state-change receiver. Callable once; the UI's event loop
    /// owns it afterwards.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<StateEvent>> {
        self.events_rx.take()
    }

    /// Read access to the in-memory state.
    pub fn with_store<R>(&self, f: impl FnOnce(&ChatStore) -> R) -> R {
        f(&self.ctx.store.lock())
    }

    /// Activate the thread-list query: cached data now, revalidation in the
    /// background.
    pub fn activate_thread_list(&self) -> Option<QueryResult<ThreadListPayload>> {
        self.queries.activate_thread_list()
    }

    /// Activate the messages query for the selected thread.
    pub fn activate_messages(&self) -> QueryResult<MessagesPayload> {
        self.queries.activate_messages()
    }

    /// Switch the viewed thread. Clears the thread's unread badge, the
    /// receipt-broadcast dedup set, and any parked receipts nothing claimed.
    pub fn select_thread(&self, thread_id: Option<String>) {
        {
            let mut store = self.ctx.store.lock();
            let mut tracker = self.ctx.tracker.lock();
            store.select_thread(thread_id);
            tracker.clear_broadcasted();
            tracker.clear_pending();
        }
        let _ = self.ctx.events.send(StateEvent::ThreadsUpdated);
    }

    pub async fn send_message(&self, thread_id: &str, content: &str) -> Result<Message, SyncError> {
        send::send_message(&self.ctx, &self.manager, thread_id, content).await
    }

    /// Send to the currently viewed thread.
    pub async fn send_to_selected(&self, content: &str) -> Result<Message, SyncError> {
        let thread_id = { self.ctx.store.lock().selected_thread.clone() };
        match thread_id {
            Some(thread_id) => self.send_message(&thread_id, content).await,
            None => Err(SyncError::NoThreadSelected),
        }
    }

    /// Mark every unread message from other members in `thread_id` as read,
    /// locally and outward (REST acks plus a receipt broadcast).
    ///
    /// The local clear is optimistic; a failed announcement rolls it back so
    /// a retried call re-announces the same ids.
    pub async fn mark_thread_read(&self, thread_id: &str) -> Result<(), SyncError> {
        let ids = {
            let mut store = self.ctx.store.lock();
            let ids = store.unread_from_others(thread_id);
            store.mark_thread_messages_read(thread_id);
            ids
        };
        let _ = self.ctx.events.send(StateEvent::MessagesUpdated {
            thread_id: thread_id.to_string(),
        });
        let _ = self.ctx.events.send(StateEvent::ThreadsUpdated);

        if ids.is_empty() {
            return Ok(());
        }
        if let Err(e) =
            announce_receipts(&self.ctx, thread_id, ids.clone(), DeliveryStatus::Read).await
        {
            {
                self.ctx.store.lock().restore_unread(thread_id, &ids);
            }
            let _ = self.ctx.events.send(StateEvent::MessagesUpdated {
                thread_id: thread_id.to_string(),
            });
            let _ = self.ctx.events.send(StateEvent::ThreadsUpdated);
            return Err(e);
        }
        Ok(())
    }

    pub fn open_thread_channel(&self, thread_id: &str) {
        self.manager.open_thread_channel(thread_id);
    }

    pub fn close_thread_channel(&self, thread_id: &str) {
        self.manager.close_thread_channel(thread_id);
    }

    pub fn open_household_channel(&self, household_id: &str) {
        self.manager.open_household_channel(household_id);
    }

    pub fn close_household_channel(&self, household_id: &str) {
        self.manager.close_household_channel(household_id);
    }

    pub fn channel_state(&self, topic: &str) -> ChannelState {
        self.ctx.registry.state(topic)
    }

    /// Force both queries to revalidate, e.g. when the app returns to the
    /// foreground.
    pub fn refresh_on_foreground(&self) {
        let queries = self.queries.clone();
        tokio::spawn(async move {
            if let Err(e) = queries.refresh_thread_list().await {
                tracing::debug!("foreground thread-list refresh failed: {}", e);
            }
        });
        let selected = { self.ctx.store.lock().selected_thread.clone() };
        if let Some(thread_id) = selected {
            let queries = self.queries.clone();
            tokio::spawn(async move {
                if let Err(e) = queries.refresh_messages(thread_id).await {
                    tracing::debug!("foreground messages refresh failed: {}", e);
                }
            });
        }
    }

    /// Periodic cache maintenance; drops entries past the eviction horizon.
    pub fn evict_stale_cache(&self) {
        self.ctx.cache.evict_stale();
    }

    /// Stop every channel worker and clear the registry.
    pub fn shutdown(&self) {
        self.ctx.registry.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn ctx(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    #[cfg(test)]
    pub(crate) fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }
}
