//! Shared mocks and fixtures for the engine's tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::api::{ChatApi, MessagesPayload, ThreadListPayload};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::StateEvent;
use crate::models::{now_ms, ChannelEvent, RemoteMessage, Thread};
use crate::runtime::SyncRuntime;
use crate::sync::transport::{Subscription, Transport};

pub(crate) fn remote_message(id: &str, thread: &str, sender: &str, content: &str) -> RemoteMessage {
    RemoteMessage {
        id: id.into(),
        thread_id: thread.into(),
        sender_id: sender.into(),
        content: content.into(),
        created_at: 1_000,
        status: None,
    }
}

pub(crate) fn thread(id: &str, name: &str) -> Thread {
    Thread {
        id: id.into(),
        name: name.into(),
        last_message: None,
        unread_count: 0,
    }
}

fn api_error(message: &str) -> SyncError {
    SyncError::Api {
        status: Some(500),
        message: message.into(),
    }
}

/// Scriptable in-memory `ChatApi`.
pub(crate) struct MockApi {
    pub user_id: String,
    pub household_id: String,
    pub threads: Mutex<Vec<Thread>>,
    pub messages: Mutex<HashMap<String, Vec<RemoteMessage>>>,
    /// Applied to `send_message` only.
    pub send_delay: Mutex<Option<Duration>>,
    pub fail_sends: AtomicBool,
    pub fail_fetches: AtomicBool,
    pub fail_mark_read: AtomicBool,
    /// Ids handed out to sends, newest first; falls back to a counter.
    pub queued_send_ids: Mutex<Vec<String>>,
    pub mark_read_calls: Mutex<Vec<String>>,
    pub thread_fetches: AtomicUsize,
    pub message_fetches: AtomicUsize,
    send_counter: AtomicUsize,
}

impl MockApi {
    pub fn new(user_id: &str, household_id: &str) -> Self {
        Self {
            user_id: user_id.into(),
            household_id: household_id.into(),
            threads: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            send_delay: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
            queued_send_ids: Mutex::new(Vec::new()),
            mark_read_calls: Mutex::new(Vec::new()),
            thread_fetches: AtomicUsize::new(0),
            message_fetches: AtomicUsize::new(0),
            send_counter: AtomicUsize::new(0),
        }
    }

    pub fn queue_send_id(&self, id: &str) {
        self.queued_send_ids.lock().push(id.into());
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn fetch_threads(&self) -> Result<ThreadListPayload, SyncError> {
        self.thread_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(api_error("threads unavailable"));
        }
        Ok(ThreadListPayload {
            threads: self.threads.lock().clone(),
            household_id: self.household_id.clone(),
            user_id: self.user_id.clone(),
        })
    }

    async fn fetch_messages(&self, thread_id: &str) -> Result<MessagesPayload, SyncError> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(api_error("messages unavailable"));
        }
        Ok(MessagesPayload {
            messages: self.messages.lock().get(thread_id).cloned().unwrap_or_default(),
            thread_id: thread_id.into(),
            household_id: self.household_id.clone(),
            user_id: self.user_id.clone(),
            first_unread_id: None,
            unread_count: 0,
        })
    }

    async fn send_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<RemoteMessage, SyncError> {
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(api_error("send rejected"));
        }
        let id = self.queued_send_ids.lock().pop().unwrap_or_else(|| {
            format!("srv-{}", self.send_counter.fetch_add(1, Ordering::SeqCst))
        });
        Ok(RemoteMessage {
            id,
            thread_id: thread_id.into(),
            sender_id: self.user_id.clone(),
            content: content.into(),
            created_at: now_ms(),
            status: None,
        })
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SyncError> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(api_error("mark-read rejected"));
        }
        self.mark_read_calls.lock().push(message_id.into());
        Ok(())
    }
}

#[derive(Default)]
struct TransportInner {
    senders: HashMap<String, Vec<UnboundedSender<ChannelEvent>>>,
    published: Vec<(String, ChannelEvent)>,
    subscribe_counts: HashMap<String, usize>,
    subscribe_times: Vec<Instant>,
    /// Remaining forced subscribe failures; `u32::MAX` means always fail.
    fail_subscribes: u32,
}

/// In-memory pub/sub with scriptable subscribe failures.
#[derive(Default)]
pub(crate) struct MockTransport {
    inner: Mutex<TransportInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_subscribes(&self, count: u32) {
        self.inner.lock().fail_subscribes = count;
    }

    pub fn always_fail_subscribes(&self) {
        self.inner.lock().fail_subscribes = u32::MAX;
    }

    /// Deliver an event to every live subscriber of `topic`.
    pub fn push(&self, topic: &str, event: ChannelEvent) {
        let mut inner = self.inner.lock();
        if let Some(senders) = inner.senders.get_mut(topic) {
            senders.retain(|sender| sender.send(event.clone()).is_ok());
        }
    }

    /// Drop every subscriber of `topic`, simulating a lost connection.
    pub fn close_topic(&self, topic: &str) {
        self.inner.lock().senders.remove(topic);
    }

    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .subscribe_counts
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    pub fn subscribe_times(&self) -> Vec<Instant> {
        self.inner.lock().subscribe_times.clone()
    }

    pub fn published(&self) -> Vec<(String, ChannelEvent)> {
        self.inner.lock().published.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, SyncError> {
        let mut inner = self.inner.lock();
        *inner.subscribe_counts.entry(topic.to_string()).or_default() += 1;
        inner.subscribe_times.push(Instant::now());
        if inner.fail_subscribes > 0 {
            if inner.fail_subscribes != u32::MAX {
                inner.fail_subscribes -= 1;
            }
            return Err(SyncError::Transport("subscribe refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.senders.entry(topic.to_string()).or_default().push(tx);
        Ok(Subscription { events: rx })
    }

    async fn publish(&self, topic: &str, event: ChannelEvent) -> Result<(), SyncError> {
        self.inner.lock().published.push((topic.to_string(), event));
        Ok(())
    }
}

pub(crate) fn test_config(dir: &Path) -> SyncConfig {
    SyncConfig {
        cache_dir: dir.to_path_buf(),
        staleness_threshold: Duration::from_secs(30),
        cache_max_age: Duration::from_secs(3_600),
        message_cache_window: 5,
        teardown_delay: Duration::from_millis(300),
        backoff_base: Duration::from_millis(100),
        backoff_max: Duration::from_millis(400),
        backoff_max_attempts: 3,
        fallback_poll_interval: Duration::from_secs(1),
    }
}

pub(crate) struct Harness {
    pub runtime: SyncRuntime,
    pub api: Arc<MockApi>,
    pub transport: Arc<MockTransport>,
    pub events: UnboundedReceiver<StateEvent>,
    _cache_dir: tempfile::TempDir,
}

pub(crate) fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockApi::new("u1", "h1"));
    let transport = Arc::new(MockTransport::new());
    let mut runtime = SyncRuntime::new(test_config(dir.path()), api.clone(), transport.clone());
    let events = runtime.take_events().unwrap();
    Harness {
        runtime,
        api,
        transport,
        events,
        _cache_dir: dir,
    }
}

/// Seed identity and one thread so handlers can tell own from foreign.
pub(crate) fn seed_identity(harness: &Harness) {
    let mut store = harness.runtime.ctx().store.lock();
    store.user_id = Some("u1".into());
    store.household_id = Some("h1".into());
    store.threads = vec![thread("t1", "groceries")];
}
