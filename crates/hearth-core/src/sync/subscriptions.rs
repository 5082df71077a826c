//! Subscription manager: one channel per open thread plus one per household.
//!
//! Owns the per-topic connection loop (subscribe, drain events, reconnect
//! with exponential backoff) and the switch to fallback polling once the
//! reconnect budget is exhausted. Inbound events are dispatched to idempotent
//! handlers; the transport is at-least-once.

use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::sleep;

use crate::constants::{household_topic, thread_topic};
use crate::events::StateEvent;
use crate::models::{ChannelEvent, DeliveryStatus, Message, RemoteMessage};
use crate::runtime::SyncContext;
use crate::sync::queries::QueryLayer;
use crate::sync::receipts::announce_receipts;
use crate::sync::transport::ChannelState;

/// What a topic registration is for, which decides how its events apply.
#[derive(Debug, Clone)]
pub enum TopicScope {
    /// Events for one open thread; mutate that thread's message list.
    Thread(String),
    /// Household-wide catch-all; only ever invalidates the thread list.
    Household(String),
}

#[derive(Clone)]
pub struct SubscriptionManager {
    ctx: Arc<SyncContext>,
}

impl SubscriptionManager {
    pub(crate) fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    fn queries(&self) -> QueryLayer {
        QueryLayer::new(self.ctx.clone())
    }

    pub fn open_thread_channel(&self, thread_id: &str) {
        self.open(
            thread_topic(thread_id),
            TopicScope::Thread(thread_id.to_string()),
        );
    }

    pub fn close_thread_channel(&self, thread_id: &str) {
        self.ctx
            .registry
            .release(&thread_topic(thread_id), self.ctx.config.teardown_delay);
    }

    pub fn open_household_channel(&self, household_id: &str) {
        self.open(
            household_topic(household_id),
            TopicScope::Household(household_id.to_string()),
        );
    }

    pub fn close_household_channel(&self, household_id: &str) {
        self.ctx
            .registry
            .release(&household_topic(household_id), self.ctx.config.teardown_delay);
    }

    fn open(&self, topic: String, scope: TopicScope) {
        if !self.ctx.registry.acquire(&topic) {
            // Already live; this consumer just joined the registration.
            return;
        }
        let manager = self.clone();
        let worker_topic = topic.clone();
        let worker = tokio::spawn(async move {
            manager.run_channel(worker_topic, scope).await;
        });
        self.ctx.registry.attach_worker(&topic, worker);
    }

    /// Connection loop for one topic: subscribe, drain events until the
    /// channel dies, back off, retry. Once `backoff_max_attempts` consecutive
    /// failures accumulate, fallback polling starts; reconnects continue
    /// opportunistically and a success stops the polling again.
    async fn run_channel(&self, topic: String, scope: TopicScope) {
        let config = &self.ctx.config;
        let polling = Arc::new(AtomicBool::new(false));
        let mut attempts: u32 = 0;

        loop {
            if !self.set_state(&topic, ChannelState::Subscribing) {
                return;
            }
            match self.ctx.transport.subscribe(&topic).await {
                Ok(mut subscription) => {
                    attempts = 0;
                    // Push path restored; any fallback poller winds down.
                    polling.store(false, Ordering::Relaxed);
                    if !self.set_state(&topic, ChannelState::Subscribed) {
                        return;
                    }
                    while let Some(event) = subscription.events.recv().await {
                        self.dispatch(&scope, event).await;
                    }
                    tracing::debug!("channel {} closed", topic);
                    self.set_state(&topic, ChannelState::Closed);
                }
                Err(e) => {
                    tracing::warn!("subscribe {} failed: {}", topic, e);
                    self.set_state(&topic, ChannelState::Error);
                }
            }

            attempts += 1;
            if attempts >= config.backoff_max_attempts && !polling.load(Ordering::Relaxed) {
                polling.store(true, Ordering::Relaxed);
                self.spawn_fallback_poll(scope.clone(), polling.clone());
            }

            let exponent = attempts.saturating_sub(1).min(16);
            let delay = cmp::min(config.backoff_base * 2u32.pow(exponent), config.backoff_max);
            if !self.set_state(&topic, ChannelState::Reconnecting) {
                return;
            }
            sleep(delay).await;
        }
    }

    /// Periodically force a refetch of the query this topic feeds, until the
    /// push path comes back.
    fn spawn_fallback_poll(&self, scope: TopicScope, polling: Arc<AtomicBool>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let interval = manager.ctx.config.fallback_poll_interval;
            loop {
                sleep(interval).await;
                if !polling.load(Ordering::Relaxed) {
                    break;
                }
                let result = match &scope {
                    TopicScope::Thread(thread_id) => {
                        manager.queries().refresh_messages(thread_id.clone()).await
                    }
                    TopicScope::Household(_) => manager.queries().refresh_thread_list().await,
                };
                if let Err(e) = result {
                    // Polling absorbs failures; the next tick retries.
                    tracing::debug!("fallback poll failed: {}", e);
                }
            }
        });
    }

    pub(crate) async fn dispatch(&self, scope: &TopicScope, event: ChannelEvent) {
        match scope {
            TopicScope::Household(_) => {
                // Household scope only invalidates the thread list; it never
                // mutates message caches.
                if let ChannelEvent::NewMessage(_) = event {
                    if let Err(e) = self.queries().refresh_thread_list().await {
                        tracing::debug!("thread list invalidation failed: {}", e);
                    }
                }
            }
            TopicScope::Thread(_) => match event {
                ChannelEvent::NewMessage(remote) => self.handle_new_message(remote).await,
                ChannelEvent::ReceiptUpdate {
                    message_ids,
                    status,
                    user_id,
                } => self.handle_receipt_update(message_ids, status, &user_id),
                ChannelEvent::ItemStateUpdate {
                    item_id, state, ..
                } => self.handle_item_state(item_id, state),
            },
        }
    }

    async fn handle_new_message(&self, remote: RemoteMessage) {
        let (changed, own, thread_id) = {
            let mut store = self.ctx.store.lock();
            let user = store.user_id.clone().unwrap_or_default();
            let own = remote.sender_id == user;
            // The arrival claims any parked receipt either way; only own
            // messages track a status, so for others it is simply discarded.
            let pending = self
                .ctx
                .tracker
                .lock()
                .take_pending(&remote.id)
                .filter(|_| own);
            let msg = Message::from_remote(&remote, &user);
            let thread_id = msg.thread_id.clone();
            (store.apply_new_message(msg, pending), own, thread_id)
        };

        if !changed {
            return;
        }
        let _ = self.ctx.events.send(StateEvent::MessagesUpdated {
            thread_id: thread_id.clone(),
        });
        let _ = self.ctx.events.send(StateEvent::ThreadsUpdated);

        // Acknowledge delivery for messages from other members. Best-effort:
        // a failed announce is retried the next time the id comes around.
        if !own {
            let ctx = self.ctx.clone();
            let message_id = remote.id.clone();
            tokio::spawn(async move {
                if let Err(e) = announce_receipts(
                    &ctx,
                    &thread_id,
                    vec![message_id],
                    DeliveryStatus::Delivered,
                )
                .await
                {
                    tracing::debug!("delivery announce failed: {}", e);
                }
            });
        }
    }

    fn handle_receipt_update(&self, message_ids: Vec<String>, status: DeliveryStatus, user_id: &str) {
        let updated = {
            let mut store = self.ctx.store.lock();
            // A user never reacts to their own receipt broadcast.
            if store.user_id.as_deref() == Some(user_id) {
                return;
            }
            let outcome = store.apply_receipts(&message_ids, status);
            self.ctx.tracker.lock().park(outcome.unknown, status);
            outcome.updated_threads
        };
        for thread_id in updated {
            let _ = self
                .ctx
                .events
                .send(StateEvent::MessagesUpdated { thread_id });
        }
    }

    fn handle_item_state(&self, item_id: String, state: String) {
        // Same at-least-once transport; drop replays.
        if self.ctx.tracker.lock().mark_item_state_seen(&item_id, &state) {
            let _ = self
                .ctx
                .events
                .send(StateEvent::ItemStateChanged { item_id, state });
        }
    }

    /// Announce a confirmed send on both the thread-scoped and the
    /// household-scoped topics, so in-thread viewers and list-only viewers
    /// both observe it.
    pub(crate) async fn publish_new_message(&self, remote: &RemoteMessage) {
        let household = { self.ctx.store.lock().household_id.clone() };
        let event = ChannelEvent::NewMessage(remote.clone());

        if let Err(e) = self
            .ctx
            .transport
            .publish(&thread_topic(&remote.thread_id), event.clone())
            .await
        {
            tracing::warn!("publish to thread topic failed: {}", e);
        }
        if let Some(household_id) = household {
            if let Err(e) = self
                .ctx
                .transport
                .publish(&household_topic(&household_id), event)
                .await
            {
                tracing::warn!("publish to household topic failed: {}", e);
            }
        }
    }

    fn set_state(&self, topic: &str, state: ChannelState) -> bool {
        let live = self.ctx.registry.set_state(topic, state);
        if live {
            let _ = self.ctx.events.send(StateEvent::ChannelState {
                topic: topic.to_string(),
                state,
            });
        }
        live
    }
}
