//! Reference-counted table of active topic registrations.
//!
//! A topic has at most one live connection no matter how many consumers
//! acquired it. Teardown on release is deferred by a short delay so a rapid
//! unmount/remount cycle (a known double-invoke pattern in host UI
//! frameworks) re-increments the count before the delayed teardown fires and
//! the connection survives untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::sync::transport::ChannelState;

struct Registration {
    ref_count: i32,
    state: ChannelState,
    worker: Option<JoinHandle<()>>,
}

/// Cloneable handle to the process-wide topic table. Owned by the runtime
/// rather than a module-level global so tests can construct isolated
/// instances.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    inner: Arc<Mutex<HashMap<String, Registration>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join an existing registration or create a fresh one.
    ///
    /// Returns true when the registration is new and the caller must open the
    /// underlying connection; false means an existing connection was joined,
    /// whatever state it is currently in.
    pub fn acquire(&self, topic: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(topic) {
            Some(reg) => {
                reg.ref_count += 1;
                false
            }
            None => {
                inner.insert(
                    topic.to_string(),
                    Registration {
                        ref_count: 1,
                        state: ChannelState::Subscribing,
                        worker: None,
                    },
                );
                true
            }
        }
    }

    /// Remember the connection task driving a topic, so teardown can stop it.
    pub fn attach_worker(&self, topic: &str, worker: JoinHandle<()>) {
        let mut inner = self.inner.lock();
        match inner.get_mut(topic) {
            Some(reg) => reg.worker = Some(worker),
            // Torn down before the task was attached; stop it.
            None => worker.abort(),
        }
    }

    /// Drop one reference. The count is decremented immediately, but the
    /// actual teardown only happens after `delay`, and only if the count is
    /// still at or below zero by then.
    pub fn release(&self, topic: &str, delay: Duration) {
        {
            let mut inner = self.inner.lock();
            match inner.get_mut(topic) {
                Some(reg) => reg.ref_count -= 1,
                None => return,
            }
        }
        let registry = self.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.teardown_if_unused(&topic);
        });
    }

    fn teardown_if_unused(&self, topic: &str) {
        let mut inner = self.inner.lock();
        let unused = inner.get(topic).map(|reg| reg.ref_count <= 0).unwrap_or(false);
        if unused {
            if let Some(reg) = inner.remove(topic) {
                if let Some(worker) = reg.worker {
                    worker.abort();
                }
                tracing::debug!("channel {} torn down", topic);
            }
        }
    }

    /// Current reference count; zero when the topic has no registration.
    pub fn ref_count(&self, topic: &str) -> i32 {
        self.inner
            .lock()
            .get(topic)
            .map(|reg| reg.ref_count)
            .unwrap_or(0)
    }

    pub fn state(&self, topic: &str) -> ChannelState {
        self.inner
            .lock()
            .get(topic)
            .map(|reg| reg.state)
            .unwrap_or(ChannelState::Unsubscribed)
    }

    /// Record a state transition. Returns false when the registration is
    /// already gone (the worker should wind down).
    pub fn set_state(&self, topic: &str, state: ChannelState) -> bool {
        match self.inner.lock().get_mut(topic) {
            Some(reg) => {
                reg.state = state;
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, topic: &str) -> bool {
        self.inner.lock().contains_key(topic)
    }

    /// Abort every connection task and clear the table.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        for (_, reg) in inner.drain() {
            if let Some(worker) = reg.worker {
                worker.abort();
            }
        }
    }
}
