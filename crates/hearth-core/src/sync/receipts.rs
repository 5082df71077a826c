//! Read/delivery receipt bookkeeping.
//!
//! Two session-scoped sets live here: pending receipts (status updates for
//! messages that have not arrived locally yet) and the broadcasted-receipt
//! set (ids whose status this client already announced outward, so a second
//! caller cannot duplicate the broadcast while the first is in flight).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;

use crate::constants::thread_topic;
use crate::error::SyncError;
use crate::models::{ChannelEvent, DeliveryStatus};
use crate::runtime::SyncContext;

/// Owned by the runtime (one instance per session), never a module global.
#[derive(Default)]
pub struct ReceiptTracker {
    /// Status updates waiting for their message to appear. Claimed by the
    /// optimistic-send confirm path or by the inbound new-message handler;
    /// discarded on thread switch when never claimed.
    pending: HashMap<String, DeliveryStatus>,
    /// (id, status) pairs already announced outward this session; cleared
    /// when the user switches away from a thread. Keyed per status: a `read`
    /// after an earlier `delivered` is an escalation, not a duplicate.
    broadcasted: HashSet<(String, DeliveryStatus)>,
    /// Item-state events already seen (the transport is at-least-once).
    seen_item_states: HashSet<(String, String)>,
}

impl ReceiptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a status for messages not present locally yet. A higher parked
    /// status is never downgraded.
    pub fn park(&mut self, ids: Vec<String>, status: DeliveryStatus) {
        for id in ids {
            let slot = self.pending.entry(id).or_insert(status);
            if status > *slot {
                *slot = status;
            }
        }
    }

    /// Claim (and clear) the parked status for a message that just appeared.
    pub fn take_pending(&mut self, message_id: &str) -> Option<DeliveryStatus> {
        self.pending.remove(message_id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop parked statuses nothing ever claimed.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Claim ids for an outward broadcast of `status`; ids already claimed at
    /// that status are filtered out. Claiming happens before any network call
    /// to close the duplicate-announce race.
    pub fn begin_broadcast(&mut self, ids: &[String], status: DeliveryStatus) -> Vec<String> {
        ids.iter()
            .filter(|id| self.broadcasted.insert(((*id).clone(), status)))
            .cloned()
            .collect()
    }

    /// Release claimed ids after a failed announcement so a retry can occur.
    pub fn abort_broadcast(&mut self, ids: &[String], status: DeliveryStatus) {
        for id in ids {
            self.broadcasted.remove(&(id.clone(), status));
        }
    }

    /// Called when the user switches away from a thread.
    pub fn clear_broadcasted(&mut self) {
        self.broadcasted.clear();
    }

    /// Dedup an item-state event; true the first time this (item, state)
    /// pair is seen.
    pub fn mark_item_state_seen(&mut self, item_id: &str, state: &str) -> bool {
        self.seen_item_states
            .insert((item_id.to_string(), state.to_string()))
    }
}

/// Announce `status` for `message_ids` outward: `mark-read` REST calls (for
/// reads) plus a `receipt-update` broadcast on the thread topic.
///
/// Ids are claimed in the broadcasted set before the network call begins and
/// released again on failure.
pub(crate) async fn announce_receipts(
    ctx: &Arc<SyncContext>,
    thread_id: &str,
    message_ids: Vec<String>,
    status: DeliveryStatus,
) -> Result<(), SyncError> {
    let (claimed, user_id) = {
        let store = ctx.store.lock();
        let mut tracker = ctx.tracker.lock();
        (
            tracker.begin_broadcast(&message_ids, status),
            store.user_id.clone().unwrap_or_default(),
        )
    };
    if claimed.is_empty() {
        return Ok(());
    }

    let result: Result<(), SyncError> = async {
        if status == DeliveryStatus::Read {
            for ack in join_all(claimed.iter().map(|id| ctx.api.mark_read(id))).await {
                ack?;
            }
        }
        ctx.transport
            .publish(
                &thread_topic(thread_id),
                ChannelEvent::ReceiptUpdate {
                    message_ids: claimed.clone(),
                    status,
                    user_id,
                },
            )
            .await
    }
    .await;

    if result.is_err() {
        ctx.tracker.lock().abort_broadcast(&claimed, status);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_park_and_take_pending() {
        let mut tracker = ReceiptTracker::new();
        tracker.park(vec!["m1".into()], DeliveryStatus::Delivered);
        assert_eq!(tracker.take_pending("m1"), Some(DeliveryStatus::Delivered));
        // Consumed exactly once.
        assert_eq!(tracker.take_pending("m1"), None);
    }

    #[test]
    fn test_parked_status_never_downgrades() {
        let mut tracker = ReceiptTracker::new();
        tracker.park(vec!["m1".into()], DeliveryStatus::Read);
        tracker.park(vec!["m1".into()], DeliveryStatus::Delivered);
        assert_eq!(tracker.take_pending("m1"), Some(DeliveryStatus::Read));
    }

    #[test]
    fn test_begin_broadcast_filters_claimed_ids() {
        let mut tracker = ReceiptTracker::new();
        let first = tracker.begin_broadcast(&["a".into(), "b".into()], DeliveryStatus::Read);
        assert_eq!(first, vec!["a".to_string(), "b".to_string()]);
        // A second caller racing in gets nothing for the same batch.
        let second = tracker.begin_broadcast(&["a".into(), "b".into()], DeliveryStatus::Read);
        assert!(second.is_empty());
    }

    #[test]
    fn test_status_escalation_is_not_a_duplicate() {
        let mut tracker = ReceiptTracker::new();
        let delivered = tracker.begin_broadcast(&["a".into()], DeliveryStatus::Delivered);
        assert_eq!(delivered, vec!["a".to_string()]);
        // Announcing delivered must not swallow the later read announce.
        let read = tracker.begin_broadcast(&["a".into()], DeliveryStatus::Read);
        assert_eq!(read, vec!["a".to_string()]);
        assert!(tracker
            .begin_broadcast(&["a".into()], DeliveryStatus::Read)
            .is_empty());
    }

    #[test]
    fn test_abort_broadcast_allows_retry() {
        let mut tracker = ReceiptTracker::new();
        let claimed = tracker.begin_broadcast(&["a".into()], DeliveryStatus::Read);
        tracker.abort_broadcast(&claimed, DeliveryStatus::Read);
        assert_eq!(
            tracker.begin_broadcast(&["a".into()], DeliveryStatus::Read),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn test_clear_broadcasted_on_thread_switch() {
        let mut tracker = ReceiptTracker::new();
        tracker.begin_broadcast(&["a".into()], DeliveryStatus::Read);
        tracker.clear_broadcasted();
        assert_eq!(
            tracker.begin_broadcast(&["a".into()], DeliveryStatus::Read),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn test_clear_pending_drops_unclaimed_parks() {
        let mut tracker = ReceiptTracker::new();
        tracker.park(vec!["m1".into(), "m2".into()], DeliveryStatus::Read);
        tracker.clear_pending();
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.take_pending("m1"), None);
    }

    #[test]
    fn test_item_state_dedup() {
        let mut tracker = ReceiptTracker::new();
        assert!(tracker.mark_item_state_seen("item1", "done"));
        assert!(!tracker.mark_item_state_seen("item1", "done"));
        // A different state for the same item is a new event.
        assert!(tracker.mark_item_state_seen("item1", "open"));
    }
}
