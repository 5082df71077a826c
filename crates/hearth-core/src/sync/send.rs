//! Optimistic send: append a temporary record immediately, reconcile with the
//! server-confirmed record on success, roll back on failure.

use std::sync::Arc;

use crate::error::SyncError;
use crate::events::StateEvent;
use crate::models::{DeliveryStatus, Message};
use crate::runtime::SyncContext;
use crate::sync::subscriptions::SubscriptionManager;

/// Send `content` to `thread_id`.
///
/// The temporary record is matched by its captured id through the whole
/// round trip, never by content, so concurrent sends to the same thread
/// cannot affect each other. On success the confirmed record takes any
/// receipt that raced ahead of the POST response; otherwise it lands as
/// `delivered`. Failures roll the temp record back and surface the error.
pub(crate) async fn send_message(
    ctx: &Arc<SyncContext>,
    manager: &SubscriptionManager,
    thread_id: &str,
    content: &str,
) -> Result<Message, SyncError> {
    let temp = {
        let mut store = ctx.store.lock();
        let sender = match store.user_id.clone() {
            Some(id) => id,
            None => String::new(),
        };
        let msg = Message::new_local(thread_id, &sender, content);
        store.insert_optimistic(msg.clone());
        msg
    };
    let _ = ctx.events.send(StateEvent::MessagesUpdated {
        thread_id: thread_id.to_string(),
    });

    match ctx.api.send_message(thread_id, content).await {
        Ok(remote) => {
            let confirmed = {
                let mut store = ctx.store.lock();
                let mut tracker = ctx.tracker.lock();
                let user = store.user_id.clone().unwrap_or_default();
                let mut confirmed = Message::from_remote(&remote, &user);
                // Confirmed means the server has it; a receipt that raced
                // ahead wins over the plain delivered transition.
                confirmed.status = Some(
                    tracker
                        .take_pending(&remote.id)
                        .unwrap_or(DeliveryStatus::Delivered),
                );
                store.confirm_optimistic(thread_id, &temp.id, confirmed.clone());
                confirmed
            };
            let _ = ctx.events.send(StateEvent::MessagesUpdated {
                thread_id: thread_id.to_string(),
            });
            let _ = ctx.events.send(StateEvent::ThreadsUpdated);

            // Responsibility shifts to the subscription manager: announce the
            // new message to in-thread and list-only viewers.
            manager.publish_new_message(&remote).await;
            Ok(confirmed)
        }
        Err(e) => {
            let removed = { ctx.store.lock().remove_optimistic(thread_id, &temp.id) };
            if removed {
                let _ = ctx.events.send(StateEvent::MessagesUpdated {
                    thread_id: thread_id.to_string(),
                });
            }
            Err(e)
        }
    }
}
