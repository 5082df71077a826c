//! In-memory source of truth for threads and messages.
//!
//! Populated from cached payloads for instant display, replaced wholesale by
//! network fetches, and patched incrementally by push deltas, optimistic
//! sends, and receipt updates. All handlers are idempotent against duplicate
//! delivery of the same logical event.

use std::collections::HashMap;

use crate::api::{MessagesPayload, ThreadListPayload};
use crate::models::{DeliveryStatus, Message, MessageId, Thread};

/// What a receipt batch did to the store.
#[derive(Debug, Default)]
pub struct ReceiptOutcome {
    /// Threads whose message list changed (for change notifications).
    pub updated_threads: Vec<String>,
    /// Ids not present locally yet; the caller parks these as pending
    /// receipts.
    pub unknown: Vec<String>,
}

#[derive(Default)]
pub struct ChatStore {
    pub threads: Vec<Thread>,
    /// Messages per thread, in the order their confirming event (push or
    /// fetch) was processed. Cross-client ordering is not corrected.
    pub messages_by_thread: HashMap<String, Vec<Message>>,
    pub selected_thread: Option<String>,
    pub user_id: Option<String>,
    pub household_id: Option<String>,
    /// Server-provided first-unread marker per thread, for the UI divider.
    pub first_unread_by_thread: HashMap<String, String>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_own(&self, sender_id: &str) -> bool {
        self.user_id.as_deref() == Some(sender_id)
    }

    pub fn messages(&self, thread_id: &str) -> &[Message] {
        self.messages_by_thread
            .get(thread_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Switch the viewed thread. Selecting a thread zeroes its unread badge.
    pub fn select_thread(&mut self, thread_id: Option<String>) {
        if let Some(id) = &thread_id {
            if let Some(thread) = self.threads.iter_mut().find(|t| &t.id == id) {
                thread.unread_count = 0;
            }
        }
        self.selected_thread = thread_id;
    }

    /// Replace the thread list wholesale with a fetched payload.
    pub fn set_thread_list(&mut self, payload: &ThreadListPayload) {
        self.user_id = Some(payload.user_id.clone());
        self.household_id = Some(payload.household_id.clone());
        self.threads = payload.threads.clone();
    }

    /// Replace one thread's messages wholesale with a fetched payload.
    ///
    /// Optimistic records the server does not know about yet survive the
    /// replacement, statuses already advanced by the push path are kept, and
    /// `pending` is consulted for receipts that raced ahead of the message.
    pub fn set_messages<F>(&mut self, payload: &MessagesPayload, mut pending: F)
    where
        F: FnMut(&str) -> Option<DeliveryStatus>,
    {
        if self.user_id.is_none() {
            self.user_id = Some(payload.user_id.clone());
        }
        if self.household_id.is_none() {
            self.household_id = Some(payload.household_id.clone());
        }
        let user = payload.user_id.clone();
        let thread_id = payload.thread_id.clone();

        let existing = self.messages_by_thread.remove(&thread_id).unwrap_or_default();

        let mut unread_zone = false;
        let mut fresh: Vec<Message> = Vec::with_capacity(payload.messages.len());
        for remote in &payload.messages {
            if payload.first_unread_id.as_deref() == Some(remote.id.as_str()) {
                unread_zone = true;
            }
            let mut msg = Message::from_remote(remote, &user);
            if msg.sender_id == user {
                // Never lose a status the push path already advanced.
                if let Some(prev) = existing
                    .iter()
                    .find(|m| m.id.server_id() == Some(remote.id.as_str()))
                {
                    if let Some(status) = prev.status {
                        msg.apply_status(status);
                    }
                }
                if let Some(parked) = pending(&remote.id) {
                    msg.apply_status(parked);
                }
            } else {
                msg.unread = unread_zone;
            }
            fresh.push(msg);
        }

        // Keep optimistic records still awaiting confirmation.
        for msg in existing {
            if msg.is_local() {
                fresh.push(msg);
            }
        }

        match &payload.first_unread_id {
            Some(first) => {
                self.first_unread_by_thread
                    .insert(thread_id.clone(), first.clone());
            }
            None => {
                self.first_unread_by_thread.remove(&thread_id);
            }
        }
        self.messages_by_thread.insert(thread_id, fresh);
    }

    /// Apply a message that arrived via push (or a loopback of our own
    /// publish). Returns true when the store changed.
    ///
    /// Duplicate delivery of a known server id only advances its status; the
    /// record is never inserted twice.
    pub fn apply_new_message(&mut self, mut msg: Message, pending: Option<DeliveryStatus>) -> bool {
        let own = self.is_own(&msg.sender_id);
        let selected = self.selected_thread.as_deref() == Some(msg.thread_id.as_str());
        let thread_id = msg.thread_id.clone();

        let messages = self.messages_by_thread.entry(thread_id.clone()).or_default();

        if let Some(server_id) = msg.id.server_id() {
            if let Some(existing) = messages
                .iter_mut()
                .find(|m| m.id.server_id() == Some(server_id))
            {
                let mut changed = false;
                if let Some(status) = msg.status {
                    changed |= existing.apply_status(status);
                }
                if let Some(status) = pending {
                    changed |= existing.apply_status(status);
                }
                return changed;
            }
        }

        if own {
            if let Some(status) = pending {
                msg.apply_status(status);
            }
        } else {
            msg.unread = true;
        }
        let snapshot = msg.clone();
        messages.push(msg);

        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.patch_last_message(&snapshot);
            if !own && !selected {
                thread.unread_count += 1;
            }
        }
        true
    }

    /// Append an optimistic record. Not written to the durable cache; it only
    /// exists in memory until confirmed or rolled back.
    pub fn insert_optimistic(&mut self, msg: Message) {
        debug_assert!(msg.is_local());
        self.messages_by_thread
            .entry(msg.thread_id.clone())
            .or_default()
            .push(msg);
    }

    /// Replace the optimistic record `temp_id` with the server-confirmed one.
    ///
    /// If the real record already arrived via push (a legitimate race), only
    /// its status is advanced and the temp record is dropped; the message is
    /// never present twice.
    pub fn confirm_optimistic(&mut self, thread_id: &str, temp_id: &MessageId, confirmed: Message) {
        let snapshot;
        {
            let messages = self
                .messages_by_thread
                .entry(thread_id.to_string())
                .or_default();
            let server_id = match confirmed.id.server_id() {
                Some(id) => id.to_string(),
                None => return,
            };

            if let Some(pos) = messages
                .iter()
                .position(|m| m.id.server_id() == Some(server_id.as_str()))
            {
                // Push beat the POST response.
                if let Some(status) = confirmed.status {
                    messages[pos].apply_status(status);
                }
                snapshot = messages[pos].clone();
                messages.retain(|m| &m.id != temp_id);
            } else if let Some(pos) = messages.iter().position(|m| &m.id == temp_id) {
                // Identity replacement in place, preserving append order.
                snapshot = confirmed.clone();
                messages[pos] = confirmed;
            } else {
                // Temp vanished (e.g. the thread was reloaded mid-flight);
                // record the confirmation anyway.
                snapshot = confirmed.clone();
                messages.push(confirmed);
            }
        }

        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.patch_last_message(&snapshot);
        }
    }

    /// Roll a failed send back by its captured temp id. Returns true when the
    /// record was present.
    pub fn remove_optimistic(&mut self, thread_id: &str, temp_id: &MessageId) -> bool {
        if let Some(messages) = self.messages_by_thread.get_mut(thread_id) {
            let before = messages.len();
            messages.retain(|m| &m.id != temp_id);
            return messages.len() != before;
        }
        false
    }

    /// Apply a receipt batch to the current user's own messages. Ids not
    /// present locally are reported back for pending-receipt parking.
    pub fn apply_receipts(&mut self, message_ids: &[String], status: DeliveryStatus) -> ReceiptOutcome {
        let mut outcome = ReceiptOutcome::default();
        let user = self.user_id.clone();
        for id in message_ids {
            let mut found = false;
            for (thread_id, messages) in self.messages_by_thread.iter_mut() {
                if let Some(msg) = messages
                    .iter_mut()
                    .find(|m| m.id.server_id() == Some(id.as_str()))
                {
                    found = true;
                    let own = user.as_deref() == Some(msg.sender_id.as_str());
                    if own && msg.apply_status(status) && !outcome.updated_threads.contains(thread_id)
                    {
                        outcome.updated_threads.push(thread_id.clone());
                    }
                    break;
                }
            }
            if !found {
                outcome.unknown.push(id.clone());
            }
        }
        outcome
    }

    /// Server ids of unread messages from other members in one thread.
    pub fn unread_from_others(&self, thread_id: &str) -> Vec<String> {
        self.messages(thread_id)
            .iter()
            .filter(|m| m.unread)
            .filter_map(|m| m.id.server_id().map(str::to_string))
            .collect()
    }

    /// Roll a failed read-marking back: flag `ids` unread again and restore
    /// the badge, so a retry finds them.
    pub fn restore_unread(&mut self, thread_id: &str, ids: &[String]) {
        let mut restored = 0u32;
        if let Some(messages) = self.messages_by_thread.get_mut(thread_id) {
            for msg in messages.iter_mut() {
                let listed = msg
                    .id
                    .server_id()
                    .map(|id| ids.iter().any(|i| i == id))
                    .unwrap_or(false);
                if listed {
                    msg.unread = true;
                    restored += 1;
                }
            }
        }
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.unread_count = restored;
        }
    }

    /// Clear unread flags and the thread's badge after the user read it.
    pub fn mark_thread_messages_read(&mut self, thread_id: &str) {
        if let Some(messages) = self.messages_by_thread.get_mut(thread_id) {
            for msg in messages.iter_mut() {
                msg.unread = false;
            }
        }
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.unread_count = 0;
        }
        self.first_unread_by_thread.remove(thread_id);
    }
}
