use serde::{Deserialize, Serialize};

use super::message::{DeliveryStatus, RemoteMessage};

/// Events exchanged on pub/sub topics, as `{event_name, payload}` envelopes.
///
/// The transport offers at-least-once delivery with no ordering guarantee, so
/// every handler of these events must be idempotent against replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_name", content = "payload", rename_all = "kebab-case")]
pub enum ChannelEvent {
    /// A message was accepted by the server and should appear in the thread.
    NewMessage(RemoteMessage),

    /// A batch of messages transitioned to a delivery status for `user_id`.
    #[serde(rename_all = "camelCase")]
    ReceiptUpdate {
        message_ids: Vec<String>,
        status: DeliveryStatus,
        user_id: String,
    },

    /// Narrow domain event (e.g. a shared checklist item changing state).
    /// Follows the same dedup rules as receipt updates.
    #[serde(rename_all = "camelCase")]
    ItemStateUpdate {
        item_id: String,
        state: String,
        user_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_update_wire_shape() {
        let json = r#"{
            "event_name": "receipt-update",
            "payload": {"messageIds": ["m1", "m2"], "status": "read", "userId": "u2"}
        }"#;
        let event: ChannelEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ChannelEvent::ReceiptUpdate {
                message_ids: vec!["m1".into(), "m2".into()],
                status: DeliveryStatus::Read,
                user_id: "u2".into(),
            }
        );
    }

    #[test]
    fn test_new_message_wire_shape() {
        let json = r#"{
            "event_name": "new-message",
            "payload": {
                "id": "m9",
                "thread_id": "t1",
                "sender_id": "u1",
                "content": "lunch $12",
                "created_at": 1700000000000
            }
        }"#;
        let event: ChannelEvent = serde_json::from_str(json).unwrap();
        match event {
            ChannelEvent::NewMessage(msg) => {
                assert_eq!(msg.id, "m9");
                assert_eq!(msg.status, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
