use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ChannelId, UserId};

/// A chat message as carried by a `new_message` push.
///
/// Only the sender matters to the unread counters; everything else the server
/// sends is kept in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn from_sender(sender_id: impl Into<UserId>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: None,
            extra: Map::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Server -> client push events.
///
/// On the wire every event is an envelope `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The server acknowledged channel membership.
    Subscribed {
        #[serde(rename = "channelIds", default)]
        channel_ids: Vec<ChannelId>,
    },
    /// A message was posted to a channel.
    NewMessage {
        #[serde(rename = "channelId")]
        channel_id: ChannelId,
        message: ChatMessage,
    },
    /// Some client of this user read the channel.
    MessagesRead {
        #[serde(rename = "channelId")]
        channel_id: ChannelId,
    },
    /// The channel no longer exists.
    ChannelDeleted {
        #[serde(rename = "channelId")]
        channel_id: ChannelId,
    },
    /// Transport-level error reported by the server side of the socket.
    Error { message: String },
}

impl ServerEvent {
    /// Event names this crate understands, as they appear in envelopes.
    pub const NAMES: &'static [&'static str] = &[
        "subscribed",
        "new_message",
        "messages_read",
        "channel_deleted",
        "error",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Subscribed { .. } => "subscribed",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessagesRead { .. } => "messages_read",
            ServerEvent::ChannelDeleted { .. } => "channel_deleted",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// The channel whose unread count this event changes, if any.
    pub fn counter_channel(&self) -> Option<&ChannelId> {
        match self {
            ServerEvent::NewMessage { channel_id, .. }
            | ServerEvent::MessagesRead { channel_id }
            | ServerEvent::ChannelDeleted { channel_id } => Some(channel_id),
            ServerEvent::Subscribed { .. } | ServerEvent::Error { .. } => None,
        }
    }
}

/// Client -> server intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe to every channel the user belongs to. Sent once per
    /// connection, right after the handshake.
    Subscribe {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Join a single channel (e.g. a chat opened after the subscription).
    Join {
        #[serde(rename = "channelId")]
        channel_id: ChannelId,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Subscribe { .. } => "subscribe",
            ClientEvent::Join { .. } => "join",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_wire_shape() {
        let event: ServerEvent = serde_json::from_value(json!({
            "event": "new_message",
            "data": {
                "channelId": "c1",
                "message": {"senderId": "u2", "text": "hi", "id": "m9"}
            }
        }))
        .unwrap();

        let ServerEvent::NewMessage { channel_id, message } = event else {
            panic!("expected new_message");
        };
        assert_eq!(channel_id, ChannelId::new("c1"));
        assert_eq!(message.sender_id, UserId::new("u2"));
        assert_eq!(message.extra.get("id"), Some(&json!("m9")));
    }

    #[test]
    fn client_events_use_envelopes() {
        let join = ClientEvent::Join {
            channel_id: ChannelId::new("c7"),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({"event": "join", "data": {"channelId": "c7"}})
        );
    }

    #[test]
    fn names_cover_every_variant() {
        let events = [
            ServerEvent::Subscribed { channel_ids: vec![] },
            ServerEvent::NewMessage {
                channel_id: "c".into(),
                message: ChatMessage::from_sender("u"),
            },
            ServerEvent::MessagesRead { channel_id: "c".into() },
            ServerEvent::ChannelDeleted { channel_id: "c".into() },
            ServerEvent::Error { message: "boom".into() },
        ];
        for event in &events {
            assert!(ServerEvent::NAMES.contains(&event.name()));
            let value = serde_json::to_value(event).unwrap();
            assert_eq!(value["event"], json!(event.name()));
        }
    }
}
