// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol events emitted by a session's protocol client.
//!
//! [`ProtocolEvent`] is a closed enum: the dispatcher matches it exhaustively and
//! anything the client could not classify arrives as [`ProtocolEvent::Unknown`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::identifier;
use crate::types::Direction;

/// A raw event from the protocol client, in arrival order for its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// The connection to the messaging network is established.
    Connected,
    /// The connection dropped.
    Disconnected { reason: Option<String> },
    /// A connection attempt was refused by the network.
    ConnectFailure { reason: String },
    /// The device was unlinked remotely; the identity is no longer valid.
    LoggedOut { reason: Option<String> },
    /// Pairing completed on the phone side.
    PairSuccess {
        device_identity: String,
        #[serde(default)]
        platform: Option<String>,
    },
    Message(MessageEvent),
    /// Messages replayed by the network after pairing.
    HistorySync { messages: Vec<MessageEvent> },
    Receipt {
        chat: String,
        message_ids: Vec<String>,
        kind: String,
        timestamp: DateTime<Utc>,
    },
    Presence { from: String, available: bool },
    CallOffer { from: String, call_id: String },
    /// An event kind the gateway does not model.
    Unknown {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Coarse classification of [`ProtocolEvent`], used for webhook subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Connected,
    Disconnected,
    ConnectFailure,
    LoggedOut,
    PairSuccess,
    Message,
    HistorySync,
    Receipt,
    Presence,
    CallOffer,
    Unknown,
}

impl ProtocolEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProtocolEvent::Connected => EventKind::Connected,
            ProtocolEvent::Disconnected { .. } => EventKind::Disconnected,
            ProtocolEvent::ConnectFailure { .. } => EventKind::ConnectFailure,
            ProtocolEvent::LoggedOut { .. } => EventKind::LoggedOut,
            ProtocolEvent::PairSuccess { .. } => EventKind::PairSuccess,
            ProtocolEvent::Message(_) => EventKind::Message,
            ProtocolEvent::HistorySync { .. } => EventKind::HistorySync,
            ProtocolEvent::Receipt { .. } => EventKind::Receipt,
            ProtocolEvent::Presence { .. } => EventKind::Presence,
            ProtocolEvent::CallOffer { .. } => EventKind::CallOffer,
            ProtocolEvent::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// The event body as generic JSON, without the type tag.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("data").unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        }
    }
}

/// A single chat message as delivered by the protocol client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: String,
    /// Chat the message belongs to (counterparty or group address).
    pub chat: String,
    /// Author of the message; differs from `chat` in groups.
    pub sender: String,
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_group: bool,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Image {
        caption: Option<String>,
        mime_type: String,
    },
    Video {
        caption: Option<String>,
        mime_type: String,
    },
    Audio {
        seconds: u32,
        #[serde(default)]
        voice: bool,
    },
    Document {
        file_name: String,
        caption: Option<String>,
    },
    Sticker,
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
    },
    Contact {
        display_name: String,
        vcard: String,
    },
    Reaction {
        target_id: String,
        emoji: String,
    },
    Poll {
        question: String,
        options: Vec<String>,
    },
    Revoked {
        target_id: String,
    },
    Unsupported {
        kind: String,
    },
}

/// Coarse content type of a normalized message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
    Poll,
}

/// The payload handed to the helpdesk bridge for a message-class event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub session_id: String,
    pub message_id: String,
    pub direction: Direction,
    /// Canonical counterparty address: the contact, or the group.
    pub chat: String,
    /// Canonical author address.
    pub sender: String,
    pub sender_name: Option<String>,
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    /// Best-effort plain-text summary of the content.
    pub text: String,
}

impl MessageEvent {
    /// Extract the relay payload for this message.
    ///
    /// Returns `None` for broadcast/status chats, unparseable chat addresses and
    /// content that has no helpdesk counterpart (reactions, revocations, unknown kinds).
    pub fn normalize(&self, session_id: &str) -> Option<NormalizedMessage> {
        let chat = identifier::normalize(&self.chat).ok()?;
        if chat.is_broadcast() {
            return None;
        }
        let sender = identifier::normalize(&self.sender)
            .map(|jid| jid.to_string())
            .unwrap_or_else(|_| chat.to_string());
        let (content_type, text) = summarize(&self.content)?;

        Some(NormalizedMessage {
            session_id: session_id.to_string(),
            message_id: self.id.clone(),
            direction: Direction::from_me(self.from_me),
            is_group: self.is_group || chat.is_group(),
            chat: chat.to_string(),
            sender,
            sender_name: self.push_name.clone(),
            timestamp: self.timestamp,
            content_type,
            text,
        })
    }
}

fn with_caption(tag: &str, caption: Option<&String>) -> String {
    match caption.map(|c| c.trim()).filter(|c| !c.is_empty()) {
        Some(caption) => format!("[{tag}] {caption}"),
        None => format!("[{tag}]"),
    }
}

fn summarize(content: &MessageContent) -> Option<(ContentType, String)> {
    let summary = match content {
        MessageContent::Text { body } => (ContentType::Text, body.clone()),
        MessageContent::Image { caption, .. } => {
            (ContentType::Image, with_caption("image", caption.as_ref()))
        }
        MessageContent::Video { caption, .. } => {
            (ContentType::Video, with_caption("video", caption.as_ref()))
        }
        MessageContent::Audio { voice, .. } => {
            let tag = if *voice { "[voice note]" } else { "[audio]" };
            (ContentType::Audio, tag.to_string())
        }
        MessageContent::Document { file_name, caption } => {
            let mut text = format!("[document] {file_name}");
            if let Some(caption) = caption.as_ref().filter(|c| !c.trim().is_empty()) {
                text.push('\n');
                text.push_str(caption.trim());
            }
            (ContentType::Document, text)
        }
        MessageContent::Sticker => (ContentType::Sticker, "[sticker]".to_string()),
        MessageContent::Location {
            latitude,
            longitude,
            name,
        } => {
            let label = name.as_deref().unwrap_or("");
            (
                ContentType::Location,
                format!(
                    "[location] {label}\nhttps://www.google.com/maps?q={latitude},{longitude}"
                ),
            )
        }
        MessageContent::Contact { display_name, .. } => {
            (ContentType::Contact, format!("[contact] {display_name}"))
        }
        MessageContent::Poll { question, options } => {
            let mut text = format!("[poll] {question}");
            for option in options {
                text.push_str("\n- ");
                text.push_str(option);
            }
            (ContentType::Poll, text)
        }
        MessageContent::Reaction { .. }
        | MessageContent::Revoked { .. }
        | MessageContent::Unsupported { .. } => return None,
    };
    Some(summary)
}

/// Signals produced on a session's pairing channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingSignal {
    /// A (possibly repeated) pairing code to display.
    Code(String),
    /// The phone accepted the pairing; the session is now connected.
    Success { device_identity: String },
    /// The network gave up waiting for the code to be scanned.
    Timeout,
    /// The handshake failed.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(id: &str, chat: &str, from_me: bool) -> MessageEvent {
        MessageEvent {
            id: id.into(),
            chat: chat.into(),
            sender: chat.into(),
            from_me,
            push_name: Some("Ana".into()),
            timestamp: Utc::now(),
            is_group: false,
            content: MessageContent::Text {
                body: "hello".into(),
            },
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = ProtocolEvent::Disconnected {
            reason: Some("stream end".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["data"]["reason"], "stream end");
        assert_eq!(event.payload()["reason"], "stream end");
        assert_eq!(event.kind().to_string(), "disconnected");
    }

    #[test]
    fn unit_event_payload_is_null() {
        assert!(ProtocolEvent::Connected.payload().is_null());
        assert_eq!(ProtocolEvent::Connected.kind(), EventKind::Connected);
    }

    #[test]
    fn event_kind_parses_from_snake_case() {
        use std::str::FromStr;
        assert_eq!(
            EventKind::from_str("history_sync").unwrap(),
            EventKind::HistorySync
        );
    }

    #[test]
    fn normalize_text_message() {
        let event = text_message("m1", "5511987654321@s.whatsapp.net", false);
        let normalized = event.normalize("s1").unwrap();
        assert_eq!(normalized.session_id, "s1");
        assert_eq!(normalized.message_id, "m1");
        assert_eq!(normalized.direction, Direction::Incoming);
        assert_eq!(normalized.content_type, ContentType::Text);
        assert_eq!(normalized.text, "hello");
        assert!(!normalized.is_group);
    }

    #[test]
    fn normalize_skips_status_broadcast() {
        let event = text_message("m1", "status@broadcast", false);
        assert!(event.normalize("s1").is_none());
    }

    #[test]
    fn normalize_skips_reactions() {
        let mut event = text_message("m1", "5511987654321@s.whatsapp.net", true);
        event.content = MessageContent::Reaction {
            target_id: "m0".into(),
            emoji: "+1".into(),
        };
        assert!(event.normalize("s1").is_none());
    }

    #[test]
    fn location_summary_links_to_map() {
        let mut event = text_message("m2", "5511987654321@s.whatsapp.net", false);
        event.content = MessageContent::Location {
            latitude: -23.5,
            longitude: -46.6,
            name: Some("Office".into()),
        };
        let normalized = event.normalize("s1").unwrap();
        assert_eq!(normalized.content_type, ContentType::Location);
        assert!(normalized.text.starts_with("[location] Office\n"));
        assert!(normalized.text.ends_with("q=-23.5,-46.6"));
    }

    #[test]
    fn group_message_is_flagged() {
        let mut event = text_message("m3", "120363025246125486@g.us", false);
        event.sender = "5511987654321@s.whatsapp.net".into();
        let normalized = event.normalize("s1").unwrap();
        assert!(normalized.is_group);
        assert_eq!(normalized.sender, "5511987654321@s.whatsapp.net");
        assert_eq!(normalized.chat, "120363025246125486@g.us");
    }

    #[test]
    fn poll_summary_lists_options() {
        let mut event = text_message("m4", "5511987654321@s.whatsapp.net", true);
        event.content = MessageContent::Poll {
            question: "Lunch?".into(),
            options: vec!["yes".into(), "no".into()],
        };
        let normalized = event.normalize("s1").unwrap();
        assert_eq!(normalized.direction, Direction::Outgoing);
        assert_eq!(normalized.text, "[poll] Lunch?\n- yes\n- no");
    }
}
