// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatwoot wire types: REST request/response bodies and webhook events.

use serde::{Deserialize, Deserializer, Serialize};
use switchboard_core::traits::helpdesk::{
    Contact, Conversation, ConversationStatus, HelpdeskMessage, HelpdeskMessageType,
};

/// `{"payload": ...}` envelope used by most list endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct Payload<T> {
    pub payload: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactInbox {
    pub source_id: String,
    #[serde(default)]
    pub inbox: Option<InboxRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InboxRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiContact {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub contact_inboxes: Vec<ContactInbox>,
}

impl ApiContact {
    pub fn into_contact(self, inbox_id: i64) -> Contact {
        let source_id = self
            .contact_inboxes
            .iter()
            .find(|ci| ci.inbox.as_ref().is_some_and(|i| i.id == inbox_id))
            .map(|ci| ci.source_id.clone());
        Contact {
            id: self.id,
            name: self.name.unwrap_or_default(),
            phone_number: self.phone_number,
            identifier: self.identifier,
            source_id,
        }
    }
}

/// Body of `POST /contacts`: the contact plus its inbox link.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedContact {
    pub contact: ApiContact,
    #[serde(default)]
    pub contact_inbox: Option<ContactInbox>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateContactRequest<'a> {
    pub inbox_id: i64,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<&'a str>,
    pub identifier: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateContactInboxRequest {
    pub inbox_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiConversation {
    pub id: i64,
    pub status: ConversationStatus,
    pub inbox_id: i64,
}

impl From<ApiConversation> for Conversation {
    fn from(c: ApiConversation) -> Self {
        Conversation {
            id: c.id,
            status: c.status,
            inbox_id: c.inbox_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateConversationRequest<'a> {
    pub source_id: &'a str,
    pub inbox_id: i64,
    pub contact_id: i64,
    pub status: ConversationStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct ToggleStatusRequest {
    pub status: ConversationStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    pub id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(deserialize_with = "message_type")]
    pub message_type: HelpdeskMessageType,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<i64>,
}

impl ApiMessage {
    pub fn into_message(self, conversation_id: i64) -> HelpdeskMessage {
        HelpdeskMessage {
            id: self.id,
            conversation_id: self.conversation_id.unwrap_or(conversation_id),
            content: self.content,
            message_type: self.message_type,
            private: self.private,
            source_id: self.source_id,
        }
    }
}

/// The REST API reports message types as integers, webhooks as names.
fn message_type<'de, D>(deserializer: D) -> Result<HelpdeskMessageType, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Code(u8),
        Name(HelpdeskMessageType),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Name(kind) => Ok(kind),
        Raw::Code(0) => Ok(HelpdeskMessageType::Incoming),
        Raw::Code(1) => Ok(HelpdeskMessageType::Outgoing),
        Raw::Code(2) => Ok(HelpdeskMessageType::Activity),
        Raw::Code(3) => Ok(HelpdeskMessageType::Template),
        Raw::Code(other) => Err(serde::de::Error::custom(format!(
            "unknown message type code {other}"
        ))),
    }
}

/// `GET /conversations/{id}/messages` returns `{"meta": ..., "payload": [...]}`.
pub(crate) type MessageList = Payload<Vec<ApiMessage>>;

/// Webhook event posted by the helpdesk platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    MessageCreated(PlatformMessage),
    ConversationStatusChanged(PlatformConversation),
    #[serde(other)]
    Other,
}

/// A message authored on the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformMessage {
    pub id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(deserialize_with = "message_type")]
    pub message_type: HelpdeskMessageType,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub source_id: Option<String>,
    pub conversation: PlatformConversation,
    #[serde(default)]
    pub sender: Option<PlatformSender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConversation {
    pub id: i64,
    #[serde(default)]
    pub status: Option<ConversationStatus>,
    #[serde(default)]
    pub inbox_id: Option<i64>,
    #[serde(default)]
    pub meta: Option<ConversationMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationMeta {
    #[serde(default)]
    pub sender: Option<PlatformContact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformContact {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Author of a platform message (an agent, usually).
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSender {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl PlatformConversation {
    /// Counterparty address: the contact identifier, else its phone number.
    pub fn recipient(&self) -> Option<&str> {
        let contact = self.meta.as_ref()?.sender.as_ref()?;
        contact
            .identifier
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(contact.phone_number.as_deref().filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_created_webhook_parses() {
        let raw = serde_json::json!({
            "event": "message_created",
            "id": 41,
            "content": "**hello**",
            "message_type": "outgoing",
            "private": false,
            "source_id": null,
            "conversation": {
                "id": 7,
                "status": "open",
                "inbox_id": 3,
                "meta": {"sender": {"identifier": "5511987654321@s.whatsapp.net", "phone_number": "+5511987654321"}}
            },
            "sender": {"name": "Bia", "type": "user"}
        });
        let PlatformEvent::MessageCreated(message) = serde_json::from_value(raw).unwrap() else {
            panic!("expected message_created");
        };
        assert_eq!(message.message_type, HelpdeskMessageType::Outgoing);
        assert_eq!(
            message.conversation.recipient(),
            Some("5511987654321@s.whatsapp.net")
        );
        assert_eq!(message.sender.unwrap().name.as_deref(), Some("Bia"));
    }

    #[test]
    fn status_changed_and_unknown_events_parse() {
        let changed: PlatformEvent = serde_json::from_value(serde_json::json!({
            "event": "conversation_status_changed",
            "id": 7,
            "status": "resolved"
        }))
        .unwrap();
        assert!(matches!(
            changed,
            PlatformEvent::ConversationStatusChanged(PlatformConversation {
                id: 7,
                status: Some(ConversationStatus::Resolved),
                ..
            })
        ));

        let other: PlatformEvent =
            serde_json::from_value(serde_json::json!({"event": "webwidget_triggered"})).unwrap();
        assert!(matches!(other, PlatformEvent::Other));
    }

    #[test]
    fn api_message_type_codes() {
        let message: ApiMessage = serde_json::from_value(serde_json::json!({
            "id": 1, "content": "x", "message_type": 1, "private": true
        }))
        .unwrap();
        assert_eq!(message.message_type, HelpdeskMessageType::Outgoing);
        assert!(message.private);
    }

    #[test]
    fn contact_source_id_matches_inbox() {
        let contact: ApiContact = serde_json::from_value(serde_json::json!({
            "id": 9,
            "name": "Ana",
            "contact_inboxes": [
                {"source_id": "other", "inbox": {"id": 1}},
                {"source_id": "mine", "inbox": {"id": 3}}
            ]
        }))
        .unwrap();
        assert_eq!(contact.into_contact(3).source_id.as_deref(), Some("mine"));
    }
}
