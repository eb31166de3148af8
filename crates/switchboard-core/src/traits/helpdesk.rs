// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpdesk platform contract (Chatwoot-shaped REST API) and its value types.
//!
//! The platform exposes find and create primitives; the bridge composes them
//! into find-or-create.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SwitchboardError;
use crate::traits::adapter::PluginAdapter;

/// Account and inbox a session relays into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HelpdeskScope {
    pub account_id: i64,
    pub inbox_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone_number: Option<String>,
    /// Canonical protocol address of the contact.
    pub identifier: Option<String>,
    /// Contact-inbox source id, required to open conversations.
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub phone_number: Option<String>,
    pub identifier: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Pending,
    Resolved,
    Snoozed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub status: ConversationStatus,
    pub inbox_id: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HelpdeskMessageType {
    Incoming,
    Outgoing,
    Activity,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewHelpdeskMessage {
    pub content: String,
    pub message_type: HelpdeskMessageType,
    pub private: bool,
    /// Source marker the bridge uses to recognize its own submissions.
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpdeskMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub content: Option<String>,
    pub message_type: HelpdeskMessageType,
    pub private: bool,
    pub source_id: Option<String>,
}

#[async_trait]
pub trait HelpdeskPlatform: PluginAdapter {
    /// Searches contacts by identifier or phone number within the account.
    async fn find_contact(
        &self,
        scope: HelpdeskScope,
        query: &str,
    ) -> Result<Option<Contact>, SwitchboardError>;

    /// Creates a contact attached to the scope's inbox.
    async fn create_contact(
        &self,
        scope: HelpdeskScope,
        contact: &NewContact,
    ) -> Result<Contact, SwitchboardError>;

    /// The most recent conversation of the contact in the scope's inbox.
    async fn find_conversation(
        &self,
        scope: HelpdeskScope,
        contact_id: i64,
    ) -> Result<Option<Conversation>, SwitchboardError>;

    async fn create_conversation(
        &self,
        scope: HelpdeskScope,
        contact: &Contact,
        status: ConversationStatus,
    ) -> Result<Conversation, SwitchboardError>;

    async fn update_conversation_status(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
        status: ConversationStatus,
    ) -> Result<(), SwitchboardError>;

    async fn send_message(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
        message: &NewHelpdeskMessage,
    ) -> Result<HelpdeskMessage, SwitchboardError>;

    async fn list_messages(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
    ) -> Result<Vec<HelpdeskMessage>, SwitchboardError>;
}
