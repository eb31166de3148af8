// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The helpdesk bridge: idempotent relay between protocol messages and
//! helpdesk conversations.
//!
//! Every relayed message owns one mapping record keyed by
//! `(session_id, protocol_message_id)`. Inbound relay claims the record before
//! touching the platform and every message it submits carries the source
//! marker `WAID:<protocol id>`. Together they make redelivery a no-op and let
//! the pending sweep detect submissions whose record update was lost.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use switchboard_config::model::HelpdeskConfig;
use switchboard_core::events::NormalizedMessage;
use switchboard_core::identifier::{self, Jid};
use switchboard_core::traits::helpdesk::{
    Contact, Conversation, ConversationStatus, HelpdeskMessageType, HelpdeskScope, NewContact,
    NewHelpdeskMessage,
};
use switchboard_core::types::{Direction, MappingRecord, NewMapping, SyncStatus};
use switchboard_core::{
    HelpdeskPlatform, HelpdeskSettings, InboundRelay, MappingStore, ProtocolSender, RelayOutcome,
    SwitchboardError,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::format;
use crate::types::{PlatformConversation, PlatformEvent, PlatformMessage};

/// Prefix of the `source_id` the bridge stamps on its own submissions.
pub const SOURCE_MARKER_PREFIX: &str = "WAID:";

pub fn source_marker(protocol_message_id: &str) -> String {
    format!("{SOURCE_MARKER_PREFIX}{protocol_message_id}")
}

/// Why a platform message was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotOutgoing,
    Private,
    OwnSubmission,
    AlreadyMapped,
    EmptyContent,
    NoRecipient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutboundOutcome {
    Sent { protocol_message_id: String },
    Skipped { reason: SkipReason },
}

/// Counts from one pending sweep of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub synced: usize,
    pub pending: usize,
    pub failed: usize,
    /// Records already being relayed by another task.
    pub busy: usize,
}

type ConversationKey = (i64, i64);

/// Bridge behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Transient failures tolerated per record before it turns `failed`.
    pub max_attempts: u32,
}

impl BridgeSettings {
    pub fn from_config(config: &HelpdeskConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&HelpdeskConfig::default())
    }
}

pub struct HelpdeskBridge {
    platform: Arc<dyn HelpdeskPlatform>,
    mappings: Arc<dyn MappingStore>,
    settings: BridgeSettings,
    sender: OnceLock<Weak<dyn ProtocolSender>>,
    /// `(inbox_id, canonical address)` -> contact.
    contacts: DashMap<(i64, String), Contact>,
    /// `(inbox_id, contact_id)` -> conversation.
    conversations: DashMap<ConversationKey, Conversation>,
    /// Per-session gate held by outbound relay from send until the mapping
    /// record is written; inbound echoes of own sends wait on it.
    gates: DashMap<String, Arc<Mutex<()>>>,
    /// `(session_id, protocol_message_id)` currently being relayed.
    inflight: DashSet<(String, String)>,
}

/// Removes an in-flight marker when the relay attempt ends.
struct InflightGuard<'a> {
    set: &'a DashSet<(String, String)>,
    key: (String, String),
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

fn scope(settings: &HelpdeskSettings) -> HelpdeskScope {
    HelpdeskScope {
        account_id: settings.account_id,
        inbox_id: settings.inbox_id,
    }
}

fn initial_status(settings: &HelpdeskSettings) -> ConversationStatus {
    if settings.conversation_pending {
        ConversationStatus::Pending
    } else {
        ConversationStatus::Open
    }
}

impl HelpdeskBridge {
    pub fn new(
        platform: Arc<dyn HelpdeskPlatform>,
        mappings: Arc<dyn MappingStore>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            platform,
            mappings,
            settings,
            sender: OnceLock::new(),
            contacts: DashMap::new(),
            conversations: DashMap::new(),
            gates: DashMap::new(),
            inflight: DashSet::new(),
        }
    }

    /// Wire the protocol sender used by outbound relay. Only the first call
    /// takes effect.
    pub fn attach_sender(&self, sender: Weak<dyn ProtocolSender>) {
        if self.sender.set(sender).is_err() {
            warn!("protocol sender already attached to helpdesk bridge");
        }
    }

    fn sender(&self) -> Result<Arc<dyn ProtocolSender>, SwitchboardError> {
        self.sender
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| SwitchboardError::Internal("no protocol sender attached".into()))
    }

    fn gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.gates
                .entry(session_id.to_string())
                .or_default()
                .value(),
        )
    }

    fn begin(&self, session_id: &str, message_id: &str) -> Option<InflightGuard<'_>> {
        let key = (session_id.to_string(), message_id.to_string());
        self.inflight.insert(key.clone()).then(|| InflightGuard {
            set: &self.inflight,
            key,
        })
    }

    /// Contact for `chat`, searching both numbering variants when merging is
    /// enabled and creating it when absent.
    async fn resolve_contact(
        &self,
        scope: HelpdeskScope,
        settings: &HelpdeskSettings,
        message: &NormalizedMessage,
    ) -> Result<Contact, SwitchboardError> {
        let chat = identifier::normalize(&message.chat)?;
        let key = (scope.inbox_id, chat.to_string());
        if let Some(contact) = self.contacts.get(&key) {
            return Ok(contact.clone());
        }

        let mut candidates = vec![chat.clone()];
        if settings.merge_alternate_numbering_form
            && let Some(alternate) = identifier::alternate_form(&chat)
        {
            candidates.push(alternate);
        }

        let mut found = None;
        for candidate in &candidates {
            if let Some(contact) = self
                .platform
                .find_contact(scope, &candidate.to_string())
                .await?
            {
                found = Some(contact);
                break;
            }
        }

        let contact = match found {
            Some(contact) => contact,
            None => {
                let created = self
                    .platform
                    .create_contact(scope, &new_contact(&chat, message))
                    .await?;
                info!(
                    session_id = %message.session_id,
                    contact_id = created.id,
                    identifier = %chat,
                    "helpdesk contact created"
                );
                created
            }
        };
        for candidate in candidates {
            self.contacts
                .insert((scope.inbox_id, candidate.to_string()), contact.clone());
        }
        Ok(contact)
    }

    /// Conversation for `contact`, applying the reopen rules to a resolved one.
    async fn resolve_conversation(
        &self,
        scope: HelpdeskScope,
        settings: &HelpdeskSettings,
        contact: &Contact,
    ) -> Result<Conversation, SwitchboardError> {
        let key = (scope.inbox_id, contact.id);
        let existing = match self.conversations.get(&key) {
            Some(cached) => Some(cached.clone()),
            None => self.platform.find_conversation(scope, contact.id).await?,
        };
        let status = initial_status(settings);

        let conversation = match existing {
            Some(conversation) if conversation.status != ConversationStatus::Resolved => {
                conversation
            }
            Some(mut conversation) if settings.reopen_conversation => {
                self.platform
                    .update_conversation_status(scope, conversation.id, status)
                    .await?;
                debug!(conversation_id = conversation.id, status = %status, "conversation reopened");
                conversation.status = status;
                conversation
            }
            _ => {
                let created = self
                    .platform
                    .create_conversation(scope, contact, status)
                    .await?;
                debug!(conversation_id = created.id, contact_id = contact.id, "conversation created");
                created
            }
        };
        self.conversations.insert(key, conversation.clone());
        Ok(conversation)
    }

    /// The platform message already carrying `marker`, if any.
    async fn find_submitted(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
        marker: &str,
    ) -> Result<Option<i64>, SwitchboardError> {
        let messages = self.platform.list_messages(scope, conversation_id).await?;
        Ok(messages
            .into_iter()
            .find(|m| m.source_id.as_deref() == Some(marker))
            .map(|m| m.id))
    }

    async fn submit(
        &self,
        settings: &HelpdeskSettings,
        record: &MappingRecord,
        message: &NormalizedMessage,
    ) -> Result<RelayOutcome, SwitchboardError> {
        let scope = scope(settings);
        let marker = source_marker(&message.message_id);

        if let Some(conversation_id) = record.helpdesk_conversation_id
            && let Some(helpdesk_message_id) =
                self.find_submitted(scope, conversation_id, &marker).await?
        {
            self.mappings
                .mark_synced(record.id, helpdesk_message_id, conversation_id)
                .await?;
            info!(
                session_id = %message.session_id,
                message_id = %message.message_id,
                helpdesk_message_id,
                "earlier submission found, record marked synced"
            );
            return Ok(RelayOutcome::Synced {
                helpdesk_message_id,
                conversation_id,
            });
        }

        let contact = self.resolve_contact(scope, settings, message).await?;
        let conversation = self.resolve_conversation(scope, settings, &contact).await?;
        self.mappings
            .record_conversation(record.id, conversation.id)
            .await?;

        let message_type = match message.direction {
            Direction::Incoming => HelpdeskMessageType::Incoming,
            Direction::Outgoing => HelpdeskMessageType::Outgoing,
        };
        let sent = self
            .platform
            .send_message(
                scope,
                conversation.id,
                &NewHelpdeskMessage {
                    content: format::inbound_content(message),
                    message_type,
                    private: false,
                    source_id: Some(marker),
                },
            )
            .await?;
        self.mappings
            .mark_synced(record.id, sent.id, conversation.id)
            .await?;
        debug!(
            session_id = %message.session_id,
            message_id = %message.message_id,
            helpdesk_message_id = sent.id,
            conversation_id = conversation.id,
            "message relayed to helpdesk"
        );
        Ok(RelayOutcome::Synced {
            helpdesk_message_id: sent.id,
            conversation_id: conversation.id,
        })
    }

    /// Submit and settle the record: transient errors count an attempt,
    /// rejections fail the record.
    async fn attempt(
        &self,
        settings: &HelpdeskSettings,
        record: &MappingRecord,
        message: &NormalizedMessage,
    ) -> Result<RelayOutcome, SwitchboardError> {
        match self.submit(settings, record, message).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_transient() => {
                let error = e.to_string();
                let status = self
                    .mappings
                    .record_failure(record.id, &error, self.settings.max_attempts)
                    .await?;
                if status == SyncStatus::Failed {
                    error!(
                        session_id = %message.session_id,
                        message_id = %message.message_id,
                        attempts = self.settings.max_attempts,
                        error = %error,
                        "helpdesk relay gave up"
                    );
                    Ok(RelayOutcome::Failed { error })
                } else {
                    warn!(
                        session_id = %message.session_id,
                        message_id = %message.message_id,
                        error = %error,
                        "helpdesk relay left pending"
                    );
                    Ok(RelayOutcome::Pending { error })
                }
            }
            Err(e) => {
                let error = e.to_string();
                self.mappings.mark_failed(record.id, &error).await?;
                error!(
                    session_id = %message.session_id,
                    message_id = %message.message_id,
                    chat = %message.chat,
                    error = %error,
                    "helpdesk rejected message"
                );
                Ok(RelayOutcome::Failed { error })
            }
        }
    }

    /// Forward a platform-authored message to the protocol side.
    pub async fn relay_outbound(
        &self,
        session_id: &str,
        settings: &HelpdeskSettings,
        message: PlatformMessage,
    ) -> Result<OutboundOutcome, SwitchboardError> {
        let skip = |reason: SkipReason| {
            debug!(session_id, helpdesk_message_id = message.id, ?reason, "platform message not forwarded");
            Ok(OutboundOutcome::Skipped { reason })
        };
        if message.message_type != HelpdeskMessageType::Outgoing {
            return skip(SkipReason::NotOutgoing);
        }
        if message.private {
            return skip(SkipReason::Private);
        }
        if message
            .source_id
            .as_deref()
            .is_some_and(|s| s.starts_with(SOURCE_MARKER_PREFIX))
        {
            return skip(SkipReason::OwnSubmission);
        }
        if self
            .mappings
            .find_by_helpdesk_message(session_id, message.id)
            .await?
            .is_some()
        {
            return skip(SkipReason::AlreadyMapped);
        }
        let Some(content) = message.content.as_deref().filter(|c| !c.trim().is_empty()) else {
            return skip(SkipReason::EmptyContent);
        };
        let Some(recipient) = message
            .conversation
            .recipient()
            .and_then(|r| identifier::resolve(r).ok())
        else {
            return skip(SkipReason::NoRecipient);
        };

        let agent = message.sender.as_ref().and_then(|s| s.name.as_deref());
        let text = format::outbound_content(content, agent, settings.sign_messages);
        let sender = self.sender()?;

        let gate = self.gate(session_id);
        let _held = gate.lock().await;
        let receipt = sender.send_text(session_id, &recipient, &text).await?;
        self.mappings
            .insert_synced(
                &outbound_mapping(session_id, &recipient, &receipt.message_id, receipt.timestamp),
                message.id,
                message.conversation.id,
            )
            .await?;
        info!(
            session_id,
            message_id = %receipt.message_id,
            helpdesk_message_id = message.id,
            "platform message forwarded"
        );
        Ok(OutboundOutcome::Sent {
            protocol_message_id: receipt.message_id,
        })
    }

    /// Apply a conversation status change. A resolved conversation is evicted
    /// so the next inbound message goes through the reopen rules.
    pub fn conversation_status_changed(&self, conversation: &PlatformConversation) -> bool {
        match conversation.status {
            Some(ConversationStatus::Resolved) => {
                let before = self.conversations.len();
                self.conversations.retain(|_, c| c.id != conversation.id);
                let evicted = self.conversations.len() < before;
                debug!(conversation_id = conversation.id, evicted, "conversation resolved");
                evicted
            }
            Some(status) => {
                for mut entry in self.conversations.iter_mut() {
                    if entry.id == conversation.id {
                        entry.status = status;
                    }
                }
                false
            }
            None => false,
        }
    }

    /// Route a platform webhook event.
    pub async fn handle_platform_event(
        &self,
        session_id: &str,
        settings: &HelpdeskSettings,
        event: PlatformEvent,
    ) -> Result<Option<OutboundOutcome>, SwitchboardError> {
        match event {
            PlatformEvent::MessageCreated(message) => self
                .relay_outbound(session_id, settings, message)
                .await
                .map(Some),
            PlatformEvent::ConversationStatusChanged(conversation) => {
                self.conversation_status_changed(&conversation);
                Ok(None)
            }
            PlatformEvent::Other => Ok(None),
        }
    }

    /// Re-attempt up to `limit` pending records of a session, oldest first.
    pub async fn process_pending_messages(
        &self,
        session_id: &str,
        settings: &HelpdeskSettings,
        limit: usize,
    ) -> Result<SweepReport, SwitchboardError> {
        let records = self.mappings.list_pending(session_id, limit).await?;
        let mut report = SweepReport::default();

        for listed in records {
            let Some(_guard) = self.begin(session_id, &listed.protocol_message_id) else {
                report.busy += 1;
                continue;
            };
            // The live path or another sweep may have settled it since listing.
            let record = match self
                .mappings
                .get_mapping(session_id, &listed.protocol_message_id)
                .await?
            {
                Some(record) if record.sync_status == SyncStatus::Pending => record,
                _ => {
                    debug!(
                        session_id,
                        message_id = %listed.protocol_message_id,
                        "pending record settled before sweep reached it"
                    );
                    continue;
                }
            };
            let message = match record
                .payload
                .as_deref()
                .map(serde_json::from_str::<NormalizedMessage>)
            {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    self.mappings
                        .mark_failed(record.id, &format!("unreadable payload: {e}"))
                        .await?;
                    report.failed += 1;
                    continue;
                }
                None => {
                    self.mappings
                        .mark_failed(record.id, "no payload to replay")
                        .await?;
                    report.failed += 1;
                    continue;
                }
            };
            report.attempted += 1;
            match self.attempt(settings, &record, &message).await? {
                RelayOutcome::Synced { .. } => report.synced += 1,
                RelayOutcome::Pending { .. } => report.pending += 1,
                RelayOutcome::Failed { .. } => report.failed += 1,
                RelayOutcome::Duplicate | RelayOutcome::Skipped => {}
            }
        }

        if report.attempted > 0 {
            info!(session_id, ?report, "pending sweep finished");
        }
        Ok(report)
    }
}

fn new_contact(chat: &Jid, message: &NormalizedMessage) -> NewContact {
    let phone_number = chat.phone_number();
    let name = if chat.is_group() {
        format!("Group {}", chat.user())
    } else if message.direction == Direction::Incoming {
        message
            .sender_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| phone_number.clone())
            .unwrap_or_else(|| chat.user().to_string())
    } else {
        phone_number.clone().unwrap_or_else(|| chat.user().to_string())
    };
    NewContact {
        name,
        phone_number,
        identifier: chat.to_string(),
    }
}

fn outbound_mapping(
    session_id: &str,
    recipient: &Jid,
    protocol_message_id: &str,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> NewMapping {
    NewMapping {
        session_id: session_id.to_string(),
        protocol_message_id: protocol_message_id.to_string(),
        chat_identifier: recipient.to_string(),
        sender_identifier: recipient.to_string(),
        direction: Direction::Outgoing,
        protocol_timestamp: timestamp,
        payload: None,
    }
}

#[async_trait]
impl InboundRelay for HelpdeskBridge {
    async fn relay_inbound(
        &self,
        settings: &HelpdeskSettings,
        message: NormalizedMessage,
    ) -> Result<RelayOutcome, SwitchboardError> {
        if message.direction == Direction::Outgoing {
            // Wait out an outbound relay that may be writing this message's record.
            drop(self.gate(&message.session_id).lock().await);
        }

        let Some(_guard) = self.begin(&message.session_id, &message.message_id) else {
            debug!(session_id = %message.session_id, message_id = %message.message_id, "relay already in flight");
            return Ok(RelayOutcome::Duplicate);
        };

        let new = NewMapping {
            session_id: message.session_id.clone(),
            protocol_message_id: message.message_id.clone(),
            chat_identifier: message.chat.clone(),
            sender_identifier: message.sender.clone(),
            direction: message.direction,
            protocol_timestamp: message.timestamp,
            payload: serde_json::to_string(&message).ok(),
        };
        let (record, created) = self.mappings.claim_mapping(&new).await?;
        if !created && record.sync_status != SyncStatus::Pending {
            debug!(
                session_id = %message.session_id,
                message_id = %message.message_id,
                status = %record.sync_status,
                "message already relayed"
            );
            return Ok(RelayOutcome::Duplicate);
        }
        self.attempt(settings, &record, &message).await
    }
}
