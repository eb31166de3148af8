// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory helpdesk platform.
//!
//! `MockHelpdesk` keeps contacts, conversations and messages in memory with
//! Chatwoot-like semantics, and can be told to fail upcoming `send_message`
//! calls transiently or terminally.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use switchboard_core::identifier;
use switchboard_core::traits::helpdesk::{
    Contact, Conversation, ConversationStatus, HelpdeskMessage, HelpdeskMessageType,
    HelpdeskScope, NewContact, NewHelpdeskMessage,
};
use switchboard_core::{
    AdapterType, HealthStatus, HelpdeskPlatform, PluginAdapter, SwitchboardError,
};

/// How an injected `send_message` failure presents itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Platform unreachable (transient).
    Unavailable,
    /// Request rejected with a 422 (terminal).
    Rejected,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    /// Contact plus the inbox it belongs to.
    contacts: Vec<(Contact, i64)>,
    /// Conversation plus its contact id.
    conversations: Vec<(Conversation, i64)>,
    messages: Vec<HelpdeskMessage>,
    failures: Vec<MockFailure>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct MockHelpdesk {
    state: Mutex<State>,
    send_calls: AtomicU32,
}

impl MockHelpdesk {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            send_calls: AtomicU32::new(0),
        }
    }

    pub fn add_contact(
        &self,
        name: &str,
        identifier: &str,
        phone_number: Option<&str>,
        inbox_id: i64,
    ) -> Contact {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let contact = Contact {
            id,
            name: name.to_string(),
            phone_number: phone_number.map(str::to_string),
            identifier: Some(identifier.to_string()),
            source_id: Some(identifier.to_string()),
        };
        state.contacts.push((contact.clone(), inbox_id));
        contact
    }

    pub fn add_conversation(
        &self,
        contact_id: i64,
        inbox_id: i64,
        status: ConversationStatus,
    ) -> Conversation {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let conversation = Conversation {
            id,
            status,
            inbox_id,
        };
        state.conversations.push((conversation.clone(), contact_id));
        conversation
    }

    /// Store a message directly, bypassing `send_message` and its counters.
    pub fn add_message(
        &self,
        conversation_id: i64,
        content: &str,
        source_id: Option<&str>,
    ) -> HelpdeskMessage {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let message = HelpdeskMessage {
            id,
            conversation_id,
            content: Some(content.to_string()),
            message_type: HelpdeskMessageType::Incoming,
            private: false,
            source_id: source_id.map(str::to_string),
        };
        state.messages.push(message.clone());
        message
    }

    pub fn set_conversation_status(&self, conversation_id: i64, status: ConversationStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some((conversation, _)) = state
            .conversations
            .iter_mut()
            .find(|(c, _)| c.id == conversation_id)
        {
            conversation.status = status;
        }
    }

    /// Fail the next `n` `send_message` calls.
    pub fn fail_sends(&self, n: usize, failure: MockFailure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .extend(std::iter::repeat_n(failure, n));
    }

    pub fn contacts(&self) -> Vec<Contact> {
        let state = self.state.lock().unwrap();
        state.contacts.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn conversation(&self, id: i64) -> Option<Conversation> {
        let state = self.state.lock().unwrap();
        state
            .conversations
            .iter()
            .find(|(c, _)| c.id == id)
            .map(|(c, _)| c.clone())
    }

    pub fn conversations_of(&self, contact_id: i64) -> Vec<Conversation> {
        let state = self.state.lock().unwrap();
        state
            .conversations
            .iter()
            .filter(|(_, owner)| *owner == contact_id)
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn messages(&self, conversation_id: i64) -> Vec<HelpdeskMessage> {
        let state = self.state.lock().unwrap();
        state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn all_messages(&self) -> Vec<HelpdeskMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// `send_message` invocations, failed ones included.
    pub fn send_calls(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockHelpdesk {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_query(contact: &Contact, query: &str) -> bool {
    if contact.identifier.as_deref() == Some(query) {
        return true;
    }
    let phone = identifier::normalize(query)
        .ok()
        .and_then(|jid| jid.phone_number());
    phone.is_some() && contact.phone_number == phone
}

#[async_trait]
impl PluginAdapter for MockHelpdesk {
    fn name(&self) -> &str {
        "mock-helpdesk"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Helpdesk
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[async_trait]
impl HelpdeskPlatform for MockHelpdesk {
    async fn find_contact(
        &self,
        scope: HelpdeskScope,
        query: &str,
    ) -> Result<Option<Contact>, SwitchboardError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .contacts
            .iter()
            .find(|(c, inbox)| *inbox == scope.inbox_id && matches_query(c, query))
            .map(|(c, _)| c.clone()))
    }

    async fn create_contact(
        &self,
        scope: HelpdeskScope,
        contact: &NewContact,
    ) -> Result<Contact, SwitchboardError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let created = Contact {
            id,
            name: contact.name.clone(),
            phone_number: contact.phone_number.clone(),
            identifier: Some(contact.identifier.clone()),
            source_id: Some(contact.identifier.clone()),
        };
        state.contacts.push((created.clone(), scope.inbox_id));
        Ok(created)
    }

    async fn find_conversation(
        &self,
        scope: HelpdeskScope,
        contact_id: i64,
    ) -> Result<Option<Conversation>, SwitchboardError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .filter(|(c, owner)| *owner == contact_id && c.inbox_id == scope.inbox_id)
            .map(|(c, _)| c.clone())
            .max_by_key(|c| c.id))
    }

    async fn create_conversation(
        &self,
        scope: HelpdeskScope,
        contact: &Contact,
        status: ConversationStatus,
    ) -> Result<Conversation, SwitchboardError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let conversation = Conversation {
            id,
            status,
            inbox_id: scope.inbox_id,
        };
        state.conversations.push((conversation.clone(), contact.id));
        Ok(conversation)
    }

    async fn update_conversation_status(
        &self,
        _scope: HelpdeskScope,
        conversation_id: i64,
        status: ConversationStatus,
    ) -> Result<(), SwitchboardError> {
        if self.conversation(conversation_id).is_none() {
            return Err(SwitchboardError::HelpdeskRejected {
                status: 404,
                message: format!("conversation {conversation_id} not found"),
            });
        }
        self.set_conversation_status(conversation_id, status);
        Ok(())
    }

    async fn send_message(
        &self,
        _scope: HelpdeskScope,
        conversation_id: i64,
        message: &NewHelpdeskMessage,
    ) -> Result<HelpdeskMessage, SwitchboardError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if !state.failures.is_empty() {
            return Err(match state.failures.remove(0) {
                MockFailure::Unavailable => SwitchboardError::HelpdeskUnavailable {
                    message: "503 service unavailable".into(),
                },
                MockFailure::Rejected => SwitchboardError::HelpdeskRejected {
                    status: 422,
                    message: "unprocessable entity".into(),
                },
            });
        }
        if !state.conversations.iter().any(|(c, _)| c.id == conversation_id) {
            return Err(SwitchboardError::HelpdeskRejected {
                status: 404,
                message: format!("conversation {conversation_id} not found"),
            });
        }
        let id = state.next_id();
        let stored = HelpdeskMessage {
            id,
            conversation_id,
            content: Some(message.content.clone()),
            message_type: message.message_type,
            private: message.private,
            source_id: message.source_id.clone(),
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        _scope: HelpdeskScope,
        conversation_id: i64,
    ) -> Result<Vec<HelpdeskMessage>, SwitchboardError> {
        Ok(self.messages(conversation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOPE: HelpdeskScope = HelpdeskScope {
        account_id: 1,
        inbox_id: 3,
    };

    #[tokio::test]
    async fn find_contact_by_identifier_or_phone() {
        let helpdesk = MockHelpdesk::new();
        let ana = helpdesk.add_contact(
            "Ana",
            "5511987654321@s.whatsapp.net",
            Some("+5511987654321"),
            3,
        );

        let by_id = helpdesk
            .find_contact(SCOPE, "5511987654321@s.whatsapp.net")
            .await
            .unwrap();
        assert_eq!(by_id.map(|c| c.id), Some(ana.id));
        let by_phone = helpdesk.find_contact(SCOPE, "5511987654321").await.unwrap();
        assert_eq!(by_phone.map(|c| c.id), Some(ana.id));

        let other_inbox = HelpdeskScope {
            account_id: 1,
            inbox_id: 9,
        };
        assert!(helpdesk
            .find_contact(other_inbox, "5511987654321")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let helpdesk = MockHelpdesk::new();
        let contact = helpdesk.add_contact("Ana", "1@s.whatsapp.net", None, 3);
        let conversation = helpdesk.add_conversation(contact.id, 3, ConversationStatus::Open);
        helpdesk.fail_sends(1, MockFailure::Unavailable);
        helpdesk.fail_sends(1, MockFailure::Rejected);
        let message = NewHelpdeskMessage {
            content: "hi".into(),
            message_type: HelpdeskMessageType::Incoming,
            private: false,
            source_id: None,
        };

        let first = helpdesk.send_message(SCOPE, conversation.id, &message).await;
        assert!(first.unwrap_err().is_transient());
        let second = helpdesk.send_message(SCOPE, conversation.id, &message).await;
        assert!(!second.unwrap_err().is_transient());
        helpdesk
            .send_message(SCOPE, conversation.id, &message)
            .await
            .unwrap();
        assert_eq!(helpdesk.send_calls(), 3);
        assert_eq!(helpdesk.messages(conversation.id).len(), 1);
    }
}
