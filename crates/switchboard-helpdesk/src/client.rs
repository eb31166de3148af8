// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Chatwoot application API.
//!
//! [`ChatwootClient`] implements [`HelpdeskPlatform`]. Network errors, 5xx and
//! 429 responses map to [`SwitchboardError::HelpdeskUnavailable`] (transient);
//! any other 4xx maps to [`SwitchboardError::HelpdeskRejected`] (terminal).
//! The client never retries on its own; retry policy belongs to the bridge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use switchboard_config::model::HelpdeskConfig;
use switchboard_core::traits::helpdesk::{
    Contact, Conversation, ConversationStatus, HelpdeskMessage, HelpdeskScope, NewContact,
    NewHelpdeskMessage,
};
use switchboard_core::{AdapterType, HealthStatus, HelpdeskPlatform, PluginAdapter, SwitchboardError};
use tracing::debug;

use crate::types::{
    ApiContact, ApiConversation, ApiMessage, ContactInbox, CreateContactInboxRequest,
    CreateContactRequest, CreateConversationRequest, CreatedContact, MessageList, Payload,
    ToggleStatusRequest,
};

#[derive(Debug, Clone)]
pub struct ChatwootClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatwootClient {
    /// Build a client from the `[helpdesk]` section. Fails when the section
    /// has no base URL or token.
    pub fn from_config(config: &HelpdeskConfig) -> Result<Self, SwitchboardError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| SwitchboardError::Config("helpdesk.base_url is not set".into()))?;
        let token = config
            .api_token
            .as_deref()
            .ok_or_else(|| SwitchboardError::Config("helpdesk.api_token is not set".into()))?;
        Self::new(
            base_url,
            token,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn new(base_url: &str, api_token: &str, timeout: Duration) -> Result<Self, SwitchboardError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api_access_token",
            HeaderValue::from_str(api_token).map_err(|e| {
                SwitchboardError::Config(format!("invalid helpdesk token header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchboardError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, account_id: i64, path: &str) -> String {
        format!("{}/api/v1/accounts/{account_id}/{path}", self.base_url)
    }

    async fn request<B, T>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<T, SwitchboardError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SwitchboardError::HelpdeskUnavailable {
                message: format!("{method} {url} failed: {e}"),
            })?;

        let status = response.status();
        debug!(%method, url = %url, status = %status, "helpdesk response");
        let body = response
            .text()
            .await
            .map_err(|e| SwitchboardError::HelpdeskUnavailable {
                message: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(classify(status, body));
        }
        serde_json::from_str(&body).map_err(|e| SwitchboardError::HelpdeskUnavailable {
            message: format!("unexpected response from {url}: {e}"),
        })
    }

    async fn create_contact_inbox(
        &self,
        scope: HelpdeskScope,
        contact_id: i64,
    ) -> Result<String, SwitchboardError> {
        let inbox: ContactInbox = self
            .request(
                Method::POST,
                self.url(scope.account_id, &format!("contacts/{contact_id}/contact_inboxes")),
                Some(&CreateContactInboxRequest {
                    inbox_id: scope.inbox_id,
                }),
            )
            .await?;
        Ok(inbox.source_id)
    }
}

/// Map a non-success status to the transient/terminal error split.
fn classify(status: StatusCode, body: String) -> SwitchboardError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SwitchboardError::HelpdeskUnavailable {
            message: format!("helpdesk returned {status}: {body}"),
        }
    } else {
        SwitchboardError::HelpdeskRejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

#[async_trait]
impl PluginAdapter for ChatwootClient {
    fn name(&self) -> &str {
        "chatwoot"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Helpdesk
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        match self.client.get(&self.base_url).send().await {
            Ok(response) if response.status().is_server_error() => Ok(HealthStatus::Degraded(
                format!("helpdesk returned {}", response.status()),
            )),
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[async_trait]
impl HelpdeskPlatform for ChatwootClient {
    async fn find_contact(
        &self,
        scope: HelpdeskScope,
        query: &str,
    ) -> Result<Option<Contact>, SwitchboardError> {
        let url = self.url(scope.account_id, "contacts/search");
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SwitchboardError::HelpdeskUnavailable {
                message: format!("GET {url} failed: {e}"),
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SwitchboardError::HelpdeskUnavailable {
                message: format!("failed to read response body: {e}"),
            })?;
        if !status.is_success() {
            return Err(classify(status, body));
        }
        let found: Payload<Vec<ApiContact>> =
            serde_json::from_str(&body).map_err(|e| SwitchboardError::HelpdeskUnavailable {
                message: format!("unexpected contact search response: {e}"),
            })?;

        // Search is fuzzy; only an exact identifier or phone match counts.
        let phone = format!("+{}", query.split('@').next().unwrap_or(query));
        Ok(found
            .payload
            .into_iter()
            .find(|c| {
                c.identifier.as_deref() == Some(query) || c.phone_number.as_deref() == Some(&phone)
            })
            .map(|c| c.into_contact(scope.inbox_id)))
    }

    async fn create_contact(
        &self,
        scope: HelpdeskScope,
        contact: &NewContact,
    ) -> Result<Contact, SwitchboardError> {
        let created: Payload<CreatedContact> = self
            .request(
                Method::POST,
                self.url(scope.account_id, "contacts"),
                Some(&CreateContactRequest {
                    inbox_id: scope.inbox_id,
                    name: &contact.name,
                    phone_number: contact.phone_number.as_deref(),
                    identifier: &contact.identifier,
                }),
            )
            .await?;
        let link = created.payload.contact_inbox.map(|ci| ci.source_id);
        let mut contact = created.payload.contact.into_contact(scope.inbox_id);
        if contact.source_id.is_none() {
            contact.source_id = link;
        }
        Ok(contact)
    }

    async fn find_conversation(
        &self,
        scope: HelpdeskScope,
        contact_id: i64,
    ) -> Result<Option<Conversation>, SwitchboardError> {
        let listed: Payload<Vec<ApiConversation>> = self
            .request::<(), _>(
                Method::GET,
                self.url(scope.account_id, &format!("contacts/{contact_id}/conversations")),
                None,
            )
            .await?;
        Ok(listed
            .payload
            .into_iter()
            .filter(|c| c.inbox_id == scope.inbox_id)
            .max_by_key(|c| c.id)
            .map(Conversation::from))
    }

    async fn create_conversation(
        &self,
        scope: HelpdeskScope,
        contact: &Contact,
        status: ConversationStatus,
    ) -> Result<Conversation, SwitchboardError> {
        let source_id = match &contact.source_id {
            Some(source_id) => source_id.clone(),
            None => self.create_contact_inbox(scope, contact.id).await?,
        };
        let created: ApiConversation = self
            .request(
                Method::POST,
                self.url(scope.account_id, "conversations"),
                Some(&CreateConversationRequest {
                    source_id: &source_id,
                    inbox_id: scope.inbox_id,
                    contact_id: contact.id,
                    status,
                }),
            )
            .await?;
        Ok(created.into())
    }

    async fn update_conversation_status(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
        status: ConversationStatus,
    ) -> Result<(), SwitchboardError> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                self.url(
                    scope.account_id,
                    &format!("conversations/{conversation_id}/toggle_status"),
                ),
                Some(&ToggleStatusRequest { status }),
            )
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
        message: &NewHelpdeskMessage,
    ) -> Result<HelpdeskMessage, SwitchboardError> {
        let sent: ApiMessage = self
            .request(
                Method::POST,
                self.url(
                    scope.account_id,
                    &format!("conversations/{conversation_id}/messages"),
                ),
                Some(message),
            )
            .await?;
        Ok(sent.into_message(conversation_id))
    }

    async fn list_messages(
        &self,
        scope: HelpdeskScope,
        conversation_id: i64,
    ) -> Result<Vec<HelpdeskMessage>, SwitchboardError> {
        let listed: MessageList = self
            .request::<(), _>(
                Method::GET,
                self.url(
                    scope.account_id,
                    &format!("conversations/{conversation_id}/messages"),
                ),
                None,
            )
            .await?;
        Ok(listed
            .payload
            .into_iter()
            .map(|m| m.into_message(conversation_id))
            .collect())
    }
}
