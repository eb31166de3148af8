// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway assembly.
//!
//! [`GatewayBuilder`] opens storage and wires the optional collaborators
//! (helpdesk bridge, webhook relay) into the session registry. [`Gateway`]
//! is the control surface embedders drive.

use std::sync::Arc;

use serde::Serialize;
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::types::{PairingCode, ProxyConfig, SendReceipt, SessionStatus};
use switchboard_core::{
    HealthStatus, HelpdeskPlatform, HelpdeskSettings, InboundRelay, MappingStore, PluginAdapter,
    ProtocolClientFactory, ProtocolSender, SessionStore, StorageAdapter, SwitchboardError,
    SyncStatus, WebhookSink,
};
use switchboard_helpdesk::{
    BridgeSettings, ChatwootClient, HelpdeskBridge, OutboundOutcome, PlatformEvent, SweepReport,
};
use switchboard_session::{
    Dispatcher, RestoreReport, SessionHandle, SessionRegistry, SessionSettings, SessionSnapshot,
};
use switchboard_storage::SqliteStorage;
use switchboard_webhook::{WebhookRelay, WebhookSettings};
use tracing::{debug, info, warn};

/// Identity-mapping totals of one session, by sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingCounts {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
}

impl MappingCounts {
    pub async fn load(store: &dyn MappingStore, session_id: &str) -> Result<Self, SwitchboardError> {
        Ok(Self {
            pending: store.count_by_status(session_id, SyncStatus::Pending).await?,
            synced: store.count_by_status(session_id, SyncStatus::Synced).await?,
            failed: store.count_by_status(session_id, SyncStatus::Failed).await?,
        })
    }
}

/// Health of one adapter, as reported by [`Gateway::health`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterHealth {
    pub name: String,
    pub status: HealthStatus,
}

impl AdapterHealth {
    fn from_check(name: &str, check: Result<HealthStatus, SwitchboardError>) -> Self {
        Self {
            name: name.to_string(),
            status: check.unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

pub struct GatewayBuilder {
    config: SwitchboardConfig,
    factory: Arc<dyn ProtocolClientFactory>,
    platform: Option<Arc<dyn HelpdeskPlatform>>,
    webhook: Option<Arc<dyn WebhookSink>>,
}

impl GatewayBuilder {
    pub fn new(config: SwitchboardConfig, factory: Arc<dyn ProtocolClientFactory>) -> Self {
        Self {
            config,
            factory,
            platform: None,
            webhook: None,
        }
    }

    /// Use this platform instead of a Chatwoot client built from `[helpdesk]`.
    pub fn helpdesk_platform(mut self, platform: Arc<dyn HelpdeskPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use this sink instead of a webhook relay built from `[webhook]`.
    pub fn webhook_sink(mut self, sink: Arc<dyn WebhookSink>) -> Self {
        self.webhook = Some(sink);
        self
    }

    pub async fn build(self) -> Result<Gateway, SwitchboardError> {
        let config = self.config;

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let platform = match self.platform {
            Some(platform) => Some(platform),
            None if config.helpdesk.base_url.is_some() => {
                let client: Arc<dyn HelpdeskPlatform> =
                    Arc::new(ChatwootClient::from_config(&config.helpdesk)?);
                Some(client)
            }
            None => None,
        };
        let bridge = platform.as_ref().map(|platform| {
            Arc::new(HelpdeskBridge::new(
                Arc::clone(platform),
                Arc::clone(&storage) as Arc<dyn MappingStore>,
                BridgeSettings::from_config(&config.helpdesk),
            ))
        });

        let (relay, sink) = match self.webhook {
            Some(sink) => (None, Some(sink)),
            None => match WebhookSettings::from_config(&config.webhook)? {
                Some(settings) => {
                    let relay = Arc::new(WebhookRelay::start(settings)?);
                    let sink: Arc<dyn WebhookSink> = Arc::clone(&relay) as Arc<dyn WebhookSink>;
                    (Some(relay), Some(sink))
                }
                None => (None, None),
            },
        };

        let dispatcher = Dispatcher::new(
            sink,
            bridge
                .as_ref()
                .map(|b| Arc::clone(b) as Arc<dyn InboundRelay>),
        );
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&storage) as Arc<dyn SessionStore>,
            self.factory,
            dispatcher,
            SessionSettings::from_config(&config),
        ));
        if let Some(bridge) = &bridge {
            let sender: Arc<dyn ProtocolSender> = Arc::clone(&registry) as Arc<dyn ProtocolSender>;
            bridge.attach_sender(Arc::downgrade(&sender));
        }

        info!(
            gateway = %config.gateway.name,
            helpdesk = bridge.is_some(),
            webhook = relay.is_some(),
            "gateway assembled"
        );

        Ok(Gateway {
            config,
            storage,
            registry,
            bridge,
            platform,
            relay,
        })
    }
}

pub struct Gateway {
    config: SwitchboardConfig,
    storage: Arc<SqliteStorage>,
    registry: Arc<SessionRegistry>,
    bridge: Option<Arc<HelpdeskBridge>>,
    platform: Option<Arc<dyn HelpdeskPlatform>>,
    relay: Option<Arc<WebhookRelay>>,
}

impl Gateway {
    pub fn builder(
        config: SwitchboardConfig,
        factory: Arc<dyn ProtocolClientFactory>,
    ) -> GatewayBuilder {
        GatewayBuilder::new(config, factory)
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<SqliteStorage> {
        &self.storage
    }

    pub fn bridge(&self) -> Option<&Arc<HelpdeskBridge>> {
        self.bridge.as_ref()
    }

    pub fn webhook_relay(&self) -> Option<&Arc<WebhookRelay>> {
        self.relay.as_ref()
    }

    pub async fn create_session(
        &self,
        id: &str,
        proxy: Option<ProxyConfig>,
        helpdesk: Option<HelpdeskSettings>,
    ) -> Result<Arc<SessionHandle>, SwitchboardError> {
        self.registry.create_session(id, proxy, helpdesk).await
    }

    pub async fn connect(&self, id: &str) -> Result<(), SwitchboardError> {
        self.registry.connect(id).await
    }

    pub async fn disconnect(&self, id: &str) -> Result<(), SwitchboardError> {
        self.registry.disconnect(id).await
    }

    pub async fn logout(&self, id: &str) -> Result<(), SwitchboardError> {
        self.registry.logout(id).await
    }

    pub async fn status(&self, id: &str) -> Result<SessionStatus, SwitchboardError> {
        self.registry.status(id).await
    }

    pub async fn pairing_code(&self, id: &str) -> Result<PairingCode, SwitchboardError> {
        self.registry.pairing_code(id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSnapshot>, SwitchboardError> {
        self.registry.list_sessions().await
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), SwitchboardError> {
        self.registry.delete_session(id).await
    }

    pub async fn send_text(
        &self,
        id: &str,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        self.registry.send_text(id, to, text).await
    }

    pub async fn restore_sessions(&self) -> Result<RestoreReport, SwitchboardError> {
        self.registry.restore_sessions().await
    }

    pub async fn mapping_counts(&self, id: &str) -> Result<MappingCounts, SwitchboardError> {
        MappingCounts::load(self.storage.as_ref(), id).await
    }

    /// Bridge settings of a session, from its live handle or durable row.
    async fn helpdesk_settings(
        &self,
        id: &str,
    ) -> Result<Option<HelpdeskSettings>, SwitchboardError> {
        if let Some(handle) = self.registry.get(id) {
            return Ok(handle.helpdesk_settings().await);
        }
        let record = self
            .storage
            .get_session(id)
            .await?
            .ok_or_else(|| SwitchboardError::SessionNotFound(id.to_string()))?;
        Ok(record.helpdesk)
    }

    async fn enabled_bridge(
        &self,
        id: &str,
    ) -> Result<Option<(&Arc<HelpdeskBridge>, HelpdeskSettings)>, SwitchboardError> {
        let Some(bridge) = self.bridge.as_ref() else {
            return Ok(None);
        };
        let settings = self.helpdesk_settings(id).await?.filter(|s| s.enabled);
        Ok(settings.map(|settings| (bridge, settings)))
    }

    /// Route a webhook event posted by the helpdesk platform for session `id`.
    /// Returns `None` when the event needed no protocol send or the session
    /// has no enabled bridge.
    pub async fn handle_helpdesk_event(
        &self,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<Option<OutboundOutcome>, SwitchboardError> {
        let event: PlatformEvent = serde_json::from_value(payload)
            .map_err(|e| SwitchboardError::Validation(format!("malformed helpdesk event: {e}")))?;
        let Some((bridge, settings)) = self.enabled_bridge(id).await? else {
            debug!(session_id = id, "helpdesk event for session without bridge");
            return Ok(None);
        };
        bridge.handle_platform_event(id, &settings, event).await
    }

    /// Re-attempt one batch of pending mappings for session `id`.
    pub async fn process_pending(&self, id: &str) -> Result<SweepReport, SwitchboardError> {
        match self.enabled_bridge(id).await? {
            Some((bridge, settings)) => {
                bridge
                    .process_pending_messages(id, &settings, self.config.helpdesk.sweep_batch_size)
                    .await
            }
            None => Ok(SweepReport::default()),
        }
    }

    /// One pending sweep over every live session. Failures are logged and do
    /// not stop the sweep.
    pub async fn sweep_pending(&self) -> Vec<(String, SweepReport)> {
        let mut reports = Vec::new();
        for handle in self.registry.live_sessions() {
            match self.process_pending(handle.id()).await {
                Ok(report) if report.attempted > 0 => {
                    reports.push((handle.id().to_string(), report));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %handle.id(), error = %e, "pending sweep failed");
                }
            }
        }
        reports
    }

    pub async fn health(&self) -> Vec<AdapterHealth> {
        let mut report = vec![AdapterHealth::from_check(
            self.storage.name(),
            self.storage.health_check().await,
        )];
        if let Some(platform) = &self.platform {
            report.push(AdapterHealth::from_check(
                platform.name(),
                platform.health_check().await,
            ));
        }
        if let Some(relay) = &self.relay {
            report.push(AdapterHealth::from_check(
                relay.name(),
                relay.health_check().await,
            ));
        }
        report
    }

    /// Disconnect every session, drain webhook workers, checkpoint storage.
    pub async fn shutdown(&self) -> Result<(), SwitchboardError> {
        self.registry.shutdown().await;
        if let Some(relay) = &self.relay {
            relay.close().await;
        }
        self.storage.close().await?;
        info!("gateway stopped");
        Ok(())
    }
}
