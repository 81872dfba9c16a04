//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::config::{ConfigError, ServerConfig};
use crate::core::negotiation::NegotiationConfig;
use crate::core::openai::{OpenAIClient, SessionSettings};
use crate::core::realtime::ReconnectionConfig;
use crate::telephony::{BridgeConfig, OpenAIProviderFactory, TwilioClient};

/// Why a WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// State shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    http: reqwest::Client,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, usize>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("address", &self.config.address())
            .field("ws_connections", &self.ws_connection_count())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build tuned HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Arc::new(Self {
            config,
            http,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    pub fn openai(&self) -> Result<OpenAIClient, ConfigError> {
        let key = self.config.openai_key()?;
        Ok(OpenAIClient::new(
            self.http.clone(),
            key,
            self.config.openai_api_base_url.clone(),
        ))
    }

    pub fn twilio(&self) -> Result<TwilioClient, ConfigError> {
        let creds = self.config.twilio_credentials()?;
        Ok(TwilioClient::new(
            self.http.clone(),
            creds.account_sid,
            creds.auth_token,
            self.config.twilio_api_base_url.clone(),
        ))
    }

    /// Session settings used for phone calls.
    pub fn telephony_settings(&self) -> SessionSettings {
        SessionSettings::for_telephony(
            self.config.realtime_model.clone(),
            self.config.realtime_voice.clone(),
        )
    }

    pub fn provider_factory(&self) -> Result<OpenAIProviderFactory, ConfigError> {
        Ok(OpenAIProviderFactory::new(
            self.openai()?,
            self.telephony_settings(),
            self.config.openai_realtime_url.clone(),
            ReconnectionConfig::with_max_attempts(self.config.max_provider_reconnects),
        ))
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            keepalive_interval: Duration::from_secs(self.config.keepalive_interval_seconds.max(1)),
        }
    }

    /// Handshake parameters for peers negotiating through [`crate::core::negotiate`].
    pub fn negotiation_config(&self) -> Result<NegotiationConfig, ConfigError> {
        Ok(NegotiationConfig {
            sdp: self.openai()?.sdp_exchange(),
            ice_gathering_timeout: Duration::from_secs(self.config.ice_gathering_timeout_seconds),
        })
    }

    // =========================================================================
    // WebSocket connection limits
    // =========================================================================

    /// Reserve a WebSocket slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            let reserved = self
                .ws_connections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    (current < max).then_some(current + 1)
                });
            if reserved.is_err() {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.ws_connections.fetch_add(1, Ordering::SeqCst);
        }

        let per_ip_limit = self.config.max_connections_per_ip as usize;
        let mut entry = self.ip_connections.entry(ip).or_insert(0);
        if *entry >= per_ip_limit {
            drop(entry);
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *entry += 1;
        Ok(())
    }

    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1));

        if let Some(mut entry) = self.ip_connections.get_mut(&ip) {
            *entry = entry.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, count| *count == 0);
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}

/// Holds a connection slot and releases it on drop.
pub struct ConnectionGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionGuard {
    /// Wrap a slot already reserved with [`AppState::try_acquire_connection`].
    pub fn new(state: Arc<AppState>, ip: IpAddr) -> Self {
        Self { state, ip }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
        tracing::debug!(ip = %self.ip, "Released WebSocket connection slot");
    }
}
