//! Shared runtime state of the bridge.
//!
//! One [`BridgeContext`] is built at startup and handed out as an `Arc` to
//! the supervisor, the webhook dispatcher, and the HTTP handlers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Connection lifecycle state of the messaging client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    FailedPermanently,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::FailedPermanently => "failed_permanently",
        }
    }
}

/// Observable client status, written only by the connection supervisor.
#[derive(Debug, Default, Clone)]
pub struct ClientStatus {
    pub state: ConnectionState,
    pub is_ready: bool,
    /// Latest pairing QR payload, cleared once authenticated.
    pub qr_code: Option<String>,
    pub last_error: Option<String>,
    /// Set while a reconnection sequence is running.
    pub reconnecting: bool,
}

/// Process-wide counters.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub reconnect_attempts: u32,
    pub last_reconnect: Option<DateTime<Utc>>,
    pub webhook_success: u64,
    pub webhook_failed: u64,
}

impl Stats {
    /// Webhook success rate as `"NN.NN%"`, or `"N/A"` before any delivery.
    pub fn webhook_success_rate(&self) -> String {
        let total = self.webhook_success + self.webhook_failed;
        if total == 0 {
            return "N/A".to_string();
        }
        let rate = self.webhook_success as f64 / total as f64 * 100.0;
        format!("{rate:.2}%")
    }
}

/// Shared state for all bridge components.
pub struct BridgeContext {
    pub status: RwLock<ClientStatus>,
    pub stats: Mutex<Stats>,
    webhook_url: RwLock<Option<String>>,
    /// Port the HTTP API listens on (reported by `/api/health`).
    pub port: u16,
    pub started: Instant,
}

impl BridgeContext {
    pub fn new(port: u16, webhook_url: Option<String>) -> Self {
        Self {
            status: RwLock::new(ClientStatus::default()),
            stats: Mutex::new(Stats::default()),
            webhook_url: RwLock::new(webhook_url.filter(|u| !u.is_empty())),
            port,
            started: Instant::now(),
        }
    }

    /// Whether the messaging client can send right now.
    pub async fn is_ready(&self) -> bool {
        self.status.read().await.is_ready
    }

    /// Snapshot of the client status.
    pub async fn status_snapshot(&self) -> ClientStatus {
        self.status.read().await.clone()
    }

    /// Snapshot of the counters.
    pub async fn stats_snapshot(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Currently active webhook URL, if any.
    pub async fn webhook_url(&self) -> Option<String> {
        self.webhook_url.read().await.clone()
    }

    /// Replace the active webhook URL.
    pub async fn set_webhook_url(&self, url: &str) {
        *self.webhook_url.write().await = Some(url.to_string());
    }

    /// Seconds since the context was created.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
