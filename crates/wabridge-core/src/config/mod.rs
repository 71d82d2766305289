mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BridgeError;
use defaults::*;

/// Top-level bridge configuration.
///
/// Seeded from an optional TOML file, then overridden by environment
/// variables (see [`Config::apply_env`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Pause after each successful send in a bulk request.
    #[serde(default = "default_bulk_delay_ms")]
    pub bulk_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            bulk_delay_ms: default_bulk_delay_ms(),
        }
    }
}

/// WhatsApp client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Directory holding the persisted session.
    #[serde(default = "default_session_path")]
    pub session_path: String,
    /// When false, pairing QR codes are also rendered on the terminal.
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            session_path: default_session_path(),
            headless: true,
        }
    }
}

/// Webhook forwarding configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Initial webhook URL. Empty = forwarding disabled until set via the API.
    #[serde(default)]
    pub url: String,
}

/// On-disk artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default = "default_messages_dir")]
    pub messages_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            messages_dir: default_messages_dir(),
        }
    }
}

impl Config {
    /// Override fields from environment-style variables.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    /// Recognized: `HOST`, `PORT`, `WEBHOOK_URL`, `SESSION_PATH`, `HEADLESS`,
    /// `LOGS_DIR`, `MESSAGES_DIR`, `BULK_DELAY_MS`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.api.port = port
                .trim()
                .parse()
                .map_err(|e| BridgeError::Config(format!("invalid PORT '{port}': {e}")))?;
        }
        if let Some(delay) = lookup("BULK_DELAY_MS") {
            self.api.bulk_delay_ms = delay.trim().parse().map_err(|e| {
                BridgeError::Config(format!("invalid BULK_DELAY_MS '{delay}': {e}"))
            })?;
        }
        if let Some(url) = lookup("WEBHOOK_URL") {
            self.webhook.url = url;
        }
        if let Some(path) = lookup("SESSION_PATH") {
            self.whatsapp.session_path = path;
        }
        // Anything but a literal "false" keeps headless mode on.
        if let Some(headless) = lookup("HEADLESS") {
            self.whatsapp.headless = headless != "false";
        }
        if let Some(dir) = lookup("LOGS_DIR") {
            self.storage.logs_dir = dir;
        }
        if let Some(dir) = lookup("MESSAGES_DIR") {
            self.storage.messages_dir = dir;
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, BridgeError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| BridgeError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
