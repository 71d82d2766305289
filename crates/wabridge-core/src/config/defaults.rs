//! Default value functions used by serde for config deserialization.

pub fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_api_port() -> u16 {
    3000
}

pub fn default_bulk_delay_ms() -> u64 {
    500
}

pub fn default_session_path() -> String {
    "./whatsapp_session".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_logs_dir() -> String {
    "./logs".to_string()
}

pub fn default_messages_dir() -> String {
    "./messages".to_string()
}
