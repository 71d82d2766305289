//! Conversion between bridge chat IDs (`@c.us`) and protocol JIDs
//! (`@s.whatsapp.net`).

use wabridge_core::phone::CHAT_SUFFIX;

const USER_SERVER: &str = "@s.whatsapp.net";

/// Map a bridge chat ID onto the protocol JID form. Group and other JIDs
/// pass through unchanged.
pub fn to_platform_jid(chat_id: &str) -> String {
    match chat_id.strip_suffix(CHAT_SUFFIX) {
        Some(user) => format!("{user}{USER_SERVER}"),
        None => chat_id.to_string(),
    }
}

/// Map a protocol JID onto the bridge chat ID form.
pub fn to_chat_id(jid: &str) -> String {
    match jid.strip_suffix(USER_SERVER) {
        Some(user) => format!("{user}{CHAT_SUFFIX}"),
        None => jid.to_string(),
    }
}
