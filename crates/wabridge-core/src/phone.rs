//! Phone number normalization for outgoing messages.

/// Chat ID suffix for one-to-one chats.
pub const CHAT_SUFFIX: &str = "@c.us";

/// Normalize a user-supplied phone number into a chat ID.
///
/// Strips every non-digit character and appends [`CHAT_SUFFIX`]. The suffix
/// contains no digits, so an existing suffix is dropped by the filter and
/// normalizing an already-normalized chat ID returns it unchanged.
pub fn normalize(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{digits}{CHAT_SUFFIX}")
}
