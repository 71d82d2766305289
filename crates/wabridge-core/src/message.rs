use serde::{Deserialize, Serialize};

/// A message received from the messaging platform.
///
/// Serialized with camelCase keys: this is both the on-disk archive format
/// and the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Platform message ID.
    pub id: String,
    /// Chat the message arrived in (e.g. `5511999887766@c.us`).
    pub from: String,
    /// Text content (caption for media messages).
    pub body: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Push name of the sender, empty when unknown.
    pub contact_name: String,
    /// Sender phone number, digits only.
    pub contact_number: String,
    pub is_group: bool,
    pub has_media: bool,
}

/// Lifecycle and traffic events emitted by the messaging client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A pairing QR code is available (raw payload, rotates periodically).
    QrCode(String),
    /// Pairing or session restore succeeded.
    Authenticated,
    /// The client is connected and can send.
    Ready,
    /// The connection was lost.
    Disconnected(String),
    /// Authentication was rejected.
    AuthFailure(String),
    /// Platform-level state change (informational).
    StateChanged(String),
    /// An inbound message.
    MessageReceived(MessageRecord),
}

impl ClientEvent {
    /// Short label for tracing.
    pub fn label(&self) -> &'static str {
        match self {
            Self::QrCode(_) => "qr_code",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::Disconnected(_) => "disconnected",
            Self::AuthFailure(_) => "auth_failure",
            Self::StateChanged(_) => "state_changed",
            Self::MessageReceived(_) => "message_received",
        }
    }
}
