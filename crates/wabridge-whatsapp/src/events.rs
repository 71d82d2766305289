//! Translation of `whatsapp-rust` events into bridge [`ClientEvent`]s.

use crate::jid::to_chat_id;
use crate::qr::generate_qr_terminal;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use wabridge_core::message::{ClientEvent, MessageRecord};
use wacore::types::events::Event;
use wacore::types::message::MessageInfo;
use waproto::whatsapp::Message;
use whatsapp_rust::client::Client;

/// Everything the bot's event callback needs, cloned once per event.
#[derive(Clone)]
pub(crate) struct EventForwarder {
    pub(crate) tx: mpsc::Sender<ClientEvent>,
    pub(crate) client_store: Arc<Mutex<Option<Arc<Client>>>>,
    /// Render QR codes on the terminal.
    pub(crate) show_qr: bool,
}

impl EventForwarder {
    /// Handle one library event.
    pub(crate) async fn forward(&self, event: Event, client: Arc<Client>) {
        let translated = match event {
            Event::PairingQrCode { code, .. } => {
                info!("WhatsApp QR code generated (scan to pair)");
                if self.show_qr {
                    match generate_qr_terminal(&code) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(e) => warn!("QR render failed: {e}"),
                    }
                }
                Some(ClientEvent::QrCode(code))
            }
            Event::PairSuccess(_) => {
                info!("WhatsApp pairing successful");
                Some(ClientEvent::Authenticated)
            }
            Event::Connected(_) => {
                info!("WhatsApp connected");
                *self.client_store.lock().await = Some(client);
                Some(ClientEvent::Ready)
            }
            Event::Disconnected(_) => {
                warn!("WhatsApp disconnected");
                *self.client_store.lock().await = None;
                Some(ClientEvent::Disconnected("connection closed".to_string()))
            }
            Event::LoggedOut(_) => {
                warn!("WhatsApp logged out, session invalidated");
                *self.client_store.lock().await = None;
                self.send(ClientEvent::AuthFailure("session logged out".to_string()))
                    .await;
                Some(ClientEvent::Disconnected("logged out".to_string()))
            }
            Event::Message(msg, info) => {
                to_record(&msg, &info).map(ClientEvent::MessageReceived)
            }
            _ => None,
        };

        if let Some(event) = translated {
            self.send(event).await;
        }
    }

    async fn send(&self, event: ClientEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("client event receiver dropped");
        }
    }
}

/// Build the archived/forwarded record for an inbound message.
///
/// Our own outgoing messages (echoed back by the protocol) are skipped.
fn to_record(msg: &Message, info: &MessageInfo) -> Option<MessageRecord> {
    if info.source.is_from_me {
        return None;
    }

    let inner = unwrap_message(msg);

    Some(MessageRecord {
        id: info.id.clone(),
        from: to_chat_id(&info.source.chat.to_string()),
        body: message_body(inner),
        timestamp: chrono::Utc::now().timestamp(),
        contact_name: info.push_name.clone(),
        contact_number: info.source.sender.user.clone(),
        is_group: info.source.is_group,
        has_media: has_media(inner),
    })
}

/// Unwrap nested wrappers (device_sent, ephemeral, view_once).
pub(crate) fn unwrap_message(msg: &Message) -> &Message {
    msg.device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg)
}

/// Text of a message: plain or extended text, else a media caption.
pub(crate) fn message_body(msg: &Message) -> String {
    msg.conversation
        .as_deref()
        .or_else(|| {
            msg.extended_text_message
                .as_ref()
                .and_then(|e| e.text.as_deref())
        })
        .or_else(|| msg.image_message.as_ref().and_then(|i| i.caption.as_deref()))
        .or_else(|| msg.video_message.as_ref().and_then(|v| v.caption.as_deref()))
        .unwrap_or("")
        .to_string()
}

pub(crate) fn has_media(msg: &Message) -> bool {
    msg.image_message.is_some()
        || msg.video_message.is_some()
        || msg.audio_message.is_some()
        || msg.document_message.is_some()
        || msg.sticker_message.is_some()
}
