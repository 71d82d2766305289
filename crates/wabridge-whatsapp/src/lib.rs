//! # wabridge-whatsapp
//!
//! WhatsApp Web client for the bridge, built on `whatsapp-rust`.
//!
//! Pairing is done by scanning a QR code, like WhatsApp Web. The session is
//! persisted to `{session_path}/whatsapp.db` so restarts reconnect without a
//! new scan.

mod client;
mod events;
mod jid;
mod qr;


pub use client::WhatsAppWebClient;
pub use jid::{to_chat_id, to_platform_jid};
pub use qr::generate_qr_terminal;
