//! [`MessagingClient`] implementation over the WhatsApp Web protocol.

use crate::events::EventForwarder;
use crate::jid::to_platform_jid;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;
use wabridge_core::{
    config::{shellexpand, WhatsAppConfig},
    error::BridgeError,
    message::ClientEvent,
    traits::MessagingClient,
};
use wacore_binary::jid::Jid;
use whatsapp_rust::bot::Bot;
use whatsapp_rust::client::Client;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

/// WhatsApp Web client.
///
/// Each `initialize` builds a fresh bot over the persisted session; `destroy`
/// stops it. The connected client handle is kept only while connected.
pub struct WhatsAppWebClient {
    config: WhatsAppConfig,
    /// Client handle for sending. Set on `Connected`, cleared on disconnect.
    client: Arc<Mutex<Option<Arc<Client>>>>,
    /// Background task running the current bot.
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppWebClient {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: Arc::new(Mutex::new(None)),
            run_handle: Mutex::new(None),
        }
    }

    /// Session database path, creating its directory.
    fn session_db_path(&self) -> Result<String, BridgeError> {
        let dir = shellexpand(&self.config.session_path);
        std::fs::create_dir_all(&dir).map_err(|e| {
            BridgeError::Client(format!("cannot create session dir {dir}: {e}"))
        })?;
        Ok(format!("{dir}/whatsapp.db"))
    }

    async fn connected_client(&self) -> Result<Arc<Client>, BridgeError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| BridgeError::Client("whatsapp client not connected".into()))
    }
}

#[async_trait]
impl MessagingClient for WhatsAppWebClient {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> Result<(), BridgeError> {
        let db_path = self.session_db_path()?;
        info!(
            "WhatsApp client initializing (session: {db_path}, headless: {})",
            self.config.headless
        );

        let backend = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .map_err(|e| BridgeError::Client(format!("session store init failed: {e}")))?,
        );

        let forwarder = EventForwarder {
            tx: events,
            client_store: self.client.clone(),
            show_qr: !self.config.headless,
        };

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .on_event(move |event, client| {
                let forwarder = forwarder.clone();
                async move {
                    forwarder.forward(event, client).await;
                }
            })
            .build()
            .await
            .map_err(|e| BridgeError::Client(format!("whatsapp bot build failed: {e}")))?;

        let handle = bot
            .run()
            .await
            .map_err(|e| BridgeError::Client(format!("whatsapp bot run failed: {e}")))?;

        if let Some(previous) = self.run_handle.lock().await.replace(handle) {
            previous.abort();
        }

        info!("WhatsApp client started");
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BridgeError> {
        *self.client.lock().await = None;
        if let Some(handle) = self.run_handle.lock().await.take() {
            handle.abort();
        }
        info!("WhatsApp client destroyed");
        Ok(())
    }

    async fn is_registered_user(&self, chat_id: &str) -> Result<bool, BridgeError> {
        let client = self.connected_client().await?;
        let phone = chat_id.split('@').next().unwrap_or(chat_id);

        let results = client
            .contacts()
            .is_on_whatsapp(&[phone])
            .await
            .map_err(|e| BridgeError::Client(format!("registration lookup failed: {e}")))?;

        Ok(results.iter().any(|r| r.is_registered))
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), BridgeError> {
        let client = self.connected_client().await?;

        let jid_str = to_platform_jid(chat_id);
        let jid: Jid = jid_str
            .parse()
            .map_err(|e| BridgeError::Client(format!("invalid whatsapp JID '{jid_str}': {e}")))?;

        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };
        client
            .send_message(jid, msg)
            .await
            .map_err(|e| BridgeError::Client(format!("whatsapp send failed: {e}")))?;

        Ok(())
    }
}
