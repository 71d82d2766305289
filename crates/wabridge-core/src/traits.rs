use crate::{error::BridgeError, message::ClientEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Messaging client trait: the external collaborator.
///
/// The bridge never talks to the platform directly. Lifecycle changes and
/// inbound messages arrive as [`ClientEvent`]s on the sender handed to
/// [`initialize`](MessagingClient::initialize); outgoing traffic goes through
/// the async methods below.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Human-readable client name.
    fn name(&self) -> &str;

    /// Start a fresh client session that reports into `events`.
    ///
    /// Returns once the session has been launched, not once it is ready.
    /// Ready-ness is signalled with [`ClientEvent::Ready`].
    async fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> Result<(), BridgeError>;

    /// Tear down the current session. A later `initialize` starts over.
    async fn destroy(&self) -> Result<(), BridgeError>;

    /// Whether `chat_id` (normalized, e.g. `5511999887766@c.us`) has an account.
    async fn is_registered_user(&self, chat_id: &str) -> Result<bool, BridgeError>;

    /// Send a text message to `chat_id`.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), BridgeError>;
}
