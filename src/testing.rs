//! In-memory messaging client for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use wabridge_core::{error::BridgeError, message::ClientEvent, traits::MessagingClient};

pub struct MockClient {
    pub init_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    pub fail_init: AtomicBool,
    pub fail_destroy: AtomicBool,
    pub fail_send: AtomicBool,
    pub registered: AtomicBool,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            init_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            fail_init: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            registered: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self, _events: mpsc::Sender<ClientEvent>) -> Result<(), BridgeError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(BridgeError::Client("browser failed to launch".into()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BridgeError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(BridgeError::Client("session already closed".into()));
        }
        Ok(())
    }

    async fn is_registered_user(&self, _chat_id: &str) -> Result<bool, BridgeError> {
        Ok(self.registered.load(Ordering::SeqCst))
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), BridgeError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(BridgeError::Client("send timed out".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}
