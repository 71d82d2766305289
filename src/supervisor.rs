//! Connection supervisor: drains client events and drives bounded reconnection.
//!
//! All client lifecycle events flow through one `mpsc` channel. Timed steps of
//! a reconnection (the reconnect delay, teardown, the settle delay) run on
//! spawned tasks that report back on an internal command channel, so every
//! state transition is applied by the single run loop or under the status lock.

use crate::inbound::InboundHandler;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wabridge_core::{
    context::{BridgeContext, ConnectionState},
    error::BridgeError,
    message::ClientEvent,
    traits::MessagingClient,
};
use wabridge_store::{EventKind, EventLogger};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Bounds and timings of automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Wait between a disconnect and tearing the client down.
    pub reconnect_delay: Duration,
    /// Wait between teardown and re-initialization.
    pub settle_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Outcomes of spawned lifecycle tasks.
#[derive(Debug)]
enum Command {
    InitFailed(String),
    TeardownDone,
    TeardownFailed(String),
    RetryReconnect,
}

/// Receiving halves consumed by [`Supervisor::run`].
pub struct SupervisorInbox {
    events: mpsc::Receiver<ClientEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
}

pub struct Supervisor {
    ctx: Arc<BridgeContext>,
    client: Arc<dyn MessagingClient>,
    logger: Arc<EventLogger>,
    inbound: InboundHandler,
    policy: ReconnectPolicy,
    events_tx: mpsc::Sender<ClientEvent>,
    commands_tx: mpsc::UnboundedSender<Command>,
}

impl Supervisor {
    pub fn new(
        ctx: Arc<BridgeContext>,
        client: Arc<dyn MessagingClient>,
        logger: Arc<EventLogger>,
        inbound: InboundHandler,
        policy: ReconnectPolicy,
    ) -> (Arc<Self>, SupervisorInbox) {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Self {
            ctx,
            client,
            logger,
            inbound,
            policy,
            events_tx,
            commands_tx,
        });
        (supervisor, SupervisorInbox { events, commands })
    }

    /// Process client events and lifecycle commands until both channels close.
    pub async fn run(self: Arc<Self>, inbox: SupervisorInbox) {
        let SupervisorInbox {
            mut events,
            mut commands,
        } = inbox;

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(command) = commands.recv() => self.handle_command(command).await,
                else => break,
            }
        }
        info!("supervisor: event channels closed, stopping");
    }

    /// Launch the messaging client (`Disconnected -> Connecting`).
    ///
    /// The launch itself runs on a spawned task; a failure comes back
    /// through the run loop.
    pub async fn initialize(&self) {
        {
            let mut status = self.ctx.status.write().await;
            status.state = ConnectionState::Connecting;
            status.is_ready = false;
        }
        info!("supervisor: initializing {} client", self.client.name());

        let client = self.client.clone();
        let events = self.events_tx.clone();
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = client.initialize(events).await {
                let _ = commands.send(Command::InitFailed(e.to_string()));
            }
        });
    }

    pub async fn handle_event(&self, event: ClientEvent) {
        debug!("supervisor: event {}", event.label());
        match event {
            ClientEvent::QrCode(code) => {
                let mut status = self.ctx.status.write().await;
                status.qr_code = Some(code);
                status.last_error = None;
                info!("QR code received, scan it to authenticate");
            }
            ClientEvent::Authenticated => {
                {
                    let mut status = self.ctx.status.write().await;
                    status.qr_code = None;
                    status.last_error = None;
                }
                self.ctx.stats.lock().await.reconnect_attempts = 0;
                info!("client authenticated");
            }
            ClientEvent::Ready => {
                {
                    let mut status = self.ctx.status.write().await;
                    status.state = ConnectionState::Ready;
                    status.is_ready = true;
                    status.qr_code = None;
                    status.last_error = None;
                }
                self.ctx.stats.lock().await.reconnect_attempts = 0;
                info!("client ready");
                self.logger.log(EventKind::Ready, "client connected and ready");
            }
            ClientEvent::Disconnected(reason) => self.on_disconnected(reason).await,
            ClientEvent::AuthFailure(reason) => {
                self.ctx.status.write().await.last_error =
                    Some(format!("authentication failure: {reason}"));
                error!("authentication failure: {reason}");
                self.logger.log(
                    EventKind::AuthFailure,
                    format!("authentication failure: {reason}"),
                );
            }
            ClientEvent::StateChanged(state) => {
                info!("client state changed: {state}");
                self.logger
                    .log(EventKind::StateChange, format!("state changed to: {state}"));
            }
            ClientEvent::MessageReceived(record) => {
                // Delivery runs detached; the loop does not wait for it.
                let _ = self.inbound.handle(record).await;
            }
        }
    }

    async fn on_disconnected(&self, reason: String) {
        let reconnecting = {
            let mut status = self.ctx.status.write().await;
            status.is_ready = false;
            status.last_error = Some(reason.clone());
            if !status.reconnecting {
                status.state = ConnectionState::Disconnected;
            }
            status.reconnecting
        };
        warn!("client disconnected: {reason}");
        self.logger
            .log(EventKind::Disconnected, format!("client disconnected: {reason}"));

        if reconnecting {
            debug!("supervisor: reconnection already running");
            return;
        }
        self.reconnect_or_give_up().await;
    }

    /// Schedule a reconnection while attempts remain, else fail permanently.
    async fn reconnect_or_give_up(&self) {
        let attempts = self.ctx.stats.lock().await.reconnect_attempts;
        if attempts < self.policy.max_attempts {
            self.request_reconnect().await;
        } else {
            self.give_up().await;
        }
    }

    /// Enter `FailedPermanently`; only an explicit reconnect leaves it.
    async fn give_up(&self) {
        {
            let mut status = self.ctx.status.write().await;
            status.state = ConnectionState::FailedPermanently;
            status.is_ready = false;
        }
        error!(
            "maximum reconnect attempts exceeded ({}), giving up",
            self.policy.max_attempts
        );
        self.logger
            .log(EventKind::Error, "maximum reconnect attempts exceeded");
    }

    /// Start a reconnection sequence unless one is already running.
    ///
    /// The `reconnecting` flag is checked and set under the same write lock.
    /// Returns whether a sequence was started.
    pub async fn request_reconnect(&self) -> bool {
        let attempt = {
            let mut status = self.ctx.status.write().await;
            if status.reconnecting {
                debug!("supervisor: reconnect requested while reconnecting, ignored");
                return false;
            }
            status.reconnecting = true;
            status.is_ready = false;
            status.state = ConnectionState::Reconnecting;

            let mut stats = self.ctx.stats.lock().await;
            stats.reconnect_attempts += 1;
            stats.last_reconnect = Some(Utc::now());
            stats.reconnect_attempts
        };

        let max = self.policy.max_attempts;
        info!("reconnect attempt {attempt} of {max}");
        self.logger.log(
            EventKind::ReconnectAttempt,
            format!("reconnect attempt {attempt} of {max}"),
        );

        let client = self.client.clone();
        let commands = self.commands_tx.clone();
        let policy = self.policy;
        tokio::spawn(async move {
            tokio::time::sleep(policy.reconnect_delay).await;
            match client.destroy().await {
                Ok(()) => {
                    tokio::time::sleep(policy.settle_delay).await;
                    let _ = commands.send(Command::TeardownDone);
                }
                Err(e) => {
                    let _ = commands.send(Command::TeardownFailed(e.to_string()));
                }
            }
        });
        true
    }

    /// Explicit reconnect: zero the attempt counter and start a new sequence.
    pub async fn reset_and_reconnect(&self) -> Result<(), BridgeError> {
        if self.commands_tx.is_closed() {
            return Err(BridgeError::Client("supervisor is not running".into()));
        }
        {
            // Same lock order as `request_reconnect`: status, then stats.
            let status = self.ctx.status.read().await;
            if status.reconnecting {
                return Err(BridgeError::AlreadyReconnecting);
            }
            self.ctx.stats.lock().await.reconnect_attempts = 0;
        }
        info!("manual reconnect requested");
        if self.request_reconnect().await {
            Ok(())
        } else {
            Err(BridgeError::AlreadyReconnecting)
        }
    }

    async fn handle_command(&self, command: Command) {
        match command {
            Command::InitFailed(e) => {
                {
                    let mut status = self.ctx.status.write().await;
                    status.is_ready = false;
                    status.state = ConnectionState::Disconnected;
                    status.last_error = Some(format!("initialization error: {e}"));
                }
                error!("client initialization failed: {e}");
                self.logger
                    .log(EventKind::Error, format!("initialization error: {e}"));
                self.reconnect_or_give_up().await;
            }
            Command::TeardownDone => {
                self.ctx.status.write().await.reconnecting = false;
                self.initialize().await;
            }
            Command::TeardownFailed(e) => {
                {
                    let mut status = self.ctx.status.write().await;
                    status.reconnecting = false;
                    status.state = ConnectionState::Disconnected;
                }
                error!("reconnection failed during teardown: {e}");
                self.logger
                    .log(EventKind::Error, format!("reconnection error: {e}"));

                let attempts = self.ctx.stats.lock().await.reconnect_attempts;
                if attempts < self.policy.max_attempts {
                    let commands = self.commands_tx.clone();
                    let delay = self.policy.reconnect_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = commands.send(Command::RetryReconnect);
                    });
                } else {
                    self.give_up().await;
                }
            }
            Command::RetryReconnect => {
                self.request_reconnect().await;
            }
        }
    }
}
