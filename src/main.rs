mod api;
mod inbound;
mod supervisor;
mod webhook;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use wabridge_core::{
    config::{self, Config},
    context::BridgeContext,
    traits::MessagingClient,
};
use wabridge_store::{EventKind, EventLogger, MessageArchive};
use wabridge_whatsapp::WhatsAppWebClient;

#[derive(Parser)]
#[command(
    name = "wabridge",
    version,
    about = "wabridge: HTTP bridge for WhatsApp Web"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "wabridge.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge: WhatsApp client plus HTTP API.
    Start,
    /// Print the resolved configuration and check a running bridge.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut cfg = config::load(&cli.config)?;
    cfg.apply_env(|key| std::env::var(key).ok())?;

    match cli.command {
        Commands::Start => start(cfg).await?,
        Commands::Status => status(&cli.config, &cfg).await,
    }

    Ok(())
}

async fn start(cfg: Config) -> anyhow::Result<()> {
    let logger = Arc::new(EventLogger::new(config::shellexpand(
        &cfg.storage.logs_dir,
    )));
    install_panic_hook(logger.clone());

    let ctx = Arc::new(BridgeContext::new(
        cfg.api.port,
        Some(cfg.webhook.url.clone()),
    ));
    let dispatcher = Arc::new(webhook::WebhookDispatcher::new(
        ctx.clone(),
        logger.clone(),
    ));
    let inbound = inbound::InboundHandler::new(
        ctx.clone(),
        MessageArchive::new(config::shellexpand(&cfg.storage.messages_dir)),
        logger.clone(),
        dispatcher.clone(),
    );

    let client: Arc<dyn MessagingClient> = Arc::new(WhatsAppWebClient::new(cfg.whatsapp.clone()));
    let (supervisor, inbox) = supervisor::Supervisor::new(
        ctx.clone(),
        client.clone(),
        logger.clone(),
        inbound,
        supervisor::ReconnectPolicy::default(),
    );

    println!("wabridge: starting on {}:{}", cfg.api.host, cfg.api.port);
    match ctx.webhook_url().await {
        Some(url) => info!("webhook forwarding to {url}"),
        None => info!("no webhook configured, inbound messages are only archived"),
    }

    tokio::spawn(supervisor.clone().run(inbox));
    supervisor.initialize().await;

    let state = api::ApiState::new(
        ctx,
        client.clone(),
        supervisor,
        dispatcher,
        logger,
        Duration::from_millis(cfg.api.bulk_delay_ms),
    );
    api::serve(&cfg.api.host, cfg.api.port, state, shutdown_signal()).await?;

    info!("shutting down, closing WhatsApp session");
    if let Err(e) = client.destroy().await {
        error!("failed to close WhatsApp session: {e}");
    }
    Ok(())
}

async fn status(config_path: &str, cfg: &Config) {
    println!("wabridge: status check\n");
    println!("Config:        {config_path}");
    println!("Listen:        {}:{}", cfg.api.host, cfg.api.port);
    println!(
        "Webhook:       {}",
        if cfg.webhook.url.is_empty() {
            "not configured"
        } else {
            cfg.webhook.url.as_str()
        }
    );
    println!("Session path:  {}", cfg.whatsapp.session_path);
    println!("Headless:      {}", cfg.whatsapp.headless);
    println!("Logs dir:      {}", cfg.storage.logs_dir);
    println!("Messages dir:  {}", cfg.storage.messages_dir);
    println!();

    let host = match cfg.api.host.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    let url = format!("http://{host}:{}/api/status", cfg.api.port);
    let health = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(3))
        .send()
        .await;

    match health {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(body) => {
                println!("  bridge: running");
                println!("  state:  {}", body["state"].as_str().unwrap_or("unknown"));
                println!("  ready:  {}", body["ready"].as_bool().unwrap_or(false));
                if let Some(err) = body["error"].as_str() {
                    println!("  error:  {err}");
                }
            }
            Err(e) => println!("  bridge: unexpected response from {url}: {e}"),
        },
        Err(_) => println!("  bridge: not running at {url}"),
    }
}

/// Record panics in the event log, then defer to the default hook.
fn install_panic_hook(logger: Arc<EventLogger>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        logger.log(EventKind::UncaughtException, panic_info.to_string());
        default_hook(panic_info);
    }));
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
