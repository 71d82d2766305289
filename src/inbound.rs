//! Inbound message handling: count, archive, forward, log.

use crate::webhook::WebhookDispatcher;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use wabridge_core::{context::BridgeContext, message::MessageRecord};
use wabridge_store::{event_log::preview, EventKind, EventLogger, MessageArchive};

const PREVIEW_CHARS: usize = 50;

pub struct InboundHandler {
    ctx: Arc<BridgeContext>,
    archive: MessageArchive,
    logger: Arc<EventLogger>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl InboundHandler {
    pub fn new(
        ctx: Arc<BridgeContext>,
        archive: MessageArchive,
        logger: Arc<EventLogger>,
        dispatcher: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            ctx,
            archive,
            logger,
            dispatcher,
        }
    }

    /// Process one received message.
    ///
    /// A failed archive write is logged and does not stop forwarding. The
    /// webhook delivery runs on its own task; its handle is returned so
    /// callers may await it, but the event loop never does.
    pub async fn handle(&self, record: MessageRecord) -> Option<JoinHandle<bool>> {
        self.ctx.stats.lock().await.messages_received += 1;

        match self.archive.persist(&record).await {
            Ok(path) => info!("archived message {} to {}", record.id, path.display()),
            Err(e) => {
                error!("failed to archive message {}: {e}", record.id);
                self.logger
                    .log(EventKind::Error, format!("failed to save message: {e}"));
            }
        }

        self.logger.log(
            EventKind::MessageReceived,
            format!(
                "from: {}, msg: {}",
                record.contact_number,
                preview(&record.body, PREVIEW_CHARS)
            ),
        );

        let url = self.ctx.webhook_url().await?;
        let dispatcher = self.dispatcher.clone();
        Some(tokio::spawn(async move {
            dispatcher.deliver(&url, &record).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::RetryPolicy;
    use std::time::Duration;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn record(body: &str) -> MessageRecord {
        MessageRecord {
            id: "3EB0C767D82B".into(),
            from: "5511999887766@c.us".into(),
            body: body.into(),
            timestamp: 1_700_000_000,
            contact_name: "Ana".into(),
            contact_number: "5511999887766".into(),
            is_group: false,
            has_media: false,
        }
    }

    struct Fixture {
        handler: InboundHandler,
        ctx: Arc<BridgeContext>,
        logger: Arc<EventLogger>,
        messages_dir: std::path::PathBuf,
        _tmp: tempfile::TempDir,
    }

    fn fixture(webhook_url: Option<String>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Arc::new(BridgeContext::new(3000, webhook_url));
        let logger = Arc::new(EventLogger::new(tmp.path().join("logs")));
        let messages_dir = tmp.path().join("messages");
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        };
        let dispatcher = Arc::new(WebhookDispatcher::with_policy(
            ctx.clone(),
            logger.clone(),
            policy,
        ));
        let handler = InboundHandler::new(
            ctx.clone(),
            MessageArchive::new(&messages_dir),
            logger.clone(),
            dispatcher,
        );
        Fixture {
            handler,
            ctx,
            logger,
            messages_dir,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn test_message_is_counted_and_archived_without_webhook() {
        let f = fixture(None);
        let handle = f.handler.handle(record("hello")).await;

        assert!(handle.is_none(), "no webhook configured");
        assert_eq!(f.ctx.stats_snapshot().await.messages_received, 1);
        let files: Vec<_> = std::fs::read_dir(&f.messages_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_message_log_line_uses_preview() {
        let f = fixture(None);
        let long = "x".repeat(80);
        f.handler.handle(record(&long)).await;

        let log_dir = f.logger.dir().to_path_buf();
        let entry = std::fs::read_dir(&log_dir).unwrap().next().unwrap().unwrap();
        let content = std::fs::read_to_string(entry.path()).unwrap();
        let expected = format!("from: 5511999887766, msg: {}...", "x".repeat(50));
        assert!(content.contains(&expected), "log was: {content}");
        assert!(content.contains("\"type\":\"message_received\""));
    }

    #[tokio::test]
    async fn test_message_is_forwarded_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_partial_json(serde_json::json!({
                "id": "3EB0C767D82B",
                "contactNumber": "5511999887766",
                "isGroup": false
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(Some(server.uri()));
        let handle = f.handler.handle(record("hi")).await.unwrap();

        assert!(handle.await.unwrap());
        assert_eq!(f.ctx.stats_snapshot().await.webhook_success, 1);
    }

    #[tokio::test]
    async fn test_archive_failure_still_forwards() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let f = fixture(Some(server.uri()));
        // A regular file where the messages directory should be.
        std::fs::write(&f.messages_dir, b"blocked").unwrap();

        let handle = f.handler.handle(record("hi")).await.unwrap();
        assert!(handle.await.unwrap());

        let errors = f.logger.recent_errors(10);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("failed to save message"));
        assert_eq!(f.ctx.stats_snapshot().await.messages_received, 1);
    }
}
