//! Webhook dispatcher: POSTs JSON payloads with bounded, linearly backed-off retries.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use wabridge_core::context::BridgeContext;
use wabridge_store::{EventKind, EventLogger};

/// Retry schedule for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before attempt `k` is `base_delay * (k - 1)`.
    pub base_delay: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before the 1-indexed `attempt`. Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.saturating_sub(1)
    }
}

/// Delivers payloads to webhook URLs and keeps the success/failure counters.
///
/// Retry state is local to each `deliver` call, so concurrent deliveries do
/// not interfere.
pub struct WebhookDispatcher {
    http: reqwest::Client,
    policy: RetryPolicy,
    ctx: Arc<BridgeContext>,
    logger: Arc<EventLogger>,
}

impl WebhookDispatcher {
    pub fn new(ctx: Arc<BridgeContext>, logger: Arc<EventLogger>) -> Self {
        Self::with_policy(ctx, logger, RetryPolicy::default())
    }

    pub fn with_policy(
        ctx: Arc<BridgeContext>,
        logger: Arc<EventLogger>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            policy,
            ctx,
            logger,
        }
    }

    /// POST `payload` to `url`, retrying on any failure.
    ///
    /// Returns whether some attempt got a 2xx. Exactly one of
    /// `webhook_success` / `webhook_failed` is incremented per call.
    pub async fn deliver<T>(&self, url: &str, payload: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let max = self.policy.max_attempts.max(1);
        let mut last_err = String::new();

        for attempt in 1..=max {
            if attempt > 1 {
                let delay = self.policy.delay_before(attempt);
                info!("webhook: waiting {}ms before attempt {attempt}", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            info!("webhook: attempt {attempt}/{max} to {url}");
            match self.post(url, payload).await {
                Ok(status) => {
                    info!("webhook delivered to {url} (status {status})");
                    self.ctx.stats.lock().await.webhook_success += 1;
                    return true;
                }
                Err(e) => {
                    warn!("webhook attempt {attempt}/{max} failed: {e}");
                    last_err = e;
                }
            }
        }

        error!("webhook delivery to {url} failed after {max} attempts");
        self.logger.log(
            EventKind::Error,
            format!("webhook failed: {last_err} after {max} attempts"),
        );
        self.ctx.stats.lock().await.webhook_failed += 1;
        false
    }

    async fn post<T>(&self, url: &str, payload: &T) -> Result<u16, String>
    where
        T: Serialize + ?Sized,
    {
        let resp = self
            .http
            .post(url)
            .json(payload)
            .timeout(self.policy.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(format!("unexpected response status {}", status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            timeout: Duration::from_secs(2),
        }
    }

    fn dispatcher(policy: RetryPolicy) -> (WebhookDispatcher, Arc<BridgeContext>, Arc<EventLogger>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Arc::new(BridgeContext::new(3000, None));
        let logger = Arc::new(EventLogger::new(tmp.path().join("logs")));
        let d = WebhookDispatcher::with_policy(ctx.clone(), logger.clone(), policy);
        (d, ctx, logger, tmp)
    }

    #[test]
    fn test_default_policy_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::body_json(json!({"id": "m1"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (d, ctx, _logger, _tmp) = dispatcher(fast_policy());
        let ok = d
            .deliver(&format!("{}/hook", server.uri()), &json!({"id": "m1"}))
            .await;

        assert!(ok);
        let stats = ctx.stats_snapshot().await;
        assert_eq!(stats.webhook_success, 1);
        assert_eq!(stats.webhook_failed, 0);
    }

    #[tokio::test]
    async fn test_always_failing_target_gets_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let policy = fast_policy();
        let (d, ctx, logger, _tmp) = dispatcher(policy);
        let started = Instant::now();
        let ok = d.deliver(&server.uri(), &json!({"type": "test"})).await;
        let elapsed = started.elapsed();

        assert!(!ok);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        // Waits of 1x and 2x the base delay.
        assert!(elapsed >= policy.delay_before(2) + policy.delay_before(3));

        let stats = ctx.stats_snapshot().await;
        assert_eq!(stats.webhook_failed, 1, "one failure per delivery, not per attempt");
        assert_eq!(stats.webhook_success, 0);

        let errors = logger.recent_errors(10);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_fail_once_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (d, ctx, logger, _tmp) = dispatcher(fast_policy());
        let ok = d.deliver(&server.uri(), &json!({"id": "m2"})).await;

        assert!(ok);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        let stats = ctx.stats_snapshot().await;
        assert_eq!(stats.webhook_success, 1);
        assert_eq!(stats.webhook_failed, 0);
        assert!(logger.recent_errors(10).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_counts_one_failure() {
        // Grab a free port, then close it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (d, ctx, _logger, _tmp) = dispatcher(fast_policy());
        let ok = d
            .deliver(&format!("http://127.0.0.1:{port}/hook"), &json!({}))
            .await;

        assert!(!ok);
        let stats = ctx.stats_snapshot().await;
        assert_eq!(stats.webhook_failed, 1);
        assert_eq!(stats.webhook_success, 0);
    }

    #[tokio::test]
    async fn test_slow_target_times_out_and_retries() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        };
        let (d, ctx, _logger, _tmp) = dispatcher(policy);
        let ok = d.deliver(&server.uri(), &json!({"id": "slow"})).await;

        assert!(!ok);
        assert_eq!(ctx.stats_snapshot().await.webhook_failed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_are_independent() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let (d, ctx, _logger, _tmp) = dispatcher(fast_policy());
        let ok_url = format!("{}/ok", server.uri());
        let down_url = format!("{}/down", server.uri());
        let payload = json!({"id": "c"});
        let (a, b) = tokio::join!(d.deliver(&ok_url, &payload), d.deliver(&down_url, &payload));

        assert!(a);
        assert!(!b);
        let stats = ctx.stats_snapshot().await;
        assert_eq!(stats.webhook_success, 1);
        assert_eq!(stats.webhook_failed, 1);
    }
}
