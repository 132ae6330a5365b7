use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryOutcome, FailureReason};
use crate::subscriber::Subscriber;

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
fn metric_inc_subscriber(name: &'static str, subscriber: &str) {
    metrics::increment_counter!(name, "subscriber" => subscriber.to_string());
}

#[cfg(not(feature = "metrics"))]
fn metric_inc_subscriber(_name: &'static str, _subscriber: &str) {}

/// Delivery settings shared by every subscriber.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum time allowed for a single POST.
    pub timeout: Duration,
    /// Retry attempts after the initial attempt.
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_base_ms: 500,
            retry_max_ms: 5_000,
            retry_jitter_ms: 100,
        }
    }
}

/// Result of sending one batch to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub subscriber: String,
    pub events: usize,
    /// HTTP attempts made, including the first.
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

/// Posts batches to subscriber endpoints.
///
/// Each call to [`Dispatcher::send`] is self-contained: it owns its retries
/// and never touches state shared with other subscribers' sends.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: DispatcherConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Serialize `payloads` once and POST them, retrying transient failures.
    ///
    /// Client errors other than 429 fail immediately.
    pub async fn send(&self, subscriber: &Subscriber, payloads: &[Value]) -> DeliveryReport {
        let events = payloads.len();
        let body = match serde_json::to_vec(payloads) {
            Ok(body) => body,
            Err(err) => {
                error!(subscriber = %subscriber.name, error = %err, "failed to serialize batch");
                return DeliveryReport {
                    subscriber: subscriber.name.clone(),
                    events,
                    attempts: 0,
                    outcome: DeliveryOutcome::Failed(FailureReason::Serialization),
                };
            }
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            info!(
                subscriber = %subscriber.name,
                url = %subscriber.url,
                events,
                attempt,
                "sending webhook batch"
            );

            match self.deliver(&subscriber.url, body.clone()).await {
                Ok(()) => {
                    metric_inc("webhook.delivery.success");
                    metric_inc_subscriber("webhook.delivery.success.subscriber", &subscriber.name);
                    debug!(subscriber = %subscriber.name, attempt, "webhook batch delivered");
                    return DeliveryReport {
                        subscriber: subscriber.name.clone(),
                        events,
                        attempts: attempt,
                        outcome: DeliveryOutcome::Delivered,
                    };
                }
                Err(reason) if !reason.is_retryable() => {
                    metric_inc("webhook.delivery.failed");
                    error!(
                        subscriber = %subscriber.name,
                        url = %subscriber.url,
                        events,
                        attempt,
                        reason = %reason,
                        "webhook batch rejected, dropping"
                    );
                    return DeliveryReport {
                        subscriber: subscriber.name.clone(),
                        events,
                        attempts: attempt,
                        outcome: DeliveryOutcome::Failed(reason),
                    };
                }
                Err(reason) => {
                    if attempt > self.config.max_retries {
                        metric_inc("webhook.delivery.failed");
                        metric_inc_subscriber("webhook.delivery.failed.subscriber", &subscriber.name);
                        error!(
                            subscriber = %subscriber.name,
                            url = %subscriber.url,
                            events,
                            attempts = attempt,
                            last_error = %reason,
                            "webhook batch dropped after exhausting retries"
                        );
                        return DeliveryReport {
                            subscriber: subscriber.name.clone(),
                            events,
                            attempts: attempt,
                            outcome: DeliveryOutcome::Failed(FailureReason::MaxRetriesExceeded),
                        };
                    }

                    metric_inc("webhook.delivery.retry_scheduled");
                    let delay = retry_delay_for_attempt(attempt, &self.config)
                        + jitter_delay(self.config.retry_jitter_ms);
                    warn!(
                        subscriber = %subscriber.name,
                        url = %subscriber.url,
                        events,
                        attempt,
                        reason = %reason,
                        retry_in_ms = delay.as_millis() as u64,
                        "webhook delivery failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn deliver(&self, url: &str, body: Vec<u8>) -> Result<(), FailureReason> {
        let response = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    Ok(())
                } else if status.as_u16() == 429 || status.is_server_error() {
                    Err(FailureReason::RemoteError(status.as_u16()))
                } else if status.is_client_error() {
                    Err(FailureReason::ClientError(status.as_u16()))
                } else {
                    Err(FailureReason::RemoteError(status.as_u16()))
                }
            }
            Err(err) => {
                if err.is_timeout() {
                    Err(FailureReason::Timeout)
                } else {
                    Err(FailureReason::Network)
                }
            }
        }
    }
}

fn jitter_delay(jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return Duration::from_millis(0);
    }
    Duration::from_millis(fastrand::u64(0..=jitter_ms))
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `retry_max_ms`.
fn retry_delay_for_attempt(attempt: u32, config: &DispatcherConfig) -> Duration {
    let base = config.retry_base_ms.max(1);
    let max = config.retry_max_ms.max(base);
    let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
    let exp = base.saturating_mul(pow);
    Duration::from_millis(exp.min(max))
}
