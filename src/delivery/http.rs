use super::retry::RetryPolicy;
use crate::error::SnsError;
use crate::state::{Message, Subscription};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-attempt limit; a subscriber that stalls past it fails the attempt.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// POSTs payloads to HTTP subscribers.
#[derive(Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl HttpDelivery {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn deliver(
        &self,
        subscription: &Subscription,
        message: &Message,
        payload: String,
    ) -> Result<(), SnsError> {
        let raw = subscription.is_raw();
        let result = self
            .retry
            .run(|attempt| {
                debug!(endpoint = %subscription.endpoint, attempt, "posting notification");
                self.post(subscription, message, payload.clone(), raw)
            })
            .await;
        if let Err(err) = &result {
            warn!(
                endpoint = %subscription.endpoint,
                attempts = self.retry.max_attempts(),
                error = %err,
                "dropping http delivery"
            );
        }
        result
    }

    async fn post(
        &self,
        subscription: &Subscription,
        message: &Message,
        payload: String,
        raw: bool,
    ) -> Result<(), SnsError> {
        let failed = |reason: String| SnsError::HttpDelivery {
            endpoint: subscription.endpoint.clone(),
            reason,
        };

        let response = self
            .client
            .post(&subscription.endpoint)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "text/plain; charset=UTF-8")
            .header("x-amz-sns-rawdelivery", raw.to_string())
            .header("x-amz-sns-message-type", "Notification")
            .header("x-amz-sns-message-id", &message.id)
            .header("x-amz-sns-topic-arn", &message.topic_arn)
            .header("x-amz-sns-subscription-arn", &subscription.subscription_arn)
            .body(payload)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(failed(format!("HTTP {}", status)))
        }
    }
}
