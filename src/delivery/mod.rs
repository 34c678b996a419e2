//! Fan-out of published messages to subscribers.
//!
//! `Dispatcher::publish` returns the message id as soon as the message is
//! validated; delivery runs on a spawned task, one concurrent delivery per
//! matching subscription. A subscriber's failure is logged and never
//! reaches the publisher or the other subscribers.

pub mod http;
pub mod retry;
pub mod sqs;

use crate::arn;
use crate::codec::{self, BatchEntry, MessageAttributes, Params};
use crate::envelope;
use crate::error::SnsError;
use crate::filter;
use crate::registry::Registry;
use crate::responses::{BatchFailure, BatchResult, BatchSuccess};
use crate::state::{Message, Subscription};
use chrono::Utc;
use self::http::HttpDelivery;
use self::retry::RetryPolicy;
use self::sqs::{QueueService, QueueTarget, SendMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A publish call as decoded from the wire.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub target_arn: String,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub structure: Option<String>,
    pub attributes: MessageAttributes,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Sqs,
    Unsupported(String),
}

impl Protocol {
    /// `lambda` endpoints are local handlers reached over HTTP.
    pub fn parse(protocol: &str) -> Self {
        match protocol.to_ascii_lowercase().as_str() {
            "" | "http" | "https" | "lambda" => Protocol::Http,
            "sqs" => Protocol::Sqs,
            other => Protocol::Unsupported(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Filtered,
    Failed(SnsError),
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub subscription_arn: String,
    pub endpoint: String,
    pub outcome: DeliveryOutcome,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    http: HttpDelivery,
    queues: Arc<dyn QueueService>,
    sqs_endpoint: Option<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, queues: Arc<dyn QueueService>, retry: RetryPolicy) -> Self {
        Self {
            registry,
            http: HttpDelivery::new(reqwest::Client::new(), retry),
            queues,
            sqs_endpoint: None,
        }
    }

    pub fn with_sqs_endpoint(mut self, sqs_endpoint: Option<String>) -> Self {
        self.sqs_endpoint = sqs_endpoint;
        self
    }

    /// Limits each HTTP delivery attempt.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Picks the publish target: a phone number when present, otherwise
    /// the topic or target ARN with pseudo parameters resolved.
    pub fn extract_target(&self, params: &Params) -> Result<String, SnsError> {
        let present = |key: &str| params.get(key).filter(|value| !value.is_empty());

        if let Some(phone_number) = present("PhoneNumber") {
            return arn::validate_phone_number(phone_number).map(str::to_owned);
        }
        present("TopicArn")
            .or_else(|| present("TargetArn"))
            .map(|target| self.registry.resolve_arn(target))
            .ok_or(SnsError::MissingParameter("TopicArn or TargetArn"))
    }

    /// Validates the request and builds the transient message.
    pub fn prepare(&self, request: PublishRequest) -> Result<Message, SnsError> {
        let body = request.message.ok_or(SnsError::MissingParameter("Message"))?;
        if request.structure.as_deref() == Some("json") {
            validate_json_structure(&body)?;
        }
        Ok(Message {
            id: envelope::message_id(),
            topic_arn: self.registry.resolve_arn(&request.target_arn),
            subject: request.subject,
            body,
            structure: request.structure,
            attributes: request.attributes,
            group_id: request.group_id,
            timestamp: Utc::now(),
        })
    }

    /// Returns the message id immediately; delivery happens in the
    /// background.
    pub fn publish(&self, request: PublishRequest) -> Result<String, SnsError> {
        let message = self.prepare(request)?;
        let message_id = message.id.clone();
        info!(message_id = %message_id, topic_arn = %message.topic_arn, "published");

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.fan_out(message).await;
        });
        Ok(message_id)
    }

    pub fn publish_batch(&self, topic_arn: &str, entries: Vec<BatchEntry>) -> BatchResult {
        let mut result = BatchResult::default();
        for entry in entries {
            let id = entry.id.clone();
            let request = PublishRequest {
                target_arn: topic_arn.to_string(),
                subject: entry.subject,
                message: entry.message,
                structure: entry.structure,
                attributes: entry.attributes,
                group_id: entry.group_id,
            };
            match self.publish(request) {
                Ok(message_id) => result.successful.push(BatchSuccess { id, message_id }),
                Err(err) => {
                    warn!(entry = %id, error = %err, "batch entry failed");
                    result.failed.push(BatchFailure {
                        id,
                        code: err.code().to_string(),
                        sender_fault: err.is_sender_fault(),
                        message: err.to_string(),
                    });
                }
            }
        }
        result
    }

    /// Delivers `message` to every subscription of its topic and waits
    /// for all deliveries to settle.
    pub async fn fan_out(&self, message: Message) -> Vec<DeliveryReport> {
        let message = Arc::new(message);
        let mut deliveries = JoinSet::new();
        for subscription in self.registry.subscriptions_for(&message.topic_arn) {
            let dispatcher = self.clone();
            let message = message.clone();
            deliveries.spawn(async move {
                let outcome = match dispatcher.deliver(&subscription, &message).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(
                            subscription_arn = %subscription.subscription_arn,
                            error = %err,
                            "delivery failed"
                        );
                        DeliveryOutcome::Failed(err)
                    }
                };
                DeliveryReport {
                    subscription_arn: subscription.subscription_arn,
                    endpoint: subscription.endpoint,
                    outcome,
                }
            });
        }

        let mut reports = Vec::with_capacity(deliveries.len());
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => error!(error = %err, "delivery task aborted"),
            }
        }
        reports
    }

    async fn deliver(
        &self,
        subscription: &Subscription,
        message: &Message,
    ) -> Result<DeliveryOutcome, SnsError> {
        if let Some(policy) = &subscription.filter_policy {
            if !filter::evaluate(policy, &message.attributes, &message.body) {
                debug!(endpoint = %subscription.endpoint, "filter policy failed, skipping subscription");
                return Ok(DeliveryOutcome::Filtered);
            }
        }

        let payload = envelope::payload(message, subscription)
            .map_err(|e| SnsError::InvalidParameter(e.to_string()))?;
        debug!(endpoint = %subscription.endpoint, payload = %payload, "delivering");

        match Protocol::parse(&subscription.protocol) {
            Protocol::Http => self.http.deliver(subscription, message, payload).await?,
            Protocol::Sqs => self.deliver_to_queue(subscription, message, payload).await?,
            Protocol::Unsupported(protocol) => return Err(SnsError::UnsupportedProtocol(protocol)),
        }
        Ok(DeliveryOutcome::Delivered)
    }

    async fn deliver_to_queue(
        &self,
        subscription: &Subscription,
        message: &Message,
        payload: String,
    ) -> Result<(), SnsError> {
        let target = QueueTarget::for_subscription(subscription, self.sqs_endpoint.as_deref());
        let queue_url = match &target.queue_name {
            Some(queue_name) => {
                self.queues
                    .resolve_queue_url(&target.service_endpoint, queue_name)
                    .await?
            }
            None => target.queue_url.clone(),
        };

        self.queues
            .send_message(
                &target.service_endpoint,
                SendMessage {
                    queue_url,
                    body: payload,
                    attributes: codec::encode_queue_attributes(&message.attributes),
                    group_id: message.group_id.clone(),
                },
            )
            .await
    }
}

fn validate_json_structure(body: &str) -> Result<(), SnsError> {
    let parsed: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        SnsError::InvalidParameter(format!("Message Structure - JSON message body failed to parse: {}", e))
    })?;
    match parsed.get("default") {
        Some(serde_json::Value::String(_)) => Ok(()),
        _ => Err(SnsError::InvalidParameter(
            "Message Structure - No default entry in JSON message body".to_string(),
        )),
    }
}
