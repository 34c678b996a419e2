use crate::codec::QueueMessageAttribute;
use crate::error::SnsError;
use crate::state::Subscription;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::{Credentials, Region};
use aws_sdk_sqs::primitives::Blob;
use aws_sdk_sqs::types::MessageAttributeValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::{Position, Url};

pub const DEFAULT_SQS_ENDPOINT: &str = "http://localhost:4566";

/// One `SendMessage` call against the queue service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub queue_url: String,
    pub body: String,
    pub attributes: BTreeMap<String, QueueMessageAttribute>,
    pub group_id: Option<String>,
}

/// Client calls made to the queue service.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn resolve_queue_url(
        &self,
        service_endpoint: &str,
        queue_name: &str,
    ) -> Result<String, SnsError>;

    async fn send_message(
        &self,
        service_endpoint: &str,
        message: SendMessage,
    ) -> Result<(), SnsError>;
}

/// Where a queue subscription's messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTarget {
    pub service_endpoint: String,
    /// Used as-is when there is no queue name to resolve.
    pub queue_url: String,
    pub queue_name: Option<String>,
}

impl QueueTarget {
    /// The endpoint is either a queue URL, whose origin (scheme, host and
    /// port as written) names the service, or a queue ARN, whose last
    /// segment names the queue.
    pub fn for_subscription(subscription: &Subscription, endpoint_override: Option<&str>) -> Self {
        let endpoint = subscription.endpoint.as_str();
        let queue_name = subscription.queue_name().map(str::to_owned);

        if endpoint.starts_with("arn:") {
            return Self {
                service_endpoint: endpoint_override.unwrap_or(DEFAULT_SQS_ENDPOINT).to_string(),
                queue_url: endpoint.to_string(),
                queue_name: queue_name.or_else(|| endpoint.rsplit(':').next().map(str::to_owned)),
            };
        }

        let derived = Url::parse(endpoint)
            .ok()
            .filter(Url::has_host)
            .map(|url| url[..Position::BeforePath].to_string())
            .unwrap_or_else(|| DEFAULT_SQS_ENDPOINT.to_string());

        Self {
            service_endpoint: endpoint_override.map(str::to_owned).unwrap_or(derived),
            queue_url: endpoint.to_string(),
            queue_name,
        }
    }
}

/// `QueueService` backed by the AWS SDK, one client per service endpoint.
pub struct SqsQueueService {
    region: String,
    clients: DashMap<String, Arc<Client>>,
}

impl SqsQueueService {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            clients: DashMap::new(),
        }
    }

    async fn client(&self, endpoint_url: &str) -> Arc<Client> {
        if let Some(client) = self.clients.get(endpoint_url) {
            return client.value().clone();
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint_url)
            .region(Region::new(self.region.clone()));
        if std::env::var_os("AWS_ACCESS_KEY_ID").is_none() {
            // Local queue services accept any credentials.
            loader = loader.credentials_provider(Credentials::new(
                "AKID", "SECRET", None, None, "local-sns",
            ));
        }
        let config = loader.load().await;
        let client = Arc::new(Client::new(&config));
        info!(endpoint = %endpoint_url, "created sqs client");
        self.clients.insert(endpoint_url.to_string(), client.clone());
        client
    }
}

fn attribute_value(attribute: &QueueMessageAttribute) -> Result<MessageAttributeValue, SnsError> {
    let mut builder = MessageAttributeValue::builder().data_type(&attribute.data_type);
    if let Some(text) = &attribute.string_value {
        builder = builder.string_value(text);
    }
    if let Some(encoded) = &attribute.binary_value {
        let bytes = match STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    data_type = %attribute.data_type,
                    error = %err,
                    "binary attribute is not base64, sending its text bytes"
                );
                encoded.as_bytes().to_vec()
            }
        };
        builder = builder.binary_value(Blob::new(bytes));
    }
    builder.build().map_err(|e| SnsError::Queue(e.to_string()))
}

#[async_trait]
impl QueueService for SqsQueueService {
    async fn resolve_queue_url(
        &self,
        service_endpoint: &str,
        queue_name: &str,
    ) -> Result<String, SnsError> {
        let client = self.client(service_endpoint).await;
        let output = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| SnsError::Queue(format!("GetQueueUrl {}: {}", queue_name, e)))?;
        output
            .queue_url()
            .map(str::to_owned)
            .ok_or_else(|| SnsError::Queue(format!("queue {} has no url", queue_name)))
    }

    async fn send_message(
        &self,
        service_endpoint: &str,
        message: SendMessage,
    ) -> Result<(), SnsError> {
        let client = self.client(service_endpoint).await;
        let attributes = message
            .attributes
            .iter()
            .map(|(name, attribute)| Ok((name.clone(), attribute_value(attribute)?)))
            .collect::<Result<HashMap<_, _>, SnsError>>()?;

        client
            .send_message()
            .queue_url(&message.queue_url)
            .message_body(message.body)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .set_message_group_id(message.group_id)
            .send()
            .await
            .map_err(|e| SnsError::Queue(format!("SendMessage {}: {}", message.queue_url, e)))?;
        debug!(queue_url = %message.queue_url, "message sent to sqs queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(endpoint: &str, queue_name: Option<&str>) -> Subscription {
        let mut attributes = BTreeMap::new();
        if let Some(name) = queue_name {
            attributes.insert("QueueName".to_string(), name.to_string());
        }
        Subscription {
            subscription_arn: "arn:sub".to_string(),
            topic_arn: "arn:topic".to_string(),
            protocol: "sqs".to_string(),
            endpoint: endpoint.to_string(),
            owner: String::new(),
            attributes,
            filter_policy: None,
        }
    }

    #[test]
    fn queue_url_names_its_service() {
        let target = QueueTarget::for_subscription(
            &subscription("http://localhost:9324/000000000000/orders", None),
            None,
        );
        assert_eq!(target.service_endpoint, "http://localhost:9324");
        assert_eq!(target.queue_url, "http://localhost:9324/000000000000/orders");
        assert!(target.queue_name.is_none());
    }

    #[test]
    fn queue_url_keeps_its_own_origin() {
        let target = QueueTarget::for_subscription(&subscription("http://sqs.local/q", None), None);
        assert_eq!(target.service_endpoint, "http://sqs.local");

        let target = QueueTarget::for_subscription(&subscription("http://sqs.local:80/1/q", None), None);
        assert_eq!(target.service_endpoint, "http://sqs.local");

        let target = QueueTarget::for_subscription(
            &subscription("https://sqs.us-east-1.amazonaws.com/123456789012/q", None),
            None,
        );
        assert_eq!(target.service_endpoint, "https://sqs.us-east-1.amazonaws.com");
    }

    #[test]
    fn unparseable_queue_url_uses_default_endpoint() {
        let target = QueueTarget::for_subscription(&subscription("orders-queue", None), None);
        assert_eq!(target.service_endpoint, DEFAULT_SQS_ENDPOINT);
    }

    #[test]
    fn queue_name_attribute_is_resolved() {
        let target = QueueTarget::for_subscription(
            &subscription("http://localhost:9324", Some("orders")),
            None,
        );
        assert_eq!(target.queue_name.as_deref(), Some("orders"));
    }

    #[test]
    fn queue_arn_uses_configured_endpoint() {
        let sub = subscription("arn:aws:sqs:us-east-1:123456789012:orders", None);
        let target = QueueTarget::for_subscription(&sub, None);
        assert_eq!(target.service_endpoint, DEFAULT_SQS_ENDPOINT);
        assert_eq!(target.queue_name.as_deref(), Some("orders"));

        let target = QueueTarget::for_subscription(&sub, Some("http://elasticmq:9324"));
        assert_eq!(target.service_endpoint, "http://elasticmq:9324");
    }

    #[test]
    fn override_wins_over_url() {
        let target = QueueTarget::for_subscription(
            &subscription("http://localhost:9324/1/orders", None),
            Some("http://other:1"),
        );
        assert_eq!(target.service_endpoint, "http://other:1");
        assert_eq!(target.queue_url, "http://localhost:9324/1/orders");
    }

    #[test]
    fn binary_attributes_are_decoded() {
        let value = attribute_value(&QueueMessageAttribute {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some("aGVsbG8=".to_string()),
        })
        .unwrap();
        assert_eq!(value.binary_value().map(|b| b.as_ref()), Some(&b"hello"[..]));
        assert_eq!(value.data_type(), "Binary");
    }

    #[test]
    fn non_base64_binary_attribute_sends_text_bytes() {
        let value = attribute_value(&QueueMessageAttribute {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some("not base64!".to_string()),
        })
        .unwrap();
        assert_eq!(value.binary_value().map(|b| b.as_ref()), Some(&b"not base64!"[..]));
    }
}
