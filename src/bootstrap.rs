//! Topics and subscriptions created at startup from a JSON file.
//!
//! ```json
//! {
//!   "topics": ["audit"],
//!   "subscriptions": [
//!     {"topic": "orders", "protocol": "sqs", "endpoint": "http://localhost:9324/000000000000/orders"},
//!     {"topic": {"arn": "arn:aws:sns:us-east-1:123456789012:orders"},
//!      "endpoint": "http://localhost:3000/hook", "rawMessageDelivery": true,
//!      "filterPolicy": {"kind": ["created"]}}
//!   ]
//! }
//! ```

use crate::arn;
use crate::codec::SubscriptionAttributes;
use crate::error::SnsError;
use crate::registry::Registry;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootConfig {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub subscriptions: Vec<BootSubscription>,
}

/// A topic given by name, by ARN, or as `{"topicName"}` / `{"arn"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TopicRef {
    Name(String),
    Detailed {
        #[serde(rename = "topicName")]
        topic_name: Option<String>,
        arn: Option<String>,
    },
}

impl TopicRef {
    pub fn topic_name(&self) -> Option<&str> {
        let name = match self {
            TopicRef::Name(name) if name.starts_with("arn:aws:sns") => arn::topic_name_from_arn(name),
            TopicRef::Name(name) => name.as_str(),
            TopicRef::Detailed {
                topic_name: Some(name),
                ..
            } => name.as_str(),
            TopicRef::Detailed { arn: Some(arn), .. } => arn::topic_name_from_arn(arn),
            TopicRef::Detailed { .. } => "",
        };
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootSubscription {
    pub topic: TopicRef,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(alias = "queue")]
    pub endpoint: String,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub raw_message_delivery: Option<Value>,
    #[serde(default)]
    pub filter_policy: Option<Value>,
    #[serde(default)]
    pub filter_policy_scope: Option<String>,
}

impl BootSubscription {
    fn protocol(&self) -> &str {
        self.protocol.as_deref().unwrap_or("sqs")
    }

    fn attributes(&self) -> SubscriptionAttributes {
        let mut attributes = SubscriptionAttributes::new();
        if let Some(raw) = &self.raw_message_delivery {
            let raw = match raw {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            attributes.insert("RawMessageDelivery".to_string(), raw);
        }
        if let Some(policy) = &self.filter_policy {
            attributes.insert("FilterPolicy".to_string(), policy.to_string());
        }
        if let Some(scope) = &self.filter_policy_scope {
            attributes.insert("FilterPolicyScope".to_string(), scope.clone());
        }
        if let Some(queue_name) = &self.queue_name {
            attributes.insert("QueueName".to_string(), queue_name.clone());
        }
        attributes
    }
}

#[derive(Debug, Default)]
pub struct BootReport {
    pub topic_arns: Vec<String>,
    pub subscription_arns: Vec<String>,
    /// Human-readable problems; none of them stop the boot.
    pub problems: Vec<String>,
}

pub fn parse(json: &str) -> Result<BootConfig, SnsError> {
    serde_json::from_str(json).map_err(|e| SnsError::Config(e.to_string()))
}

pub fn load(path: &Path) -> Result<BootConfig, SnsError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| SnsError::Config(format!("{}: {}", path.display(), e)))?;
    parse(&json)
}

pub fn apply(registry: &Registry, config: &BootConfig) -> BootReport {
    let mut report = BootReport::default();

    for name in &config.topics {
        report.topic_arns.push(registry.create_topic(name));
    }

    for subscription in &config.subscriptions {
        let Some(topic_name) = subscription.topic.topic_name() else {
            let problem = format!(
                "Unable to create topic for \"{}\". Please ensure the sns configuration is correct.",
                subscription.endpoint
            );
            warn!("{}", problem);
            report.problems.push(problem);
            continue;
        };

        info!(topic = %topic_name, endpoint = %subscription.endpoint, "creating topic for boot subscription");
        let topic_arn = registry.create_topic(topic_name);
        match registry.subscribe(
            &subscription.endpoint,
            subscription.protocol(),
            &topic_arn,
            subscription.attributes(),
        ) {
            Ok(subscription_arn) => report.subscription_arns.push(subscription_arn),
            Err(err) => {
                let problem = format!(
                    "Unable to subscribe \"{}\" to \"{}\": {}",
                    subscription.endpoint, topic_arn, err
                );
                warn!("{}", problem);
                report.problems.push(problem);
            }
        }
    }
    report
}
