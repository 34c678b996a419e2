use crate::codec::{FilterPolicy, MessageAttributes, SubscriptionAttributes};
use crate::config::Config;
use crate::delivery::Dispatcher;
use crate::delivery::sqs::SqsQueueService;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use std::sync::Arc;

// 1. Core Data Structures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscription_arn: String,
    pub topic_arn: String,
    pub protocol: String,
    pub endpoint: String,
    pub owner: String,
    pub attributes: SubscriptionAttributes,
    pub filter_policy: Option<FilterPolicy>,
}

impl Subscription {
    pub fn is_raw(&self) -> bool {
        self.attributes
            .get("RawMessageDelivery")
            .is_some_and(|value| value == "true")
    }

    pub fn queue_name(&self) -> Option<&str> {
        self.attributes.get("QueueName").map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub topic_arn: String,
    pub subject: Option<String>,
    pub body: String,
    pub structure: Option<String>,
    pub attributes: MessageAttributes,
    pub group_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_json_structure(&self) -> bool {
        self.structure.as_deref() == Some("json")
    }

    /// Body handed to a subscriber of `protocol`.
    ///
    /// With `MessageStructure=json` the body is a map of per-protocol
    /// messages and the protocol key wins over `default`.
    pub fn body_for(&self, protocol: &str) -> String {
        if !self.is_json_structure() {
            return self.body.clone();
        }
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&self.body) else {
            return self.body.clone();
        };
        map.get(protocol)
            .or_else(|| map.get("default"))
            .and_then(|value| value.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| self.body.clone())
    }
}

// 2. Shared application state
pub struct AppState {
    pub registry: Arc<Registry>,
    pub dispatcher: Dispatcher,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(registry: Arc<Registry>, dispatcher: Dispatcher) -> SharedState {
        Arc::new(Self {
            registry,
            dispatcher,
        })
    }

    pub fn from_config(config: &Config) -> SharedState {
        let registry = Arc::new(Registry::new(&config.region, &config.account_id));
        let queues = Arc::new(SqsQueueService::new(&config.region));
        let dispatcher = Dispatcher::new(registry.clone(), queues, config.retry_policy())
            .with_sqs_endpoint(config.sqs_endpoint.clone())
            .with_http_timeout(config.http_timeout());
        Self::new(registry, dispatcher)
    }
}
