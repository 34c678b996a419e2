//! In-memory topic and subscription store.

use crate::arn;
use crate::codec::{self, SubscriptionAttributes};
use crate::error::SnsError;
use crate::state::{Subscription, Topic};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

pub struct Registry {
    region: String,
    account_id: String,
    topics: RwLock<Vec<Topic>>,
    subscriptions: RwLock<Vec<Subscription>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub fn new(region: &str, account_id: &str) -> Self {
        Self {
            region: region.to_string(),
            account_id: account_id.to_string(),
            topics: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn resolve_arn(&self, arn: &str) -> String {
        arn::resolve_pseudo_parameters(arn, &self.account_id)
    }

    /// Creates the topic unless one with the same ARN exists and returns
    /// the ARN either way.
    pub fn create_topic(&self, name: &str) -> String {
        let topic_arn = arn::topic_arn(&self.region, &self.account_id, name);
        let mut topics = write(&self.topics);
        if !topics.iter().any(|topic| topic.arn == topic_arn) {
            info!(topic_arn = %topic_arn, "created topic");
            topics.push(Topic {
                name: name.to_string(),
                arn: topic_arn.clone(),
            });
        }
        topic_arn
    }

    pub fn list_topics(&self) -> Vec<Topic> {
        read(&self.topics).clone()
    }

    /// Registers `endpoint` on the topic, returning the existing
    /// subscription's ARN when the pair is already registered.
    ///
    /// Queue subscriptions additionally match on the `QueueName` attribute.
    pub fn subscribe(
        &self,
        endpoint: &str,
        protocol: &str,
        topic_arn: &str,
        attributes: SubscriptionAttributes,
    ) -> Result<String, SnsError> {
        let filter_policy = codec::decode_filter_policy(&attributes)?;
        let topic_arn = self.resolve_arn(topic_arn);
        let is_queue = protocol.eq_ignore_ascii_case("sqs");

        let mut subscriptions = write(&self.subscriptions);
        let existing = subscriptions.iter().find(|sub| {
            sub.endpoint == endpoint
                && sub.topic_arn == topic_arn
                && (!is_queue || sub.queue_name() == attributes.get("QueueName").map(String::as_str))
        });
        if let Some(existing) = existing {
            debug!(subscription_arn = %existing.subscription_arn, "subscription already registered");
            return Ok(existing.subscription_arn.clone());
        }

        let subscription = Subscription {
            subscription_arn: format!("{}:{}", topic_arn, Uuid::new_v4()),
            topic_arn,
            protocol: protocol.to_string(),
            endpoint: endpoint.to_string(),
            owner: String::new(),
            attributes,
            filter_policy,
        };
        info!(
            subscription_arn = %subscription.subscription_arn,
            protocol = %subscription.protocol,
            endpoint = %subscription.endpoint,
            "subscribed"
        );
        let subscription_arn = subscription.subscription_arn.clone();
        subscriptions.push(subscription);
        Ok(subscription_arn)
    }

    pub fn unsubscribe(&self, subscription_arn: &str) {
        let mut subscriptions = write(&self.subscriptions);
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.subscription_arn != subscription_arn);
        info!(
            subscription_arn = %subscription_arn,
            removed = before - subscriptions.len(),
            "unsubscribed"
        );
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        read(&self.subscriptions).clone()
    }

    pub fn subscriptions_for(&self, topic_arn: &str) -> Vec<Subscription> {
        read(&self.subscriptions)
            .iter()
            .filter(|sub| sub.topic_arn == topic_arn)
            .cloned()
            .collect()
    }
}
