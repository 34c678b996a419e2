//! Notification envelope delivered to non-raw subscribers.

use crate::codec::MessageAttributes;
use crate::state::{Message, Subscription};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder used for the signing fields; deliveries are never signed.
const UNSIGNED: &str = "EXAMPLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    #[serde(rename = "Type")]
    pub kind: String,
    pub message_id: String,
    pub topic_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: String,
    pub signature_version: String,
    pub signature: String,
    #[serde(rename = "SigningCertURL")]
    pub signing_cert_url: String,
    #[serde(rename = "UnsubscribeURL")]
    pub unsubscribe_url: String,
    pub message_attributes: MessageAttributes,
    pub subscription_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
}

impl Notification {
    pub fn new(message: &Message, subscription: &Subscription, body: String) -> Self {
        Self {
            kind: "Notification".to_string(),
            message_id: message.id.clone(),
            topic_arn: message.topic_arn.clone(),
            subject: message.subject.clone(),
            message: body,
            timestamp: message
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            signature_version: "1".to_string(),
            signature: UNSIGNED.to_string(),
            signing_cert_url: UNSIGNED.to_string(),
            unsubscribe_url: UNSIGNED.to_string(),
            message_attributes: message.attributes.clone(),
            subscription_arn: subscription.subscription_arn.clone(),
            message_group_id: message.group_id.clone(),
        }
    }
}

pub fn message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Payload for one subscription: the bare body in raw mode, the
/// serialized envelope otherwise.
pub fn payload(message: &Message, subscription: &Subscription) -> Result<String, serde_json::Error> {
    let body = message.body_for(&subscription.protocol.to_lowercase());
    if subscription.is_raw() {
        return Ok(body);
    }
    serde_json::to_string(&Notification::new(message, subscription, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageAttribute;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn subscription(raw: bool) -> Subscription {
        let mut attributes = BTreeMap::new();
        if raw {
            attributes.insert("RawMessageDelivery".to_string(), "true".to_string());
        }
        Subscription {
            subscription_arn: "arn:aws:sns:us-east-1:1:orders:abc".to_string(),
            topic_arn: "arn:aws:sns:us-east-1:1:orders".to_string(),
            protocol: "http".to_string(),
            endpoint: "http://localhost:9/".to_string(),
            owner: String::new(),
            attributes,
            filter_policy: None,
        }
    }

    fn message() -> Message {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "foo".to_string(),
            MessageAttribute {
                data_type: "String".to_string(),
                value: "bar".to_string(),
            },
        );
        Message {
            id: "m-1".to_string(),
            topic_arn: "arn:aws:sns:us-east-1:1:orders".to_string(),
            subject: Some("subject".to_string()),
            body: r#"{"message":"hello"}"#.to_string(),
            structure: None,
            attributes,
            group_id: Some("group".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn raw_payload_is_the_bare_body() {
        assert_eq!(
            payload(&message(), &subscription(true)).unwrap(),
            r#"{"message":"hello"}"#
        );
    }

    #[test]
    fn wrapped_payload_is_a_notification() {
        let json = payload(&message(), &subscription(false)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["Type"], "Notification");
        assert_eq!(value["MessageId"], "m-1");
        assert_eq!(value["TopicArn"], "arn:aws:sns:us-east-1:1:orders");
        assert_eq!(value["Subject"], "subject");
        assert_eq!(value["Message"], r#"{"message":"hello"}"#);
        assert_eq!(value["SubscriptionArn"], "arn:aws:sns:us-east-1:1:orders:abc");
        assert_eq!(value["MessageGroupId"], "group");
        assert_eq!(value["SignatureVersion"], "1");
        assert_eq!(value["SigningCertURL"], "EXAMPLE");
        assert_eq!(
            value["MessageAttributes"]["foo"],
            serde_json::json!({"Type": "String", "Value": "bar"})
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let mut msg = message();
        msg.subject = None;
        msg.group_id = None;
        let json = payload(&msg, &subscription(false)).unwrap();
        assert!(!json.contains("Subject"));
        assert!(!json.contains("MessageGroupId"));
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(message_id(), message_id());
    }
}
