//! Decoding of the flattened query-protocol keys used by SNS clients.
//!
//! Clients send nested structures as flat keys, e.g.
//! `MessageAttributes.entry.1.Name` or `Attributes.entry.2.value`. The
//! functions here discover the entry indices under a prefix and fold each
//! entry back into a map, so nothing outside this module deals with the
//! flattened shape.

use crate::error::SnsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Request parameters as decoded from the form or JSON body.
pub type Params = HashMap<String, String>;

pub type MessageAttributes = BTreeMap<String, MessageAttribute>;

pub type SubscriptionAttributes = BTreeMap<String, String>;

const MESSAGE_ATTRIBUTES_PREFIX: &str = "MessageAttributes.entry.";
const SUBSCRIPTION_ATTRIBUTES_PREFIX: &str = "Attributes.entry.";
const BATCH_ENTRIES_PREFIX: &str = "PublishBatchRequestEntries.member.";

/// Attribute as carried inside the notification envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttribute {
    #[serde(rename = "Type")]
    pub data_type: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl MessageAttribute {
    pub fn is_array(&self) -> bool {
        self.data_type.ends_with(".Array")
    }

    pub fn is_binary(&self) -> bool {
        self.data_type.starts_with("Binary")
    }
}

/// Attribute in the queue service's `SendMessage` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueMessageAttribute {
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    /// Base64 text, decoded by the queue adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPolicyScope {
    #[default]
    MessageAttributes,
    MessageBody,
}

impl FilterPolicyScope {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("MessageBody") => FilterPolicyScope::MessageBody,
            _ => FilterPolicyScope::MessageAttributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPolicy {
    /// Attribute or body key mapped to its allowed values.
    pub rules: BTreeMap<String, Vec<Value>>,
    pub scope: FilterPolicyScope,
}

/// One entry of a `PublishBatch` request.
#[derive(Debug, Clone, Default)]
pub struct BatchEntry {
    pub id: String,
    pub message: Option<String>,
    pub subject: Option<String>,
    pub structure: Option<String>,
    pub group_id: Option<String>,
    pub attributes: MessageAttributes,
}

/// Distinct entry indices found under `prefix`, in numeric order.
fn entry_indices<'a>(params: &'a Params, prefix: &str) -> Vec<&'a str> {
    let mut indices: Vec<&str> = params
        .keys()
        .filter_map(|key| key.strip_prefix(prefix))
        .map(|rest| rest.split('.').next().unwrap_or(rest))
        .collect();
    indices.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    });
    indices.dedup();
    indices
}

fn non_empty(params: &Params, key: &str) -> Option<String> {
    params.get(key).filter(|value| !value.is_empty()).cloned()
}

pub fn decode_message_attributes(params: &Params) -> MessageAttributes {
    if params.get("MessageStructure").map(String::as_str) == Some("json") {
        return MessageAttributes::new();
    }

    let mut attributes = MessageAttributes::new();
    for index in entry_indices(params, MESSAGE_ATTRIBUTES_PREFIX) {
        let base = format!("{}{}", MESSAGE_ATTRIBUTES_PREFIX, index);
        let Some(name) = params.get(&format!("{}.Name", base)) else {
            continue;
        };
        let data_type = params
            .get(&format!("{}.Value.DataType", base))
            .cloned()
            .unwrap_or_else(|| "String".to_string());
        let value = non_empty(params, &format!("{}.Value.StringValue", base))
            .or_else(|| non_empty(params, &format!("{}.Value.BinaryValue", base)))
            .unwrap_or_default();
        attributes.insert(name.clone(), MessageAttribute { data_type, value });
    }
    attributes
}

pub fn decode_subscription_attributes(params: &Params) -> SubscriptionAttributes {
    let mut attributes = SubscriptionAttributes::new();
    for index in entry_indices(params, SUBSCRIPTION_ATTRIBUTES_PREFIX) {
        let base = format!("{}{}", SUBSCRIPTION_ATTRIBUTES_PREFIX, index);
        if let (Some(key), Some(value)) = (
            params.get(&format!("{}.key", base)),
            params.get(&format!("{}.value", base)),
        ) {
            attributes.insert(key.clone(), value.clone());
        }
    }
    attributes
}

/// Reads `FilterPolicy` and `FilterPolicyScope` from subscription attributes.
///
/// A scalar policy value is accepted as a one-element list.
pub fn decode_filter_policy(
    attributes: &SubscriptionAttributes,
) -> Result<Option<FilterPolicy>, SnsError> {
    let Some(raw) = attributes.get("FilterPolicy") else {
        return Ok(None);
    };
    let parsed: Value =
        serde_json::from_str(raw).map_err(|e| SnsError::FilterPolicy(e.to_string()))?;
    let Value::Object(object) = parsed else {
        return Err(SnsError::FilterPolicy(
            "filter policy must be a JSON object".to_string(),
        ));
    };

    let rules = object
        .into_iter()
        .map(|(key, allowed)| match allowed {
            Value::Array(values) => (key, values),
            scalar => (key, vec![scalar]),
        })
        .collect();

    Ok(Some(FilterPolicy {
        rules,
        scope: FilterPolicyScope::parse(attributes.get("FilterPolicyScope").map(String::as_str)),
    }))
}

pub fn decode_batch_entries(params: &Params) -> Vec<BatchEntry> {
    entry_indices(params, BATCH_ENTRIES_PREFIX)
        .into_iter()
        .map(|index| {
            let base = format!("{}{}.", BATCH_ENTRIES_PREFIX, index);
            let structure = non_empty(params, &format!("{}MessageStructure", base));

            // Re-root the entry's keys so the attribute decoder sees them
            // as top-level `MessageAttributes.entry.N...` keys.
            let mut entry_params: Params = params
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(&base)
                        .filter(|rest| rest.starts_with("MessageAttributes."))
                        .map(|rest| (rest.to_string(), value.clone()))
                })
                .collect();
            if let Some(structure) = &structure {
                entry_params.insert("MessageStructure".to_string(), structure.clone());
            }

            BatchEntry {
                id: params
                    .get(&format!("{}Id", base))
                    .cloned()
                    .unwrap_or_default(),
                message: params.get(&format!("{}Message", base)).cloned(),
                subject: non_empty(params, &format!("{}Subject", base)),
                group_id: non_empty(params, &format!("{}MessageGroupId", base)),
                attributes: decode_message_attributes(&entry_params),
                structure,
            }
        })
        .collect()
}

pub fn encode_queue_attributes(
    attributes: &MessageAttributes,
) -> BTreeMap<String, QueueMessageAttribute> {
    attributes
        .iter()
        .map(|(name, attribute)| {
            let encoded = if attribute.is_binary() {
                QueueMessageAttribute {
                    data_type: attribute.data_type.clone(),
                    string_value: None,
                    binary_value: Some(attribute.value.clone()),
                }
            } else {
                QueueMessageAttribute {
                    data_type: attribute.data_type.clone(),
                    string_value: Some(attribute.value.clone()),
                    binary_value: None,
                }
            };
            (name.clone(), encoded)
        })
        .collect()
}

/// Flattens a JSON request body into query-protocol keys.
///
/// Objects join their keys with `.`, arrays are numbered from 1 the way
/// `member.N` lists are, and scalars become their string form.
pub fn flatten_json(value: &Value) -> Params {
    let mut params = Params::new();
    flatten_into(&mut params, String::new(), value);
    params
}

fn flatten_into(params: &mut Params, prefix: String, value: &Value) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(params, join(key), nested);
            }
        }
        Value::Array(items) => {
            for (position, nested) in items.iter().enumerate() {
                flatten_into(params, join(&(position + 1).to_string()), nested);
            }
        }
        Value::Null => {}
        Value::String(text) => {
            params.insert(prefix, text.clone());
        }
        scalar => {
            params.insert(prefix, scalar.to_string());
        }
    }
}
