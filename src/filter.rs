//! Subscription filter policy evaluation.

use crate::codec::{FilterPolicy, FilterPolicyScope, MessageAttributes};
use serde_json::Value;
use tracing::debug;

/// Decides whether a message passes `policy`.
///
/// Every policy key must be satisfied; the first failing key rejects the
/// message.
pub fn evaluate(policy: &FilterPolicy, attributes: &MessageAttributes, body: &str) -> bool {
    match policy.scope {
        FilterPolicyScope::MessageBody => evaluate_body(policy, body),
        FilterPolicyScope::MessageAttributes => evaluate_attributes(policy, attributes),
    }
}

fn intersects(allowed: &[Value], candidates: &[Value]) -> bool {
    allowed.iter().any(|value| candidates.contains(value))
}

fn evaluate_attributes(policy: &FilterPolicy, attributes: &MessageAttributes) -> bool {
    for (key, allowed) in &policy.rules {
        let Some(attribute) = attributes.get(key) else {
            debug!(key = %key, "filter policy failed: attribute missing");
            return false;
        };

        // Only an explicit `.Array` type unpacks the value.
        let candidates = if attribute.is_array() {
            match serde_json::from_str::<Vec<Value>>(&attribute.value) {
                Ok(values) => values,
                Err(err) => {
                    debug!(key = %key, error = %err, "filter policy failed: array attribute is not a JSON array");
                    return false;
                }
            }
        } else {
            vec![Value::String(attribute.value.clone())]
        };

        if !intersects(allowed, &candidates) {
            debug!(key = %key, ?allowed, ?candidates, "filter policy failed");
            return false;
        }
    }
    debug!(rules = policy.rules.len(), "filter policy passed");
    true
}

fn evaluate_body(policy: &FilterPolicy, body: &str) -> bool {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "filter policy (MessageBody) failed: message is not valid JSON");
            return false;
        }
    };
    let Value::Object(fields) = parsed else {
        debug!("filter policy (MessageBody) failed: message is not a JSON object");
        return false;
    };

    for (key, allowed) in &policy.rules {
        let Some(value) = fields.get(key) else {
            debug!(key = %key, "filter policy (MessageBody) failed: key not found in message body");
            return false;
        };
        let candidates = match value {
            Value::Array(values) => values.clone(),
            scalar => vec![scalar.clone()],
        };
        if !intersects(allowed, &candidates) {
            debug!(key = %key, ?allowed, body_value = %value, "filter policy (MessageBody) failed");
            return false;
        }
    }
    debug!(rules = policy.rules.len(), "filter policy (MessageBody) passed");
    true
}
