//! ARN helpers shared by the registry and the dispatcher.

use crate::error::SnsError;
use regex::{NoExpand, Regex};
use std::sync::LazyLock;

/// Placeholder tokens such as `#{AWS::AccountId}` inside an ARN.
static PSEUDO_PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{AWS::([a-zA-Z]+)\}").expect("pseudo parameter regex is valid")
});

/// E.164 phone number with an optional leading `+`.
static PHONE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone number regex is valid"));

pub fn topic_arn(region: &str, account_id: &str, name: &str) -> String {
    format!("arn:aws:sns:{}:{}:{}", region, account_id, name)
}

pub fn topic_name_from_arn(arn: &str) -> &str {
    arn.rsplit(':').next().unwrap_or_default()
}

/// Replaces every pseudo parameter with the account id.
pub fn resolve_pseudo_parameters(arn: &str, account_id: &str) -> String {
    PSEUDO_PARAMETER
        .replace_all(arn, NoExpand(account_id))
        .into_owned()
}

pub fn validate_phone_number(phone_number: &str) -> Result<&str, SnsError> {
    if PHONE_NUMBER.is_match(phone_number) {
        Ok(phone_number)
    } else {
        Err(SnsError::InvalidParameter(format!(
            "PhoneNumber {} is not valid to publish",
            phone_number
        )))
    }
}
