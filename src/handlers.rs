use crate::codec::{self, Params};
use crate::delivery::PublishRequest;
use crate::error::SnsError;
use crate::responses;
use crate::state::SharedState;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tracing::debug;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", any(handle_aws_request))
        .layer(middleware::map_response(allow_cors))
        .with_state(state)
}

async fn allow_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept"),
    );
    response
}

/// Decodes a form or JSON body into flat request parameters.
pub fn parse_params(headers: &HeaderMap, body: &[u8]) -> Result<Params, SnsError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.contains("json"));

    if is_json {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| SnsError::InvalidParameter(format!("malformed JSON body: {}", e)))?;
        return Ok(codec::flatten_json(&value));
    }
    Ok(url::form_urlencoded::parse(body).into_owned().collect())
}

pub async fn handle_aws_request(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return StatusCode::OK.into_response();
    }
    let params = match parse_params(&headers, &body) {
        Ok(params) => params,
        Err(err) => return err.into_response(),
    };
    let action = params.get("Action").map(String::as_str).unwrap_or_default();
    debug!(action = %action, ?params, "request");

    let result = match action {
        "CreateTopic" => create_topic(&state, &params),
        "ListTopics" => list_topics(&state),
        "Subscribe" => subscribe(&state, &params),
        "Unsubscribe" => unsubscribe(&state, &params),
        "ListSubscriptions" => list_subscriptions(&state),
        "Publish" => publish(&state, &params),
        "PublishBatch" => publish_batch(&state, &params),
        _ => {
            debug!(action = %action, "action not implemented");
            responses::not_implemented().map_err(SnsError::from)
        }
    };

    match result {
        Ok(xml) => xml_response(xml),
        Err(err) => {
            debug!(action = %action, error = %err, "request failed");
            err.into_response()
        }
    }
}

fn xml_response(xml: Vec<u8>) -> Response {
    ([(CONTENT_TYPE, "application/xml")], xml).into_response()
}

fn required<'a>(params: &'a Params, key: &'static str) -> Result<&'a str, SnsError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(SnsError::MissingParameter(key))
}

fn optional(params: &Params, key: &str) -> Option<String> {
    params.get(key).filter(|value| !value.is_empty()).cloned()
}

fn create_topic(state: &SharedState, params: &Params) -> Result<Vec<u8>, SnsError> {
    let name = required(params, "Name")?;
    let topic_arn = state.registry.create_topic(name);
    Ok(responses::create_topic(&topic_arn)?)
}

fn list_topics(state: &SharedState) -> Result<Vec<u8>, SnsError> {
    Ok(responses::list_topics(&state.registry.list_topics())?)
}

fn subscribe(state: &SharedState, params: &Params) -> Result<Vec<u8>, SnsError> {
    let topic_arn = required(params, "TopicArn")?;
    let endpoint = required(params, "Endpoint")?;
    let protocol = params.get("Protocol").map(String::as_str).unwrap_or_default();
    let attributes = codec::decode_subscription_attributes(params);

    let subscription_arn = state
        .registry
        .subscribe(endpoint, protocol, topic_arn, attributes)?;
    Ok(responses::subscribe(&subscription_arn)?)
}

fn unsubscribe(state: &SharedState, params: &Params) -> Result<Vec<u8>, SnsError> {
    let subscription_arn = required(params, "SubscriptionArn")?;
    state.registry.unsubscribe(subscription_arn);
    Ok(responses::unsubscribe()?)
}

fn list_subscriptions(state: &SharedState) -> Result<Vec<u8>, SnsError> {
    Ok(responses::list_subscriptions(&state.registry.list_subscriptions())?)
}

fn publish(state: &SharedState, params: &Params) -> Result<Vec<u8>, SnsError> {
    let target_arn = state.dispatcher.extract_target(params)?;
    let request = PublishRequest {
        target_arn,
        subject: optional(params, "Subject"),
        message: params.get("Message").cloned(),
        structure: optional(params, "MessageStructure"),
        attributes: codec::decode_message_attributes(params),
        group_id: optional(params, "MessageGroupId"),
    };
    let message_id = state.dispatcher.publish(request)?;
    Ok(responses::publish(&message_id)?)
}

fn publish_batch(state: &SharedState, params: &Params) -> Result<Vec<u8>, SnsError> {
    let topic_arn = required(params, "TopicArn")?;
    let entries = codec::decode_batch_entries(params);
    let result = state.dispatcher.publish_batch(topic_arn, entries);
    Ok(responses::publish_batch(&result)?)
}
