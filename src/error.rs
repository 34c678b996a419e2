use crate::responses;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnsError {
    #[error("{0} is missing")]
    MissingParameter(&'static str),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Protocol '{0}' is not supported")]
    UnsupportedProtocol(String),

    #[error("invalid filter policy: {0}")]
    FilterPolicy(String),

    #[error("delivery to {endpoint} failed: {reason}")]
    HttpDelivery { endpoint: String, reason: String },

    #[error("queue delivery failed: {0}")]
    Queue(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to render response: {0}")]
    Render(#[from] std::io::Error),
}

impl SnsError {
    pub fn code(&self) -> &'static str {
        match self {
            SnsError::MissingParameter(_)
            | SnsError::InvalidParameter(_)
            | SnsError::UnsupportedProtocol(_)
            | SnsError::FilterPolicy(_) => "InvalidParameter",
            SnsError::HttpDelivery { .. }
            | SnsError::Queue(_)
            | SnsError::Config(_)
            | SnsError::Render(_) => "InternalError",
        }
    }

    pub fn is_sender_fault(&self) -> bool {
        self.code() == "InvalidParameter"
    }

    pub fn status(&self) -> StatusCode {
        if self.is_sender_fault() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn error_response(err: &SnsError) -> Response {
    let fault = if err.is_sender_fault() {
        "Sender"
    } else {
        "Receiver"
    };
    match responses::error(fault, err.code(), &err.to_string()) {
        Ok(xml) => (err.status(), [(CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(render) => {
            tracing::error!(error = %render, "failed to render error response");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

impl IntoResponse for SnsError {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_sender_faults() {
        let err = SnsError::MissingParameter("TopicArn or TargetArn");
        assert_eq!(err.to_string(), "TopicArn or TargetArn is missing");
        assert_eq!(err.code(), "InvalidParameter");
        assert!(err.is_sender_fault());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn delivery_errors_are_internal() {
        let err = SnsError::Queue("unreachable".to_string());
        assert_eq!(err.code(), "InternalError");
        assert!(!err.is_sender_fault());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn renders_error_document() {
        let response = SnsError::InvalidParameter("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/xml"
        );
    }
}
