//! Response envelopes and the error mapping of the transport boundary.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{EngineError, ErrorCategory};
use crate::store::codes;

const BAD_REQUEST_MESSAGE: &str =
    "The request could not be processed due to invalid data. Please check your data and try again.";
const NOT_FOUND_MESSAGE: &str = "The requested resource could not be found.";
const INTERNAL_SERVER_MESSAGE: &str =
    "An unexpected error has occurred on the server. Please try again later.";

/// Credentials handed back alongside a response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl AuthBundle {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.key.is_none()
    }
}

/// `{data?, auth?}` with a caller-chosen status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessEnvelope {
    #[serde(skip)]
    pub status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthBundle>,
}

impl SuccessEnvelope {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            data: None,
            auth: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Sets the payload. A null payload is left out.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = (!data.is_null()).then_some(data);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth.get_or_insert_with(AuthBundle::default).token = Some(token.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.auth.get_or_insert_with(AuthBundle::default).key = Some(key.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.data.is_none() && self.auth.as_ref().map_or(true, AuthBundle::is_empty)
    }
}

impl IntoResponse for SuccessEnvelope {
    fn into_response(self) -> Response {
        if self.is_empty() {
            return self.status.into_response();
        }
        json_response(self.status, &self)
    }
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// An engine error mapped to exactly one HTTP outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl HttpError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", BAD_REQUEST_MESSAGE)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", NOT_FOUND_MESSAGE)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER",
            INTERNAL_SERVER_MESSAGE,
        )
    }
}

impl From<&EngineError> for HttpError {
    fn from(err: &EngineError) -> Self {
        match (err.category(), err) {
            (_, EngineError::Forbidden { code, message }) => {
                HttpError::new(StatusCode::FORBIDDEN, code.clone(), message.clone())
            }
            (ErrorCategory::ClientInput, _) => {
                HttpError::new(StatusCode::BAD_REQUEST, err.code(), err.to_string())
            }
            (ErrorCategory::Existence, _) => HttpError::not_found(),
            (ErrorCategory::Store, EngineError::Store(store))
                if store.code == codes::DOCUMENT_VALIDATION_FAILURE =>
            {
                HttpError::bad_request()
            }
            (ErrorCategory::Store, _) | (ErrorCategory::Developer, _) => HttpError::internal(),
        }
    }
}

impl From<EngineError> for HttpError {
    fn from(err: EngineError) -> Self {
        let mapped = HttpError::from(&err);
        if mapped.status.is_server_error() {
            error!(target: "aerodoc::http", error = %err, code = err.code(), "Request failed");
        } else {
            warn!(target: "aerodoc::http", error = %err, code = err.code(), status = mapped.status.as_u16(), "Request rejected");
        }
        mapped
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        json_response(self.status, &self.body)
    }
}

/// Serializes `body` as JSON. A body that cannot be serialized becomes an
/// empty 500.
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            error!(target: "aerodoc::http", error = %e, "Failed to serialize response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
