//! Error types for the code list API.
//!
//! # Error Mapping
//!
//! Persistence errors map to HTTP status codes by category:
//!
//! | Storage Error | HTTP Status | Code |
//! |--------------|-------------|------|
//! | Resource::NotFound | 404 | not-found |
//! | Resource::AlreadyExists | 409 | conflict |
//! | Validation | 406 | validation |
//! | Permission::NotPermitted | 401 | unauthorized |
//! | Permission::StatusChangeNotAllowed | 406 | validation |
//! | Backend | 500 | exception |
//! | Index::UnknownEntityType | 400 | invalid |
//! | Index (other) | 502 | index |
//!
//! Every error body has the shape `{"meta": {"code": <status>, "errorCode": <code>, "message": <text>}}`.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codelist_persistence::error::{IndexError, PermissionError, ResourceError, StorageError};

/// The primary error type for REST API operations.
#[derive(Debug)]
pub enum RestError {
    /// Record not found (HTTP 404).
    NotFound {
        /// Error message.
        message: String,
    },

    /// Malformed request (HTTP 400).
    BadRequest {
        /// Error message.
        message: String,
    },

    /// Missing or insufficient credentials (HTTP 401).
    Unauthorized {
        /// Error message.
        message: String,
    },

    /// Conflicting state, such as a reindex already running (HTTP 409).
    Conflict {
        /// Error message.
        message: String,
    },

    /// The payload failed integrity validation (HTTP 406).
    NotAcceptable {
        /// Error message.
        message: String,
    },

    /// Internal server error (HTTP 500).
    InternalError {
        /// Error message.
        message: String,
    },

    /// The search index failed (HTTP 502).
    BadGateway {
        /// Error message.
        message: String,
    },
}

impl RestError {
    /// Shorthand for a 400 response.
    pub fn bad_request(message: impl Into<String>) -> Self {
        RestError::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a 401 response.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        RestError::Unauthorized {
            message: message.into(),
        }
    }

    /// Returns the HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::NotFound { .. } => StatusCode::NOT_FOUND,
            RestError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            RestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RestError::Conflict { .. } => StatusCode::CONFLICT,
            RestError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            RestError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn parts(&self) -> (&'static str, &str) {
        match self {
            RestError::NotFound { message } => ("not-found", message),
            RestError::BadRequest { message } => ("invalid", message),
            RestError::Unauthorized { message } => ("unauthorized", message),
            RestError::Conflict { message } => ("conflict", message),
            RestError::NotAcceptable { message } => ("validation", message),
            RestError::InternalError { message } => ("exception", message),
            RestError::BadGateway { message } => ("index", message),
        }
    }
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, message) = self.parts();
        write!(f, "{} ({})", message, self.status().as_u16())
    }
}

impl std::error::Error for RestError {}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Request failed");
        }
        let body = serde_json::json!({
            "meta": {
                "code": status.as_u16(),
                "errorCode": code,
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for RestError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::Resource(ResourceError::NotFound { .. }) => RestError::NotFound { message },
            StorageError::Resource(ResourceError::AlreadyExists { .. }) => {
                RestError::Conflict { message }
            }
            StorageError::Validation(_) => RestError::NotAcceptable { message },
            StorageError::Permission(PermissionError::NotPermitted { .. }) => {
                RestError::Unauthorized { message }
            }
            StorageError::Permission(PermissionError::StatusChangeNotAllowed { .. }) => {
                RestError::NotAcceptable { message }
            }
            StorageError::Backend(_) => RestError::InternalError { message },
            StorageError::Index(IndexError::UnknownEntityType { .. }) => {
                RestError::BadRequest { message }
            }
            StorageError::Index(_) => RestError::BadGateway { message },
        }
    }
}

/// Result type for REST operations.
pub type RestResult<T> = Result<T, RestError>;
