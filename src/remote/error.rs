//! Errors raised by the remote API layer

use thiserror::Error;

use crate::core::ErrorClass;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Connection failure or timeout; retried by the client
    #[error("network error: {message}")]
    Transient { message: String, timeout: bool },

    /// Non-retryable response, decoded from the JSON error body when possible
    #[error("API error {status}: {message}{}", documentation_suffix(.documentation_url))]
    Remote {
        status: u16,
        message: String,
        documentation_url: Option<String>,
    },

    /// Retry budget spent; carries the last retryable failure
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        attempts_left: u32,
        last_status: Option<u16>,
        last: String,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Request(String),
}

fn documentation_suffix(url: &Option<String>) -> String {
    match url {
        Some(url) => format!(" (see {url})"),
        None => String::new(),
    }
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            ApiError::RetriesExhausted { last_status, .. } => *last_status,
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Transient { timeout: true, .. } => ErrorClass::Timeout,
            ApiError::Transient { .. } => ErrorClass::Other,
            ApiError::Remote { status, .. } => ErrorClass::from_status(*status),
            ApiError::RetriesExhausted { last_status, .. } => match last_status {
                Some(status) => ErrorClass::from_status(*status),
                None => ErrorClass::Timeout,
            },
            ApiError::Cancelled => ErrorClass::Cancelled,
            ApiError::Decode(_) | ApiError::Request(_) => ErrorClass::Other,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::Request(err.to_string())
        } else {
            ApiError::Transient {
                timeout: err.is_timeout(),
                message: err.to_string(),
            }
        }
    }
}
