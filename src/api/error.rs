//! Commit status API error types

use std::fmt;

/// Errors that can occur when publishing a commit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized - token invalid or expired
    Unauthorized { message: String },
    /// 403 Forbidden - token lacks required permissions
    Forbidden { message: String },
    /// 404 Not Found - unknown repository or commit, or no access to it
    NotFound { message: String },
    /// 422 Unprocessable Entity - the status was rejected
    Validation { message: String },
    /// Network or timeout error
    NetworkError { message: String },
    /// Any other non-201 response
    HttpError { status: u16, message: String },
}

impl ApiError {
    /// Classify a non-201 response by status code
    pub fn from_response(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::Forbidden { message },
            404 => ApiError::NotFound { message },
            422 => ApiError::Validation { message },
            _ => ApiError::HttpError { status, message },
        }
    }

    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// HTTP status of the response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Validation { .. } => Some(422),
            ApiError::HttpError { status, .. } => Some(*status),
            ApiError::NetworkError { .. } => None,
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { message } => {
                write!(f, "401 Unauthorized response from github: {}", message)
            }
            ApiError::Forbidden { message } => {
                write!(f, "403 Forbidden response from github: {}", message)
            }
            ApiError::NotFound { message } => {
                write!(f, "404 Not Found response from github: {}", message)
            }
            ApiError::Validation { message } => {
                write!(f, "422 Unprocessable Entity response from github: {}", message)
            }
            ApiError::NetworkError { message } => {
                write!(f, "updating github status: {}", message)
            }
            ApiError::HttpError { status, message } => {
                write!(f, "{} response from github: {}", status, message)
            }
        }
    }
}

impl std::error::Error for ApiError {}
