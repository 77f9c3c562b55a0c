//! Error taxonomy for Domain API calls.

use reqwest::StatusCode;
use thiserror::Error;

use super::types::ErrorBody;

/// Domain error code reported by the server.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    /// The addressed object does not exist.
    NoSuchObject,
    /// The object being created already exists.
    ObjectExists,
    /// The request was malformed or semantically invalid.
    IllegalArgument,
    /// Any other server or command failure, with the server's code.
    Server(String),
}

impl ErrorCode {
    /// Maps the server exception name to a code.
    #[must_use]
    pub fn from_server(code: &str) -> Self {
        match code {
            "NoSuchObjectException" => Self::NoSuchObject,
            "ObjectExistsException" => Self::ObjectExists,
            "IllegalArgumentException" | "JsonSyntaxException" => Self::IllegalArgument,
            other => Self::Server(other.to_owned()),
        }
    }

    /// Infers a code from the HTTP status when the body carries none.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NoSuchObject,
            StatusCode::CONFLICT => Self::ObjectExists,
            StatusCode::BAD_REQUEST => Self::IllegalArgument,
            other => Self::Server(other.as_u16().to_string()),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSuchObject => f.write_str("NoSuchObject"),
            Self::ObjectExists => f.write_str("ObjectExists"),
            Self::IllegalArgument => f.write_str("IllegalArgument"),
            Self::Server(code) => write!(f, "Server({code})"),
        }
    }
}

/// Outcome of a failed Domain API call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The server was reached and rejected the request.
    #[error("{code}: {message}")]
    Domain {
        /// Classified error code.
        code: ErrorCode,
        /// Server-supplied message.
        message: String,
    },
    /// The server could not be reached or the exchange broke off.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
    /// The server answered with a body this client cannot decode.
    #[error("failed to decode {what}: {message}")]
    Decode {
        /// Payload being decoded.
        what: String,
        /// Parser error message.
        message: String,
    },
}

impl ApiError {
    /// Creates a domain error.
    #[must_use]
    pub fn domain(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Domain {
            code,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Classifies a non-success response from its status and body.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(ErrorBody {
                code: Some(code),
                message,
                ..
            }) => Self::domain(ErrorCode::from_server(&code), message),
            Ok(ErrorBody { message, .. }) if !message.is_empty() => {
                Self::domain(ErrorCode::from_status(status), message)
            }
            _ => Self::domain(
                ErrorCode::from_status(status),
                String::from_utf8_lossy(body).trim().to_owned(),
            ),
        }
    }

    /// Returns the domain code when the server rejected the request.
    #[must_use]
    pub const fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Domain { code, .. } => Some(code),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Returns `true` for a `NoSuchObject` domain error.
    #[must_use]
    pub fn is_no_such_object(&self) -> bool {
        matches!(self.code(), Some(ErrorCode::NoSuchObject))
    }

    /// Returns `true` when the failure happened before the server answered.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        Self::transport(value.to_string())
    }
}
