//! Error types for the forward-core library
//!
//! [`ForwardError`] is the taxonomy of forwarding failures. Every variant but
//! [`ForwardError::Transport`] maps to a SIP reply that the coordinator sends
//! itself; callers only ever see transport failures.
//!
//! ```rust
//! use rvoip_forward_core::{ForwardError, StatusCode};
//!
//! let error = ForwardError::bad_request("host contains '@'");
//! assert_eq!(error.status_code(), Some(StatusCode::BadRequest));
//! assert_eq!(error.to_string(), "Bad request: host contains '@'");
//! ```

use thiserror::Error;

use crate::message::StatusCode;

/// Forwarding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// Max-Forwards does not exceed the number of hops already traversed
    #[error("Too many hops: Max-Forwards {max_forwards} with {via_count} Via headers")]
    TooManyHops { max_forwards: u32, via_count: usize },

    /// The destination is not something we can forward to
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// The computed branch is already present in the Via chain
    #[error("Loop detected: branch {branch} already in Via chain")]
    LoopDetected { branch: String },

    /// GRUU resolution through the location directory failed
    #[error("Directory resolution failed: {message}")]
    DirectoryResolutionFailed { message: String },

    /// The transport layer refused the message
    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl ForwardError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ForwardError::BadRequest {
            message: message.into(),
        }
    }

    pub fn directory(message: impl Into<String>) -> Self {
        ForwardError::DirectoryResolutionFailed {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ForwardError::Transport {
            message: message.into(),
        }
    }

    /// The reply this error turns into, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ForwardError::TooManyHops { .. } => Some(StatusCode::TooManyHops),
            ForwardError::BadRequest { .. } => Some(StatusCode::BadRequest),
            ForwardError::LoopDetected { .. } => Some(StatusCode::LoopDetected),
            ForwardError::DirectoryResolutionFailed { .. } => Some(StatusCode::ServerInternalError),
            ForwardError::Transport { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ForwardError>;

/// Configuration loading failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Bad route parameter '{route}' in forward configuration: {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Missing required component: {0}")]
    MissingComponent(&'static str),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
