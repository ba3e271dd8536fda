//! Coarse failure categories used to pick a retry policy and a user-facing message.
//!
//! | Kind           | Recoverable | Typical trigger                          |
//! |----------------|-------------|------------------------------------------|
//! | `NETWORK`      | yes         | connection refused, fetch failed         |
//! | `API`          | yes         | backend reported a structured failure    |
//! | `TIMEOUT`      | yes         | backend call timed out                   |
//! | `VALIDATION`   | no          | invalid input                            |
//! | `PARSE`        | no          | malformed JSON in a response             |
//! | `NOT_FOUND`    | no          | 404, missing resource                    |
//! | `UNAUTHORIZED` | no          | 401, expired session                     |
//! | `UNKNOWN`      | no          | nothing matched                          |
//!
//! ## Example
//!
//! ```rust
//! use command_cache::ErrorKind;
//!
//! assert!(ErrorKind::Network.is_recoverable());
//! assert!(!ErrorKind::Validation.is_recoverable());
//! assert_eq!(ErrorKind::NotFound.name(), "NOT_FOUND");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Api,
    Validation,
    Parse,
    NotFound,
    Unauthorized,
    Timeout,
    Unknown,
}

/// Title / message / suggested action shown to a human for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserMessage {
    pub title: &'static str,
    pub message: &'static str,
    pub action: &'static str,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        Self::Network,
        Self::Api,
        Self::Validation,
        Self::Parse,
        Self::NotFound,
        Self::Unauthorized,
        Self::Timeout,
        Self::Unknown,
    ];

    /// Returns the canonical name (e.g., `"NOT_FOUND"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Api => "API",
            Self::Validation => "VALIDATION",
            Self::Parse => "PARSE",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether a failure of this kind is worth retrying.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Api)
    }

    /// Parses a canonical name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn user_message(&self) -> UserMessage {
        match self {
            Self::Network => UserMessage {
                title: "Connection problem",
                message: "Could not reach the backend service.",
                action: "Check your connection and try again.",
            },
            Self::Api => UserMessage {
                title: "Service error",
                message: "The backend reported an error while handling the request.",
                action: "Try again in a moment.",
            },
            Self::Validation => UserMessage {
                title: "Invalid input",
                message: "Some of the provided values are not valid.",
                action: "Review the highlighted fields and correct them.",
            },
            Self::Parse => UserMessage {
                title: "Unexpected response",
                message: "The response from the backend could not be read.",
                action: "Update the application or report the problem.",
            },
            Self::NotFound => UserMessage {
                title: "Not found",
                message: "The requested item does not exist or was removed.",
                action: "Refresh the view and pick another item.",
            },
            Self::Unauthorized => UserMessage {
                title: "Not authorized",
                message: "Your session is missing or has expired.",
                action: "Sign in again.",
            },
            Self::Timeout => UserMessage {
                title: "Request timed out",
                message: "The backend took too long to respond.",
                action: "Try again; if it keeps happening, try later.",
            },
            Self::Unknown => UserMessage {
                title: "Something went wrong",
                message: "An unexpected error occurred.",
                action: "Try again or restart the application.",
            },
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
