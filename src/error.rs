use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the hub core to its callers.
#[derive(Debug, Error)]
pub enum HubError {
    /// Network failure or 5xx response, reported after retries ran out.
    #[error("Transport error: {message}")]
    Transport { message: String, status: Option<u16> },

    /// 401/403 from the remote service. Never retried.
    #[error("Authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rejected locally before any network call.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File '{path}' is {size} bytes, above the {limit} byte inline-edit limit")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("A commit is already in progress for {repo}@{branch}")]
    Busy { repo: String, branch: String },

    #[error("Item {0} is already in the collection")]
    DuplicateItem(String),

    /// Remote data breaks an assumed invariant.
    #[error("Inconsistent remote state: {0}")]
    InconsistentState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other 4xx answer.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(String),
}

/// Remediation bucket the UI collaborator picks a prompt from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ReLogin,
    TryAgain,
    NameTaken,
    UseTransferPath,
    FixInput,
    Wait,
    AlreadyPresent,
    Missing,
    RemoteInconsistent,
    Cancelled,
    Internal,
}

impl HubError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HubError::Transport { .. } => ErrorCategory::TryAgain,
            HubError::Auth { .. } => ErrorCategory::ReLogin,
            HubError::Conflict(_) => ErrorCategory::NameTaken,
            HubError::Validation(_) | HubError::Rejected { .. } => ErrorCategory::FixInput,
            HubError::FileTooLarge { .. } => ErrorCategory::UseTransferPath,
            HubError::Busy { .. } => ErrorCategory::Wait,
            HubError::DuplicateItem(_) => ErrorCategory::AlreadyPresent,
            HubError::NotFound(_) => ErrorCategory::Missing,
            HubError::InconsistentState(_) | HubError::Decode(_) => {
                ErrorCategory::RemoteInconsistent
            }
            HubError::Cancelled => ErrorCategory::Cancelled,
            HubError::Io(_) | HubError::Settings(_) => ErrorCategory::Internal,
        }
    }

    /// Human-readable hint matching [`HubError::category`].
    pub fn remediation(&self) -> &'static str {
        match self.category() {
            ErrorCategory::ReLogin => "Your token was rejected. Please log in again.",
            ErrorCategory::TryAgain => "The hub could not be reached. Try again.",
            ErrorCategory::NameTaken => "That name is already taken.",
            ErrorCategory::UseTransferPath => {
                "This file is too large to edit inline. Use download/upload instead."
            }
            ErrorCategory::FixInput => "The request was invalid. Check the input and retry.",
            ErrorCategory::Wait => "Another commit to this branch is still running. Wait for it.",
            ErrorCategory::AlreadyPresent => "That item is already in the collection.",
            ErrorCategory::Missing => "The requested resource does not exist.",
            ErrorCategory::RemoteInconsistent => {
                "The hub returned unexpected data. Refresh and try again."
            }
            ErrorCategory::Cancelled => "The operation was cancelled.",
            ErrorCategory::Internal => "A local error occurred. See the log for details.",
        }
    }

    /// True when the remote refused our credential.
    pub fn is_auth(&self) -> bool {
        matches!(self, HubError::Auth { .. })
    }
}

impl From<TransportError> for HubError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => HubError::Transport {
                message,
                status: None,
            },
            TransportError::Server { status, message } => HubError::Transport {
                message,
                status: Some(status),
            },
            TransportError::Auth { status, message } => HubError::Auth { status, message },
            TransportError::Local(message) => HubError::Io(std::io::Error::other(message)),
            TransportError::Client { status, message } => match status {
                404 => HubError::NotFound(message),
                409 => HubError::Conflict(message),
                _ => HubError::Rejected { status, message },
            },
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Decode(err.to_string())
    }
}

// Serialize as the display string so errors can cross an IPC boundary.
impl Serialize for HubError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
