//! Directory client capability.
//!
//! The core never talks a directory protocol itself. Implementations translate
//! their library's failures into a [`DirectoryError`] carrying a
//! [`DirectoryErrorCode`]; the change pipeline maps those codes onto its own
//! error taxonomy.

pub mod memory;

pub use memory::{MemoryDirectory, MemoryUser};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::fmt;
use thiserror::Error;

/// Directory-native outcome of a failed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectoryErrorCode {
    ConnectError,
    ServerDown,
    Busy,
    Unavailable,
    Timeout,
    InvalidCredentials,
    InsufficientAccess,
    ConstraintViolation,
    UnwillingToPerform,
    PasswordTooYoung,
    PasswordInHistory,
    PasswordTooShort,
    PasswordComplexity,
    NoSuchObject,
    Other,
}

impl DirectoryErrorCode {
    /// Whether the failure is about reaching the directory rather than the request.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ConnectError | Self::ServerDown | Self::Busy | Self::Unavailable | Self::Timeout
        )
    }
}

impl fmt::Display for DirectoryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectError => "connect error",
            Self::ServerDown => "server down",
            Self::Busy => "busy",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::InvalidCredentials => "invalid credentials",
            Self::InsufficientAccess => "insufficient access",
            Self::ConstraintViolation => "constraint violation",
            Self::UnwillingToPerform => "unwilling to perform",
            Self::PasswordTooYoung => "password too young",
            Self::PasswordInHistory => "password in history",
            Self::PasswordTooShort => "password too short",
            Self::PasswordComplexity => "password complexity",
            Self::NoSuchObject => "no such object",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("directory {code}: {message}")]
pub struct DirectoryError {
    pub code: DirectoryErrorCode,
    pub message: String,
}

impl DirectoryError {
    pub fn new(code: DirectoryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Operations the core needs from a directory connection bound to one user session.
pub trait DirectoryClient: Send + Sync {
    /// Replace `old` with `new` in a single directory operation.
    fn change_password(
        &self,
        identity: &str,
        old: &SecretString,
        new: &SecretString,
    ) -> DirectoryResult<()>;

    fn read_expiration_flag(&self, identity: &str) -> DirectoryResult<bool>;

    fn read_expiration_time(&self, identity: &str) -> DirectoryResult<Option<DateTime<Utc>>>;

    /// Write the replication marker attribute with `timestamp`.
    fn write_marker_attribute(
        &self,
        identity: &str,
        attribute: &str,
        timestamp: DateTime<Utc>,
    ) -> DirectoryResult<()>;

    /// Whether the value of `attribute` is identical on every replica.
    fn test_replication(&self, identity: &str, attribute: &str) -> DirectoryResult<bool>;
}
