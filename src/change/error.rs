//! Change pipeline errors.

use super::ChangeReport;
use crate::directory::{DirectoryError, DirectoryErrorCode};
use crate::policy::{PolicyError, PolicyViolation};
use std::fmt;
use thiserror::Error;

/// Why the directory refused a password change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    InvalidCurrentPassword,
    InsufficientAccess,
    TooYoung,
    InHistory,
    TooShort,
    Complexity,
    ConstraintViolation,
    Unwilling,
    UnknownUser,
    Other,
}

impl RejectReason {
    /// Stable code shown to users and used for message lookup.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidCurrentPassword => "PASSWORD_BAD_CURRENT",
            Self::InsufficientAccess => "PASSWORD_NO_ACCESS",
            Self::TooYoung => "PASSWORD_TOO_SOON",
            Self::InHistory => "PASSWORD_PREVIOUSLY_USED",
            Self::TooShort => "PASSWORD_TOO_SHORT",
            Self::Complexity => "PASSWORD_NOT_COMPLEX",
            Self::ConstraintViolation => "PASSWORD_BADPASSWORD",
            Self::Unwilling => "PASSWORD_UNWILLING",
            Self::UnknownUser => "PASSWORD_UNKNOWN_USER",
            Self::Other => "PASSWORD_UNKNOWN_VALIDATION",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("{identity} is not permitted to change its password")]
    PermissionDenied { identity: String },

    #[error("new password violates policy: {}", join_violations(.violations))]
    PolicyViolation { violations: Vec<PolicyViolation> },

    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(DirectoryError),

    #[error("directory rejected the new password ({reason}): {source}")]
    DirectoryRejected {
        reason: RejectReason,
        source: DirectoryError,
    },

    #[error("the current password is required to change the password")]
    MissingPriorCredential,

    #[error("replication did not converge after {attempts} checks in {elapsed_ms} ms")]
    ReplicationTimeout { elapsed_ms: u64, attempts: u32 },

    #[error("password changed, but post-change action {label} failed: {error:#}")]
    PostActionFailure {
        label: String,
        error: anyhow::Error,
        report: Box<ChangeReport>,
    },

    #[error("password policy misconfigured: {0}")]
    Configuration(#[from] PolicyError),
}

impl ChangeError {
    /// Whether the new password is in effect despite the error.
    #[must_use]
    pub fn password_changed(&self) -> bool {
        matches!(self, Self::PostActionFailure { .. })
    }

    /// Whether retrying the whole operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DirectoryUnavailable(_))
    }

    /// Stable code shown to users.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "UNAUTHORIZED",
            Self::PolicyViolation { .. } => "PASSWORD_POLICY_VIOLATION",
            Self::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            Self::DirectoryRejected { reason, .. } => reason.code(),
            Self::MissingPriorCredential => "PASSWORD_MISSING_CURRENT",
            Self::ReplicationTimeout { .. } => "REPLICATION_TIMEOUT",
            Self::PostActionFailure { .. } => "POST_ACTION_FAILURE",
            Self::Configuration(_) => "CONFIG_ERROR",
        }
    }

    /// The report of the committed change, for `PostActionFailure`.
    #[must_use]
    pub fn report(&self) -> Option<&ChangeReport> {
        match self {
            Self::PostActionFailure { report, .. } => Some(&**report),
            _ => None,
        }
    }
}

fn join_violations(violations: &[PolicyViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Translate a directory failure into the change taxonomy.
#[must_use]
pub fn map_directory_error(error: DirectoryError) -> ChangeError {
    if error.code.is_transient() {
        return ChangeError::DirectoryUnavailable(error);
    }

    let reason = match error.code {
        DirectoryErrorCode::InvalidCredentials => RejectReason::InvalidCurrentPassword,
        DirectoryErrorCode::InsufficientAccess => RejectReason::InsufficientAccess,
        DirectoryErrorCode::PasswordTooYoung => RejectReason::TooYoung,
        DirectoryErrorCode::PasswordInHistory => RejectReason::InHistory,
        DirectoryErrorCode::PasswordTooShort => RejectReason::TooShort,
        DirectoryErrorCode::PasswordComplexity => RejectReason::Complexity,
        DirectoryErrorCode::ConstraintViolation => RejectReason::ConstraintViolation,
        DirectoryErrorCode::UnwillingToPerform => RejectReason::Unwilling,
        DirectoryErrorCode::NoSuchObject => RejectReason::UnknownUser,
        _ => RejectReason::Other,
    };

    ChangeError::DirectoryRejected {
        reason,
        source: error,
    }
}
