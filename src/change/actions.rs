//! Collaborators invoked by the change pipeline.
//!
//! Implementations are synchronous; anything slow (remote calls, mail) is the
//! implementation's business. `Log*` variants log and succeed, which is what a
//! deployment without the corresponding backend wants.

use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

pub trait PermissionChecker: Send + Sync {
    fn has_change_password_permission(&self, identity: &str) -> bool;
}

/// Shared store of previously used passwords.
pub trait HistoryStore: Send + Sync {
    fn record_past_password(&self, identity: &str, password: &SecretString) -> Result<()>;
}

/// A registered follow-up that must succeed for a change to be complete.
pub trait PostChangeAction: Send + Sync {
    /// Name used when reporting a failure.
    fn label(&self) -> &str;

    fn apply(&self, identity: &str, new_password: &SecretString) -> Result<()>;
}

pub trait NotificationSender: Send + Sync {
    fn send_change_notice(&self, identity: &str) -> Result<()>;
}

/// Out-of-process hook told about every completed change.
pub trait ChangeListener: Send + Sync {
    fn label(&self) -> &str;

    fn password_changed(&self, identity: &str, new_password: &SecretString) -> Result<()>;
}

/// Grants the change capability to everyone.
#[derive(Clone, Debug)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_change_password_permission(&self, _identity: &str) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send_change_notice(&self, identity: &str) -> Result<()> {
        info!(identity, "password change notice sent");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct LogChangeListener;

impl ChangeListener for LogChangeListener {
    fn label(&self) -> &str {
        "log"
    }

    fn password_changed(&self, identity: &str, _new_password: &SecretString) -> Result<()> {
        info!(identity, "password changed");
        Ok(())
    }
}
