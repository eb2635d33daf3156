//! Password change pipeline.
//!
//! Flow Overview: permission check, policy validation, directory write,
//! replication wait, post-change actions. Anything failing before the write
//! aborts with nothing changed. After the write the change is committed: the
//! replication wait never fails the operation, and of the post-change steps
//! only the registered post-change actions can turn the outcome into
//! [`ChangeError::PostActionFailure`].
//!
//! The directory handle is borrowed for the duration of one change. Callers
//! must not run two changes for the same identity concurrently and should drop
//! the connection afterwards, since it was bound with the old password.

use super::actions::{
    ChangeListener, HistoryStore, NotificationSender, PermissionChecker, PostChangeAction,
};
use super::error::map_directory_error;
use super::replication::{await_convergence, enforce_min_wait, millis};
use super::{ChangeConfig, ChangeError, ReplicationOutcome, ReplicationStatistics};
use crate::directory::DirectoryClient;
use crate::policy::{PasswordPolicy, PasswordValidator, ValidationContext};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Everything one change needs, passed explicitly.
#[derive(Clone, Debug)]
pub struct ChangeRequest {
    pub identity: String,
    pub old_password: Option<SecretString>,
    pub new_password: SecretString,
    pub policy: PasswordPolicy,
    /// Directory nodes the write has to reach.
    pub replicas: Vec<String>,
    /// User attribute values some policy rules compare against.
    pub attributes: BTreeMap<String, String>,
}

impl ChangeRequest {
    #[must_use]
    pub fn new(identity: &str, new_password: SecretString, policy: PasswordPolicy) -> Self {
        Self {
            identity: identity.to_string(),
            old_password: None,
            new_password,
            policy,
            replicas: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_old_password(mut self, old_password: SecretString) -> Self {
        self.old_password = Some(old_password);
        self
    }

    #[must_use]
    pub fn with_replicas<I, S>(mut self, replicas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replicas = replicas.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    fn known_old_password(&self) -> Option<&SecretString> {
        self.old_password
            .as_ref()
            .filter(|old| !old.expose_secret().is_empty())
    }
}

/// Summary of a committed change.
#[derive(Clone, Debug)]
pub struct ChangeReport {
    pub operation_id: Ulid,
    pub identity: String,
    /// `None` when no convergence check ran.
    pub replication: Option<ReplicationOutcome>,
    pub elapsed_ms: u64,
}

pub struct ChangeOrchestrator {
    config: ChangeConfig,
    permissions: Arc<dyn PermissionChecker>,
    history: Option<Arc<dyn HistoryStore>>,
    post_actions: Vec<Arc<dyn PostChangeAction>>,
    notifier: Option<Arc<dyn NotificationSender>>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    statistics: Arc<ReplicationStatistics>,
}

impl ChangeOrchestrator {
    #[must_use]
    pub fn new(config: ChangeConfig, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self {
            config: config.normalize(),
            permissions,
            history: None,
            post_actions: Vec::new(),
            notifier: None,
            listeners: Vec::new(),
            statistics: Arc::new(ReplicationStatistics::new()),
        }
    }

    #[must_use]
    pub fn with_history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Register a post-change action, actions run in registration order.
    #[must_use]
    pub fn with_post_action(mut self, action: Arc<dyn PostChangeAction>) -> Self {
        self.post_actions.push(action);
        self
    }

    #[must_use]
    pub fn with_notification_sender(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_change_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Share replication counters with other orchestrators or a reporter.
    #[must_use]
    pub fn with_statistics(mut self, statistics: Arc<ReplicationStatistics>) -> Self {
        self.statistics = statistics;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ChangeConfig {
        &self.config
    }

    #[must_use]
    pub fn statistics(&self) -> &Arc<ReplicationStatistics> {
        &self.statistics
    }

    /// Run one password change.
    ///
    /// # Errors
    /// Returns an error without touching the directory for permission, policy
    /// and missing-credential failures, the mapped directory error if the write
    /// fails, and [`ChangeError::PostActionFailure`] if the password was changed
    /// but a registered post-change action failed.
    pub async fn change(
        &self,
        directory: &dyn DirectoryClient,
        request: ChangeRequest,
    ) -> Result<ChangeReport, ChangeError> {
        let operation_id = Ulid::new();
        let span = info_span!(
            "password.change",
            operation = %operation_id,
            identity = %request.identity
        );

        self.run(directory, request, operation_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        directory: &dyn DirectoryClient,
        request: ChangeRequest,
        operation_id: Ulid,
    ) -> Result<ChangeReport, ChangeError> {
        let started = Instant::now();
        let deadline = self.config.operation_timeout().map(|timeout| started + timeout);
        let identity = request.identity.as_str();

        if !self.permissions.has_change_password_permission(identity) {
            warn!("change password permission denied");
            return Err(ChangeError::PermissionDenied {
                identity: identity.to_string(),
            });
        }

        let Some(old_password) = request.known_old_password() else {
            warn!("current password unknown, refusing to change password");
            return Err(ChangeError::MissingPriorCredential);
        };

        let context = ValidationContext {
            old_password: Some(old_password.expose_secret()),
            attributes: Some(&request.attributes),
        };
        let violations = PasswordValidator::new(&request.policy)
            .violations(request.new_password.expose_secret(), &context)?;
        if !violations.is_empty() {
            info!(violations = violations.len(), "new password rejected by policy");
            return Err(ChangeError::PolicyViolation { violations });
        }

        let write_started = Instant::now();
        directory
            .change_password(identity, old_password, &request.new_password)
            .map_err(|e| {
                error!("directory password change failed: {e}");
                map_directory_error(e)
            })?;
        info!("password changed in directory");

        let replication = self
            .wait_for_replicas(directory, &request, deadline)
            .await;
        enforce_min_wait(&self.config, write_started, deadline).await;

        let mut report = ChangeReport {
            operation_id,
            identity: identity.to_string(),
            replication,
            elapsed_ms: 0,
        };

        let failure = self.post_change(&request, old_password);
        report.elapsed_ms = millis(started.elapsed());

        match failure {
            Some((label, error)) => Err(ChangeError::PostActionFailure {
                label,
                error,
                report: Box::new(report),
            }),
            None => {
                info!(elapsed_ms = report.elapsed_ms, "password change complete");
                Ok(report)
            }
        }
    }

    async fn wait_for_replicas(
        &self,
        directory: &dyn DirectoryClient,
        request: &ChangeRequest,
        deadline: Option<Instant>,
    ) -> Option<ReplicationOutcome> {
        if !self.config.waits_for_replication(request.replicas.len()) {
            debug!(
                replicas = request.replicas.len(),
                "skipping replication wait"
            );
            return None;
        }

        let outcome =
            await_convergence(directory, &request.identity, &self.config, deadline).await?;
        self.statistics.record(&outcome);

        if outcome.converged {
            info!(
                elapsed_ms = outcome.elapsed_ms,
                attempts = outcome.attempts_made,
                "replicas converged"
            );
        } else {
            let timeout = ChangeError::ReplicationTimeout {
                elapsed_ms: outcome.elapsed_ms,
                attempts: outcome.attempts_made,
            };
            warn!("{timeout}");
        }

        Some(outcome)
    }

    /// Run every post-change step, returning the failed post-change action if any.
    fn post_change(
        &self,
        request: &ChangeRequest,
        old_password: &SecretString,
    ) -> Option<(String, anyhow::Error)> {
        let identity = request.identity.as_str();

        if self.config.history_enabled() {
            if let Some(history) = &self.history {
                match history.record_past_password(identity, old_password) {
                    Ok(()) => debug!("old password added to history"),
                    Err(e) => warn!("unable to record password history: {e:#}"),
                }
            }
        }

        let mut failure = None;
        for action in &self.post_actions {
            if let Err(e) = action.apply(identity, &request.new_password) {
                error!(action = action.label(), "post-change action failed: {e:#}");
                failure = Some((action.label().to_string(), e));
                break;
            }
            debug!(action = action.label(), "post-change action complete");
        }

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send_change_notice(identity) {
                warn!("unable to send change notification: {e:#}");
            }
        }

        for listener in &self.listeners {
            if let Err(e) = listener.password_changed(identity, &request.new_password) {
                warn!(listener = listener.label(), "change listener failed: {e:#}");
            }
        }

        failure
    }
}
