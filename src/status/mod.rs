//! Password status evaluation.
//!
//! Each check reads one piece of state and can only raise its own flag. A
//! check that cannot read its input leaves the flag unset and logs the reason.

use crate::directory::DirectoryClient;
use crate::policy::{PasswordPolicy, PasswordValidator, PolicyRule, ValidationContext};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use tracing::{debug, instrument, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStatus {
    pub violates_policy: bool,
    pub expired: bool,
    pub pre_expired: bool,
    pub warn_period: bool,
}

impl PasswordStatus {
    /// Whether the user should be sent to change their password.
    #[must_use]
    pub fn requires_change(&self) -> bool {
        self.violates_policy || self.expired || self.pre_expired
    }
}

impl fmt::Display for PasswordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "violatesPolicy={} expired={} preExpired={} warnPeriod={}",
            self.violates_policy, self.expired, self.pre_expired, self.warn_period
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StatusConfig {
    pre_expire_window: Duration,
    warn_window: Duration,
}

impl StatusConfig {
    /// Defaults: 5 day pre-expire window, no warn window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pre_expire_window: Duration::days(5),
            warn_window: Duration::zero(),
        }
    }

    #[must_use]
    pub fn with_pre_expire_window_seconds(mut self, seconds: i64) -> Self {
        self.pre_expire_window = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_warn_window_seconds(mut self, seconds: i64) -> Self {
        self.warn_window = Duration::seconds(seconds);
        self
    }

    /// Clamp negative windows to zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            pre_expire_window: self.pre_expire_window.max(Duration::zero()),
            warn_window: self.warn_window.max(Duration::zero()),
        }
    }

    #[must_use]
    pub fn pre_expire_window(&self) -> Duration {
        self.pre_expire_window
    }

    #[must_use]
    pub fn warn_window(&self) -> Duration {
        self.warn_window
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatusEvaluator<'a> {
    directory: &'a dyn DirectoryClient,
    config: StatusConfig,
}

impl<'a> StatusEvaluator<'a> {
    #[must_use]
    pub fn new(directory: &'a dyn DirectoryClient, config: StatusConfig) -> Self {
        Self {
            directory,
            config: config.normalize(),
        }
    }

    /// Compute the status of `identity`'s password at `now`.
    #[instrument(skip(self, current_password, policy))]
    pub fn evaluate(
        &self,
        identity: &str,
        current_password: Option<&SecretString>,
        policy: &PasswordPolicy,
        now: DateTime<Utc>,
    ) -> PasswordStatus {
        let mut status = PasswordStatus::default();

        if violates_policy(current_password, policy) {
            status.violates_policy = true;
        }

        match self.directory.read_expiration_flag(identity) {
            Ok(true) => status.expired = true,
            Ok(false) => {}
            Err(e) => warn!("unable to read password expiration flag: {e}"),
        }

        match self.directory.read_expiration_time(identity) {
            Ok(Some(expiration)) => {
                let diff = expiration - now;
                if diff > Duration::zero() {
                    if diff < self.config.pre_expire_window {
                        status.pre_expired = true;
                    }
                    if diff < self.config.warn_window {
                        status.warn_period = true;
                    }
                }
            }
            Ok(None) => debug!("no password expiration time"),
            Err(e) => warn!("unable to read password expiration time: {e}"),
        }

        debug!(%status, "password status evaluated");

        status
    }
}

fn violates_policy(current_password: Option<&SecretString>, policy: &PasswordPolicy) -> bool {
    let enforce = match policy.helper().read_bool(PolicyRule::EnforceAtLogin) {
        Ok(enforce) => enforce,
        Err(e) => {
            warn!("{e}");
            return false;
        }
    };

    let Some(password) = current_password.filter(|p| !p.expose_secret().is_empty()) else {
        return false;
    };
    if !enforce {
        return false;
    }

    match PasswordValidator::new(policy).first_violation(
        password.expose_secret(),
        &ValidationContext::default(),
    ) {
        Ok(Some(violation)) => {
            debug!(rule = %violation.rule, "current password violates policy");
            true
        }
        Ok(None) => false,
        Err(e) => {
            warn!("error validating current password, treating it as compliant: {e}");
            false
        }
    }
}
