//! Effective policy resolution.
//!
//! The administrator configured global policy is always the merge base, the
//! directory assigned policy (when there is one) is the overlay.

use super::PasswordPolicy;
use anyhow::Result;
use tracing::{debug, instrument, warn};

/// Where policies come from.
pub trait PolicySource: Send + Sync {
    fn read_global_policy(&self) -> Result<PasswordPolicy>;

    /// The policy the directory assigns to `identity`, `None` if it assigns none.
    fn read_directory_assigned_policy(&self, identity: &str) -> Result<Option<PasswordPolicy>>;
}

#[derive(Clone, Copy, Debug)]
pub struct ResolverConfig {
    directory_policy_enabled: bool,
}

impl ResolverConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            directory_policy_enabled: true,
        }
    }

    #[must_use]
    pub fn with_directory_policy_enabled(mut self, enabled: bool) -> Self {
        self.directory_policy_enabled = enabled;
        self
    }

    #[must_use]
    pub fn directory_policy_enabled(&self) -> bool {
        self.directory_policy_enabled
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine the global policy with an optional directory assigned one.
#[must_use]
pub fn resolve(global: &PasswordPolicy, directory: Option<&PasswordPolicy>) -> PasswordPolicy {
    match directory {
        Some(directory) => global.merge(directory),
        None => global.clone(),
    }
}

/// Resolve the effective policy of `identity` from `source`.
///
/// Failing to read the directory assigned policy is logged and treated as if
/// the directory assigned none.
///
/// # Errors
/// Returns an error if the global policy cannot be read.
#[instrument(skip(source))]
pub fn resolve_for_user(
    source: &dyn PolicySource,
    identity: &str,
    config: &ResolverConfig,
) -> Result<PasswordPolicy> {
    let global = source.read_global_policy()?;

    if !config.directory_policy_enabled() {
        debug!("directory policy lookup disabled, using global policy");
        return Ok(global);
    }

    let directory = match source.read_directory_assigned_policy(identity) {
        Ok(policy) => policy,
        Err(e) => {
            warn!("error reading directory policy, using global policy: {e:#}");
            None
        }
    };

    let effective = resolve(&global, directory.as_ref());
    debug!(policy = %effective, "resolved effective password policy");

    Ok(effective)
}
