//! In-memory directory.
//!
//! Backs the command line `status` action and the test suites. Failures and
//! replication probe results can be scripted, and every mutating call is counted.

use super::{DirectoryClient, DirectoryError, DirectoryErrorCode, DirectoryResult};
use crate::policy::{PasswordPolicy, PolicySource};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct MemoryUser {
    password: SecretString,
    expired: bool,
    expiration_time: Option<DateTime<Utc>>,
    attributes: BTreeMap<String, String>,
    policy: Option<PasswordPolicy>,
}

impl MemoryUser {
    #[must_use]
    pub fn new(password: &str) -> Self {
        Self {
            password: SecretString::from(password.to_string()),
            expired: false,
            expiration_time: None,
            attributes: BTreeMap::new(),
            policy: None,
        }
    }

    #[must_use]
    pub fn with_expired(mut self, expired: bool) -> Self {
        self.expired = expired;
        self
    }

    #[must_use]
    pub fn with_expiration_time(mut self, time: DateTime<Utc>) -> Self {
        self.expiration_time = Some(time);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

#[derive(Debug, Default)]
struct Faults {
    change_password: Option<DirectoryError>,
    expiration_flag: Option<DirectoryError>,
    expiration_time: Option<DirectoryError>,
    marker: Option<DirectoryError>,
    policy_lookup: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, MemoryUser>>,
    markers: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    global_policy: PasswordPolicy,
    replication_script: Mutex<VecDeque<DirectoryResult<bool>>>,
    replicated_by_default: bool,
    faults: Mutex<Faults>,
    change_password_calls: AtomicUsize,
    marker_writes: AtomicUsize,
    replication_tests: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryDirectory {
    /// An empty directory whose replicas are always in sync.
    #[must_use]
    pub fn new() -> Self {
        Self {
            replicated_by_default: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_user(self, identity: &str, user: MemoryUser) -> Self {
        lock(&self.users).insert(identity.to_string(), user);
        self
    }

    #[must_use]
    pub fn with_global_policy(mut self, policy: PasswordPolicy) -> Self {
        self.global_policy = policy;
        self
    }

    /// Result of replication probes once the script is exhausted.
    #[must_use]
    pub fn with_replicated_by_default(mut self, replicated: bool) -> Self {
        self.replicated_by_default = replicated;
        self
    }

    /// Queue results returned by successive replication probes.
    #[must_use]
    pub fn with_replication_script<I>(self, results: I) -> Self
    where
        I: IntoIterator<Item = DirectoryResult<bool>>,
    {
        lock(&self.replication_script).extend(results);
        self
    }

    #[must_use]
    pub fn failing_change_password(self, error: DirectoryError) -> Self {
        lock(&self.faults).change_password = Some(error);
        self
    }

    #[must_use]
    pub fn failing_expiration_flag(self, error: DirectoryError) -> Self {
        lock(&self.faults).expiration_flag = Some(error);
        self
    }

    #[must_use]
    pub fn failing_expiration_time(self, error: DirectoryError) -> Self {
        lock(&self.faults).expiration_time = Some(error);
        self
    }

    #[must_use]
    pub fn failing_marker_write(self, error: DirectoryError) -> Self {
        lock(&self.faults).marker = Some(error);
        self
    }

    #[must_use]
    pub fn failing_policy_lookup(self, message: &str) -> Self {
        lock(&self.faults).policy_lookup = Some(message.to_string());
        self
    }

    /// Whether `candidate` is the stored password of `identity`.
    #[must_use]
    pub fn password_is(&self, identity: &str, candidate: &str) -> bool {
        lock(&self.users)
            .get(identity)
            .is_some_and(|user| user.password.expose_secret() == candidate)
    }

    #[must_use]
    pub fn attributes(&self, identity: &str) -> BTreeMap<String, String> {
        lock(&self.users)
            .get(identity)
            .map(|user| user.attributes.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn marker(&self, identity: &str, attribute: &str) -> Option<DateTime<Utc>> {
        lock(&self.markers)
            .get(&(identity.to_string(), attribute.to_string()))
            .copied()
    }

    #[must_use]
    pub fn change_password_calls(&self) -> usize {
        self.change_password_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn marker_writes(&self) -> usize {
        self.marker_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn replication_tests(&self) -> usize {
        self.replication_tests.load(Ordering::SeqCst)
    }

    fn with_existing_user<T>(
        &self,
        identity: &str,
        f: impl FnOnce(&mut MemoryUser) -> DirectoryResult<T>,
    ) -> DirectoryResult<T> {
        let mut users = lock(&self.users);
        let user = users.get_mut(identity).ok_or_else(|| {
            DirectoryError::new(DirectoryErrorCode::NoSuchObject, format!("{identity} not found"))
        })?;
        f(user)
    }
}

impl DirectoryClient for MemoryDirectory {
    fn change_password(
        &self,
        identity: &str,
        old: &SecretString,
        new: &SecretString,
    ) -> DirectoryResult<()> {
        self.change_password_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.faults).change_password.clone() {
            return Err(error);
        }

        self.with_existing_user(identity, |user| {
            if user.password.expose_secret() != old.expose_secret() {
                return Err(DirectoryError::new(
                    DirectoryErrorCode::InvalidCredentials,
                    "old password does not match",
                ));
            }
            user.password = new.clone();
            user.expired = false;
            debug!(identity, "password replaced");
            Ok(())
        })
    }

    fn read_expiration_flag(&self, identity: &str) -> DirectoryResult<bool> {
        if let Some(error) = lock(&self.faults).expiration_flag.clone() {
            return Err(error);
        }
        self.with_existing_user(identity, |user| Ok(user.expired))
    }

    fn read_expiration_time(&self, identity: &str) -> DirectoryResult<Option<DateTime<Utc>>> {
        if let Some(error) = lock(&self.faults).expiration_time.clone() {
            return Err(error);
        }
        self.with_existing_user(identity, |user| Ok(user.expiration_time))
    }

    fn write_marker_attribute(
        &self,
        identity: &str,
        attribute: &str,
        timestamp: DateTime<Utc>,
    ) -> DirectoryResult<()> {
        self.marker_writes.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.faults).marker.clone() {
            return Err(error);
        }
        self.with_existing_user(identity, |_| Ok(()))?;

        lock(&self.markers).insert((identity.to_string(), attribute.to_string()), timestamp);
        Ok(())
    }

    fn test_replication(&self, _identity: &str, _attribute: &str) -> DirectoryResult<bool> {
        self.replication_tests.fetch_add(1, Ordering::SeqCst);

        lock(&self.replication_script)
            .pop_front()
            .unwrap_or(Ok(self.replicated_by_default))
    }
}

impl PolicySource for MemoryDirectory {
    fn read_global_policy(&self) -> anyhow::Result<PasswordPolicy> {
        Ok(self.global_policy.clone())
    }

    fn read_directory_assigned_policy(
        &self,
        identity: &str,
    ) -> anyhow::Result<Option<PasswordPolicy>> {
        if let Some(message) = lock(&self.faults).policy_lookup.clone() {
            return Err(anyhow!(message));
        }

        Ok(lock(&self.users)
            .get(identity)
            .and_then(|user| user.policy.clone()))
    }
}
