use anyhow::{anyhow, Result};
use pwself::change::{
    AllowAll, ChangeListener, HistoryStore, LogChangeListener, LogNotificationSender,
    NotificationSender, PermissionChecker, PostChangeAction, RejectReason,
};
use pwself::directory::{DirectoryError, DirectoryErrorCode, MemoryDirectory, MemoryUser};
use pwself::{
    ChangeConfig, ChangeError, ChangeOrchestrator, ChangeRequest, PasswordPolicy, PolicyRule,
    ReplicationStatistics,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const USER: &str = "uid=jdoe,ou=people,dc=example,dc=com";
const OLD: &str = "0ld-Passw0rd";
const NEW: &str = "n3w-Passw0rd";

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

fn directory() -> MemoryDirectory {
    MemoryDirectory::new().with_user(USER, MemoryUser::new(OLD))
}

fn policy() -> PasswordPolicy {
    PasswordPolicy::from_pairs([(PolicyRule::MinLength, "8"), (PolicyRule::MinNumeric, "1")])
}

fn request() -> ChangeRequest {
    ChangeRequest::new(USER, secret(NEW), policy()).with_old_password(secret(OLD))
}

/// Fast polling so tests finish in milliseconds.
fn fast_config() -> ChangeConfig {
    ChangeConfig::new()
        .with_initial_delay_ms(0)
        .with_cycle_delay_ms(10)
        .with_max_wait_ms(50)
}

fn orchestrator(config: ChangeConfig) -> ChangeOrchestrator {
    ChangeOrchestrator::new(config, Arc::new(AllowAll))
}

struct DenyAll;

impl PermissionChecker for DenyAll {
    fn has_change_password_permission(&self, _identity: &str) -> bool {
        false
    }
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

struct RecordingHistory {
    recorder: Arc<Recorder>,
    fail: bool,
}

impl HistoryStore for RecordingHistory {
    fn record_past_password(&self, identity: &str, password: &SecretString) -> Result<()> {
        self.recorder
            .push(format!("history:{identity}:{}", password.expose_secret()));
        if self.fail {
            return Err(anyhow!("history store offline"));
        }
        Ok(())
    }
}

struct RecordingAction {
    label: &'static str,
    recorder: Arc<Recorder>,
    fail: bool,
}

impl PostChangeAction for RecordingAction {
    fn label(&self) -> &str {
        self.label
    }

    fn apply(&self, _identity: &str, _new_password: &SecretString) -> Result<()> {
        self.recorder.push(format!("action:{}", self.label));
        if self.fail {
            return Err(anyhow!("{} sync failed", self.label));
        }
        Ok(())
    }
}

struct RecordingNotifier {
    recorder: Arc<Recorder>,
    fail: bool,
}

impl NotificationSender for RecordingNotifier {
    fn send_change_notice(&self, identity: &str) -> Result<()> {
        self.recorder.push(format!("notify:{identity}"));
        if self.fail {
            return Err(anyhow!("smtp unreachable"));
        }
        Ok(())
    }
}

struct RecordingListener {
    recorder: Arc<Recorder>,
    fail: bool,
}

impl ChangeListener for RecordingListener {
    fn label(&self) -> &str {
        "recording"
    }

    fn password_changed(&self, identity: &str, new_password: &SecretString) -> Result<()> {
        self.recorder
            .push(format!("listener:{identity}:{}", new_password.expose_secret()));
        if self.fail {
            return Err(anyhow!("webhook returned 500"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn changes_password_and_reports() {
    let directory = directory();
    let report = orchestrator(fast_config())
        .change(&directory, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();

    assert!(directory.password_is(USER, NEW));
    assert_eq!(report.identity, USER);
    let replication = report.replication.unwrap();
    assert!(replication.converged);
    assert_eq!(replication.attempts_made, 1);
    assert!(directory.marker(USER, "pwselfLastPwdUpdate").is_some());
}

#[tokio::test]
async fn missing_old_password_never_reaches_the_directory() {
    let directory = directory();
    let orchestrator = orchestrator(fast_config());

    let without = ChangeRequest::new(USER, secret(NEW), policy());
    let err = orchestrator.change(&directory, without).await.unwrap_err();
    assert!(matches!(err, ChangeError::MissingPriorCredential));

    let empty = ChangeRequest::new(USER, secret(NEW), policy()).with_old_password(secret(""));
    let err = orchestrator.change(&directory, empty).await.unwrap_err();
    assert!(matches!(err, ChangeError::MissingPriorCredential));
    assert!(!err.password_changed());

    assert_eq!(directory.change_password_calls(), 0);
    assert!(directory.password_is(USER, OLD));
}

#[tokio::test]
async fn missing_old_password_wins_over_policy_violation() {
    let directory = directory();
    let weak = ChangeRequest::new(USER, secret("x"), policy());

    let err = orchestrator(fast_config())
        .change(&directory, weak)
        .await
        .unwrap_err();
    assert!(matches!(err, ChangeError::MissingPriorCredential));
}

#[tokio::test]
async fn permission_denied_aborts_first() {
    let directory = directory();
    let orchestrator = ChangeOrchestrator::new(fast_config(), Arc::new(DenyAll));

    let err = orchestrator.change(&directory, request()).await.unwrap_err();
    assert!(matches!(err, ChangeError::PermissionDenied { .. }));
    assert_eq!(err.code(), "UNAUTHORIZED");
    assert_eq!(directory.change_password_calls(), 0);
}

#[tokio::test]
async fn policy_violation_lists_every_rule() {
    let directory = directory();
    let weak = ChangeRequest::new(USER, secret("short"), policy()).with_old_password(secret(OLD));

    let err = orchestrator(fast_config())
        .change(&directory, weak)
        .await
        .unwrap_err();

    let ChangeError::PolicyViolation { violations } = err else {
        panic!("expected policy violation");
    };
    let rules: Vec<PolicyRule> = violations.iter().map(|v| v.rule).collect();
    assert!(rules.contains(&PolicyRule::MinLength));
    assert!(rules.contains(&PolicyRule::MinNumeric));
    assert_eq!(directory.change_password_calls(), 0);
}

#[tokio::test]
async fn reusing_the_current_password_is_rejected() {
    let directory = directory();
    let same = ChangeRequest::new(USER, secret(OLD), policy()).with_old_password(secret(OLD));

    let err = orchestrator(fast_config())
        .change(&directory, same)
        .await
        .unwrap_err();
    assert!(matches!(err, ChangeError::PolicyViolation { .. }));
}

#[tokio::test]
async fn directory_rejection_is_mapped() {
    let directory = directory().failing_change_password(DirectoryError::new(
        DirectoryErrorCode::PasswordInHistory,
        "password in history",
    ));

    let err = orchestrator(fast_config())
        .change(&directory, request())
        .await
        .unwrap_err();

    match err {
        ChangeError::DirectoryRejected { reason, .. } => {
            assert_eq!(reason, RejectReason::InHistory);
        }
        other => panic!("expected directory rejection, got {other}"),
    }
}

#[tokio::test]
async fn wrong_old_password_is_rejected_by_the_directory() {
    let directory = directory();
    let wrong = ChangeRequest::new(USER, secret(NEW), policy()).with_old_password(secret("guess1234"));

    let err = orchestrator(fast_config())
        .change(&directory, wrong)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PASSWORD_BAD_CURRENT");
    assert!(directory.password_is(USER, OLD));
}

#[tokio::test]
async fn unreachable_directory_is_transient() {
    let directory = directory().failing_change_password(DirectoryError::new(
        DirectoryErrorCode::ServerDown,
        "connection reset",
    ));

    let err = orchestrator(fast_config())
        .change(&directory, request())
        .await
        .unwrap_err();
    assert!(matches!(err, ChangeError::DirectoryUnavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn single_node_skips_replication_checks() {
    let directory = directory();
    let report = orchestrator(fast_config())
        .change(&directory, request().with_replicas(["ldap1"]))
        .await
        .unwrap();

    assert!(report.replication.is_none());
    assert_eq!(directory.marker_writes(), 0);
    assert_eq!(directory.replication_tests(), 0);
}

#[tokio::test]
async fn zero_max_wait_skips_replication_checks() {
    let directory = directory();
    let config = fast_config().with_max_wait_ms(0);

    let report = orchestrator(config)
        .change(&directory, request().with_replicas(["ldap1", "ldap2", "ldap3"]))
        .await
        .unwrap();

    assert!(report.replication.is_none());
    assert_eq!(directory.replication_tests(), 0);
}

#[tokio::test]
async fn unconverged_replicas_do_not_fail_the_change() {
    let directory = directory().with_replicated_by_default(false);
    let started = Instant::now();

    let report = orchestrator(fast_config())
        .change(&directory, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();

    let replication = report.replication.unwrap();
    assert!(!replication.converged);
    assert!(replication.attempts_made >= 2);
    assert!(replication.elapsed_ms >= 50);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(directory.password_is(USER, NEW));
}

#[tokio::test]
async fn replication_probe_errors_keep_polling() {
    let directory = directory().with_replication_script([
        Err(DirectoryError::new(DirectoryErrorCode::Busy, "busy")),
        Ok(false),
        Ok(true),
    ]);

    let report = orchestrator(fast_config().with_max_wait_ms(1_000))
        .change(&directory, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();

    let replication = report.replication.unwrap();
    assert!(replication.converged);
    assert_eq!(replication.attempts_made, 3);
}

#[tokio::test]
async fn marker_write_failure_skips_polling() {
    let directory = directory().failing_marker_write(DirectoryError::new(
        DirectoryErrorCode::InsufficientAccess,
        "no write access to marker",
    ));

    let report = orchestrator(fast_config())
        .change(&directory, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();

    assert!(report.replication.is_none());
    assert_eq!(directory.replication_tests(), 0);
    assert!(directory.password_is(USER, NEW));
}

#[tokio::test]
async fn min_wait_is_honoured_without_replicas() {
    let directory = directory();
    let config = fast_config().with_min_wait_ms(60).with_min_wait_step_ms(20);
    let started = Instant::now();

    orchestrator(config)
        .change(&directory, request())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn operation_timeout_bounds_the_wait() {
    let directory = directory().with_replicated_by_default(false);
    let config = ChangeConfig::new()
        .with_initial_delay_ms(0)
        .with_cycle_delay_ms(10)
        .with_max_wait_ms(10_000)
        .with_min_wait_ms(10_000)
        .with_operation_timeout_ms(80);
    let started = Instant::now();

    let report = orchestrator(config)
        .change(&directory, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!report.replication.unwrap().converged);
}

#[tokio::test]
async fn post_action_failure_reports_a_committed_change() {
    let directory = directory();
    let recorder = Arc::new(Recorder::default());

    let orchestrator = orchestrator(fast_config())
        .with_post_action(Arc::new(RecordingAction {
            label: "first",
            recorder: recorder.clone(),
            fail: false,
        }))
        .with_post_action(Arc::new(RecordingAction {
            label: "mail-sync",
            recorder: recorder.clone(),
            fail: true,
        }))
        .with_post_action(Arc::new(RecordingAction {
            label: "never",
            recorder: recorder.clone(),
            fail: false,
        }))
        .with_change_listener(Arc::new(RecordingListener {
            recorder: recorder.clone(),
            fail: false,
        }));

    let err = orchestrator.change(&directory, request()).await.unwrap_err();

    assert!(err.password_changed());
    assert_eq!(err.code(), "POST_ACTION_FAILURE");
    match &err {
        ChangeError::PostActionFailure { label, report, .. } => {
            assert_eq!(label, "mail-sync");
            assert_eq!(report.identity, USER);
        }
        other => panic!("expected post action failure, got {other}"),
    }
    assert!(err.report().is_some());
    assert!(directory.password_is(USER, NEW));

    let calls = recorder.calls();
    assert!(calls.contains(&"action:first".to_string()));
    assert!(calls.contains(&"action:mail-sync".to_string()));
    assert!(!calls.contains(&"action:never".to_string()));
    assert!(calls.contains(&format!("listener:{USER}:{NEW}")));
}

#[tokio::test]
async fn history_notification_and_listener_failures_are_swallowed() {
    let directory = directory();
    let recorder = Arc::new(Recorder::default());

    let orchestrator = orchestrator(fast_config())
        .with_history_store(Arc::new(RecordingHistory {
            recorder: recorder.clone(),
            fail: true,
        }))
        .with_notification_sender(Arc::new(RecordingNotifier {
            recorder: recorder.clone(),
            fail: true,
        }))
        .with_change_listener(Arc::new(RecordingListener {
            recorder: recorder.clone(),
            fail: true,
        }));

    orchestrator.change(&directory, request()).await.unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            format!("history:{USER}:{OLD}"),
            format!("notify:{USER}"),
            format!("listener:{USER}:{NEW}"),
        ]
    );
}

#[tokio::test]
async fn history_can_be_disabled() {
    let directory = directory();
    let recorder = Arc::new(Recorder::default());

    orchestrator(fast_config().with_history_enabled(false))
        .with_history_store(Arc::new(RecordingHistory {
            recorder: recorder.clone(),
            fail: false,
        }))
        .change(&directory, request())
        .await
        .unwrap();

    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn log_collaborators_are_accepted() {
    let directory = directory();

    orchestrator(fast_config())
        .with_notification_sender(Arc::new(LogNotificationSender))
        .with_change_listener(Arc::new(LogChangeListener))
        .change(&directory, request())
        .await
        .unwrap();

    assert!(directory.password_is(USER, NEW));
}

#[tokio::test]
async fn statistics_are_shared_across_changes() {
    let statistics = Arc::new(ReplicationStatistics::new());
    let first = directory();
    let second = directory().with_replicated_by_default(false);

    let orchestrator = orchestrator(fast_config()).with_statistics(statistics.clone());
    orchestrator
        .change(&first, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();
    orchestrator
        .change(&second, request().with_replicas(["ldap1", "ldap2"]))
        .await
        .unwrap();

    let snapshot = statistics.snapshot();
    assert_eq!(snapshot.checks, 2);
    assert_eq!(snapshot.converged, 1);
    assert_eq!(snapshot.timed_out, 1);
}
