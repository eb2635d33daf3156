use chrono::{Duration, Utc};
use pwself::directory::{MemoryDirectory, MemoryUser};
use pwself::policy::{resolve_for_user, ResolverConfig, ValidationContext};
use pwself::{PasswordPolicy, PasswordValidator, PolicyRule, StatusConfig, StatusEvaluator};
use secrecy::SecretString;

const USER: &str = "uid=jdoe,ou=people,dc=example,dc=com";

fn global() -> PasswordPolicy {
    PasswordPolicy::from_pairs([
        (PolicyRule::MinLength, "8"),
        (PolicyRule::DisallowedValues, "password"),
        (PolicyRule::ChangeMessage, ""),
    ])
}

fn assigned() -> PasswordPolicy {
    PasswordPolicy::from_pairs([
        (PolicyRule::MinLength, "10"),
        (PolicyRule::MaxLength, "64"),
        (PolicyRule::DisallowedValues, "letmein"),
        (PolicyRule::ChangeMessage, "Use a passphrase"),
        (PolicyRule::EnforceAtLogin, "true"),
    ])
}

fn directory() -> MemoryDirectory {
    MemoryDirectory::new()
        .with_global_policy(global())
        .with_user(USER, MemoryUser::new("short1").with_policy(assigned()))
}

#[test]
fn effective_policy_merges_directory_over_global() {
    let effective = resolve_for_user(&directory(), USER, &ResolverConfig::new()).unwrap();

    assert_eq!(effective.get(PolicyRule::MinLength), Some("10"));
    assert_eq!(effective.get(PolicyRule::MaxLength), Some("64"));
    assert_eq!(
        effective.get(PolicyRule::DisallowedValues),
        Some("letmein\npassword")
    );
    assert_eq!(effective.get(PolicyRule::ChangeMessage), Some("Use a passphrase"));
    // BOOLEAN_AND against the global default of false
    assert_eq!(effective.get(PolicyRule::EnforceAtLogin), Some("false"));
}

#[test]
fn user_without_assigned_policy_gets_global() {
    let directory = directory().with_user("uid=other", MemoryUser::new("pw"));

    let effective = resolve_for_user(&directory, "uid=other", &ResolverConfig::new()).unwrap();
    assert_eq!(effective, global());
}

#[test]
fn policy_lookup_failure_gets_global() {
    let directory = directory().failing_policy_lookup("size limit exceeded");

    let effective = resolve_for_user(&directory, USER, &ResolverConfig::new()).unwrap();
    assert_eq!(effective, global());
}

#[test]
fn effective_policy_validates_candidates() {
    let effective = resolve_for_user(&directory(), USER, &ResolverConfig::new()).unwrap();
    let validator = PasswordValidator::new(&effective);
    let context = ValidationContext::default();

    let rules: Vec<PolicyRule> = validator
        .violations("letmein", &context)
        .unwrap()
        .into_iter()
        .map(|v| v.rule)
        .collect();
    assert!(rules.contains(&PolicyRule::MinLength));
    assert!(rules.contains(&PolicyRule::DisallowedValues));

    assert!(validator
        .violations("correct horse battery", &context)
        .unwrap()
        .is_empty());
}

#[test]
fn status_reflects_directory_state_and_policy() {
    let now = Utc::now();
    let policy = PasswordPolicy::from_pairs([
        (PolicyRule::MinLength, "10"),
        (PolicyRule::EnforceAtLogin, "true"),
    ]);
    let directory = MemoryDirectory::new().with_user(
        USER,
        MemoryUser::new("short1")
            .with_expired(true)
            .with_expiration_time(now + Duration::hours(1)),
    );
    let config = StatusConfig::new()
        .with_pre_expire_window_seconds(86_400)
        .with_warn_window_seconds(7_200);

    let status = StatusEvaluator::new(&directory, config).evaluate(
        USER,
        Some(&SecretString::from("short1".to_string())),
        &policy,
        now,
    );

    assert!(status.violates_policy);
    assert!(status.expired);
    assert!(status.pre_expired);
    assert!(status.warn_period);
    assert!(status.requires_change());
}

#[test]
fn status_of_unknown_user_is_clear() {
    let directory = MemoryDirectory::new();

    let status = StatusEvaluator::new(&directory, StatusConfig::default()).evaluate(
        "uid=nobody",
        None,
        &PasswordPolicy::new(),
        Utc::now(),
    );

    assert!(!status.requires_change());
    assert!(!status.warn_period);
}
