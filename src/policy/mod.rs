//! Password policy model and merge engine.
//!
//! A [`PasswordPolicy`] is an immutable map of [`PolicyRule`] to string encoded
//! values. Two policies are combined with [`PasswordPolicy::merge`], which applies
//! each rule's [`MergeType`] and never fails: malformed numbers count as zero and
//! rules missing on one side take their default value.

pub mod helper;
pub mod resolver;
pub mod rule;
pub mod validator;

pub use helper::RuleHelper;
pub use resolver::{resolve, resolve_for_user, PolicySource, ResolverConfig};
pub use rule::{parse_rule_pair, MergeType, PolicyRule};
pub use validator::{PasswordValidator, PolicyViolation, ValidationContext};

use rule::{boolean_value, list_entries, numeric_value};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Configuration or programming errors raised while reading policies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("rule {rule} has merge type {actual:?}, cannot be read as {requested}")]
    WrongRuleType {
        rule: PolicyRule,
        actual: MergeType,
        requested: &'static str,
    },
    #[error("unknown password rule: {0}")]
    UnknownRule(String),
    #[error("malformed rule, expected key=value: {0}")]
    MalformedPair(String),
}

/// Opaque reference to the directory-native policy object a policy was read from.
///
/// Only used for display, it never takes part in merging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectoryPolicyRef {
    pub dn: String,
    pub source: String,
}

impl fmt::Display for DirectoryPolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.dn, self.source)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PasswordPolicy {
    rules: BTreeMap<PolicyRule, String>,
    directory_policy: Option<DirectoryPolicyRef>,
}

impl PasswordPolicy {
    /// An empty policy, every rule reads as its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (PolicyRule, V)>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(rule, value)| (rule, value.into()))
            .collect()
    }

    #[must_use]
    pub fn with_directory_policy(mut self, reference: DirectoryPolicyRef) -> Self {
        self.directory_policy = Some(reference);
        self
    }

    /// The value set for `rule`, if any.
    #[must_use]
    pub fn get(&self, rule: PolicyRule) -> Option<&str> {
        self.rules.get(&rule).map(String::as_str)
    }

    /// The value set for `rule`, falling back to the rule default.
    #[must_use]
    pub fn value(&self, rule: PolicyRule) -> &str {
        self.get(rule).unwrap_or_else(|| rule.default_value())
    }

    #[must_use]
    pub fn contains(&self, rule: PolicyRule) -> bool {
        self.rules.contains_key(&rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = (PolicyRule, &str)> {
        self.rules.iter().map(|(rule, value)| (*rule, value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn directory_policy(&self) -> Option<&DirectoryPolicyRef> {
        self.directory_policy.as_ref()
    }

    /// Typed accessors over this policy.
    #[must_use]
    pub fn helper(&self) -> RuleHelper<'_> {
        RuleHelper::new(self)
    }

    /// Combine `self` (the base) with `overlay` into a new policy.
    ///
    /// Every rule present on either side is present in the result. The base wins
    /// for [`MergeType::ReplaceIfEmpty`] rules unless its value is empty.
    #[must_use]
    pub fn merge(&self, overlay: &PasswordPolicy) -> PasswordPolicy {
        let keys: BTreeSet<PolicyRule> = self
            .rules
            .keys()
            .chain(overlay.rules.keys())
            .copied()
            .collect();

        let rules = keys
            .into_iter()
            .map(|rule| {
                let merged = merge_values(rule, self.value(rule), overlay.value(rule));
                (rule, merged)
            })
            .collect();

        PasswordPolicy {
            rules,
            directory_policy: self
                .directory_policy
                .clone()
                .or_else(|| overlay.directory_policy.clone()),
        }
    }
}

fn merge_values(rule: PolicyRule, base: &str, overlay: &str) -> String {
    match rule.merge_type() {
        MergeType::Min => numeric_value(base).max(numeric_value(overlay)).to_string(),
        MergeType::Max => {
            let (b, o) = (numeric_value(base), numeric_value(overlay));
            match (b, o) {
                (0, other) | (other, 0) => other.to_string(),
                (b, o) => b.min(o).to_string(),
            }
        }
        MergeType::BooleanOr => (boolean_value(base) || boolean_value(overlay)).to_string(),
        MergeType::BooleanAnd => (boolean_value(base) && boolean_value(overlay)).to_string(),
        MergeType::SetUnion => list_entries(base)
            .chain(list_entries(overlay))
            .collect::<BTreeSet<&str>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join("\n"),
        MergeType::ReplaceIfEmpty => {
            if base.trim().is_empty() {
                overlay.to_string()
            } else {
                base.to_string()
            }
        }
    }
}

impl FromIterator<(PolicyRule, String)> for PasswordPolicy {
    fn from_iter<T: IntoIterator<Item = (PolicyRule, String)>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
            directory_policy: None,
        }
    }
}

impl Serialize for PasswordPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rules.serialize(serializer)
    }
}

impl fmt::Display for PasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self
            .rules
            .iter()
            .map(|(rule, value)| format!("{rule}={}", value.replace('\n', ",")))
            .collect::<Vec<_>>()
            .join(", ");

        match &self.directory_policy {
            Some(reference) => write!(f, "{{{body}}} from {reference}"),
            None => write!(f, "{{{body}}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(pairs: &[(PolicyRule, &str)]) -> PasswordPolicy {
        PasswordPolicy::from_pairs(pairs.iter().map(|(r, v)| (*r, *v)))
    }

    #[test]
    fn min_rules_take_the_larger_value() {
        for (a, b) in [(8, 10), (10, 8), (0, 3), (5, 5)] {
            let base = policy(&[(PolicyRule::MinLength, &a.to_string())]);
            let overlay = policy(&[(PolicyRule::MinLength, &b.to_string())]);
            assert_eq!(
                base.merge(&overlay).get(PolicyRule::MinLength),
                Some(a.max(b).to_string().as_str())
            );
        }
    }

    #[test]
    fn max_rules_take_the_smaller_non_zero_value() {
        for (a, b, expected) in [(64, 32, 32), (32, 64, 32), (0, 64, 64), (64, 0, 64), (0, 0, 0)] {
            let base = policy(&[(PolicyRule::MaxLength, &a.to_string())]);
            let overlay = policy(&[(PolicyRule::MaxLength, &b.to_string())]);
            assert_eq!(
                base.merge(&overlay).get(PolicyRule::MaxLength),
                Some(expected.to_string().as_str())
            );
        }
    }

    #[test]
    fn malformed_numbers_merge_as_zero() {
        let base = policy(&[
            (PolicyRule::MinLength, "eight"),
            (PolicyRule::MaxLength, "lots"),
        ]);
        let overlay = policy(&[(PolicyRule::MinLength, "6"), (PolicyRule::MaxLength, "20")]);
        let merged = base.merge(&overlay);
        assert_eq!(merged.get(PolicyRule::MinLength), Some("6"));
        assert_eq!(merged.get(PolicyRule::MaxLength), Some("20"));
    }

    #[test]
    fn boolean_rules_follow_their_semantics() {
        let base = policy(&[
            (PolicyRule::AllowSpecial, "false"),
            (PolicyRule::EnforceAtLogin, "true"),
        ]);
        let overlay = policy(&[
            (PolicyRule::AllowSpecial, "true"),
            (PolicyRule::EnforceAtLogin, "false"),
        ]);

        for merged in [base.merge(&overlay), overlay.merge(&base)] {
            assert_eq!(merged.get(PolicyRule::AllowSpecial), Some("true"));
            assert_eq!(merged.get(PolicyRule::EnforceAtLogin), Some("false"));
        }
    }

    #[test]
    fn set_rules_are_unioned_without_duplicates() {
        let base = policy(&[(PolicyRule::DisallowedValues, "password\nletmein")]);
        let overlay = policy(&[(PolicyRule::DisallowedValues, "letmein\nqwerty\n")]);

        let merged = base.merge(&overlay);
        let mut entries: Vec<&str> =
            rule::list_entries(merged.value(PolicyRule::DisallowedValues)).collect();
        entries.sort_unstable();
        assert_eq!(entries, vec!["letmein", "password", "qwerty"]);
        assert_eq!(
            merged.get(PolicyRule::DisallowedValues),
            overlay.merge(&base).get(PolicyRule::DisallowedValues)
        );
    }

    #[test]
    fn change_message_keeps_a_non_empty_base() {
        let global = policy(&[(PolicyRule::ChangeMessage, "global message")]);
        let directory = policy(&[(PolicyRule::ChangeMessage, "directory message")]);

        assert_eq!(
            global.merge(&directory).get(PolicyRule::ChangeMessage),
            Some("global message")
        );
        assert_eq!(
            directory.merge(&global).get(PolicyRule::ChangeMessage),
            Some("directory message")
        );

        let empty = policy(&[(PolicyRule::ChangeMessage, "")]);
        assert_eq!(
            empty.merge(&directory).get(PolicyRule::ChangeMessage),
            Some("directory message")
        );
    }

    #[test]
    fn rules_from_either_side_are_kept() {
        let global = policy(&[(PolicyRule::MinLength, "8")]);
        let directory = policy(&[(PolicyRule::MinLength, "10"), (PolicyRule::MaxLength, "64")]);

        let effective = global.merge(&directory);
        assert_eq!(effective.len(), 2);
        assert_eq!(effective.get(PolicyRule::MinLength), Some("10"));
        assert_eq!(effective.get(PolicyRule::MaxLength), Some("64"));
        assert!(!effective.contains(PolicyRule::MinUpper));
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let global = policy(&[(PolicyRule::MinLength, "8")]);
        let directory = policy(&[(PolicyRule::MinLength, "10")]);
        let before = (global.clone(), directory.clone());

        let _ = global.merge(&directory);
        assert_eq!((global, directory), before);
    }

    #[test]
    fn directory_reference_prefers_the_base() {
        let reference = DirectoryPolicyRef {
            dn: "cn=default,ou=policies".to_string(),
            source: "ppolicy".to_string(),
        };
        let global = PasswordPolicy::new();
        let directory = policy(&[(PolicyRule::MinLength, "10")])
            .with_directory_policy(reference.clone());

        assert_eq!(global.merge(&directory).directory_policy(), Some(&reference));
    }

    #[test]
    fn serializes_as_a_key_map() {
        let p = policy(&[(PolicyRule::MinLength, "10"), (PolicyRule::MaxLength, "64")]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"minimumLength": "10", "maximumLength": "64"})
        );
    }
}
