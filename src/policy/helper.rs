//! Typed view over a resolved policy.
//!
//! Asking for an accessor that does not match the rule's merge type is a
//! programming error and is reported as [`PolicyError::WrongRuleType`].

use super::rule::{boolean_value, list_entries, numeric_value};
use super::{MergeType, PasswordPolicy, PolicyError, PolicyRule};
use regex::Regex;
use tracing::warn;

#[derive(Clone, Copy, Debug)]
pub struct RuleHelper<'a> {
    policy: &'a PasswordPolicy,
}

impl<'a> RuleHelper<'a> {
    #[must_use]
    pub fn new(policy: &'a PasswordPolicy) -> Self {
        Self { policy }
    }

    /// # Errors
    /// Returns an error if `rule` is not a numeric rule.
    pub fn read_int(&self, rule: PolicyRule) -> Result<i64, PolicyError> {
        expect_type(rule, &[MergeType::Min, MergeType::Max], "int")?;
        Ok(numeric_value(self.policy.value(rule)))
    }

    /// # Errors
    /// Returns an error if `rule` is not a boolean rule.
    pub fn read_bool(&self, rule: PolicyRule) -> Result<bool, PolicyError> {
        expect_type(
            rule,
            &[MergeType::BooleanOr, MergeType::BooleanAnd],
            "boolean",
        )?;
        Ok(boolean_value(self.policy.value(rule)))
    }

    /// # Errors
    /// Returns an error if `rule` is not a list rule.
    pub fn read_list(&self, rule: PolicyRule) -> Result<Vec<String>, PolicyError> {
        expect_type(rule, &[MergeType::SetUnion], "list")?;
        Ok(list_entries(self.policy.value(rule))
            .map(str::to_string)
            .collect())
    }

    /// Compile every entry of a list rule, invalid expressions are logged and skipped.
    ///
    /// # Errors
    /// Returns an error if `rule` is not a list rule.
    pub fn read_patterns(&self, rule: PolicyRule) -> Result<Vec<Regex>, PolicyError> {
        Ok(self
            .read_list(rule)?
            .into_iter()
            .filter_map(|pattern| match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(rule = %rule, pattern = %pattern, "ignoring invalid pattern: {e}");
                    None
                }
            })
            .collect())
    }

    /// # Errors
    /// Returns an error if `rule` is not a text rule.
    pub fn read_text(&self, rule: PolicyRule) -> Result<&'a str, PolicyError> {
        expect_type(rule, &[MergeType::ReplaceIfEmpty], "text")?;
        Ok(self.policy.value(rule))
    }

    /// Character groups as compiled patterns plus the number that must match.
    ///
    /// # Errors
    /// Returns an error only on a broken rule catalogue.
    pub fn char_groups(&self) -> Result<(Vec<Regex>, usize), PolicyError> {
        let groups = self.read_patterns(PolicyRule::CharGroupsValues)?;
        let min_match = self.read_int(PolicyRule::CharGroupsMinMatch)?;

        Ok((groups, usize::try_from(min_match).unwrap_or(0)))
    }
}

fn expect_type(
    rule: PolicyRule,
    accepted: &[MergeType],
    requested: &'static str,
) -> Result<(), PolicyError> {
    let actual = rule.merge_type();
    if accepted.contains(&actual) {
        Ok(())
    } else {
        Err(PolicyError::WrongRuleType {
            rule,
            actual,
            requested,
        })
    }
}
