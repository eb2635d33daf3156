//! Password validation against a resolved policy.

use super::{PasswordPolicy, PolicyError, PolicyRule, RuleHelper};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// A single rule a candidate password failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub rule: PolicyRule,
    pub message: String,
}

impl PolicyViolation {
    fn new(rule: PolicyRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.rule)
    }
}

/// Facts about the user that some rules compare the password against.
#[derive(Clone, Debug, Default)]
pub struct ValidationContext<'a> {
    pub old_password: Option<&'a str>,
    pub attributes: Option<&'a BTreeMap<String, String>>,
}

pub struct PasswordValidator<'a> {
    helper: RuleHelper<'a>,
}

impl<'a> PasswordValidator<'a> {
    #[must_use]
    pub fn new(policy: &'a PasswordPolicy) -> Self {
        Self {
            helper: policy.helper(),
        }
    }

    /// Check `password` and return every violated rule, empty when compliant.
    ///
    /// # Errors
    /// Returns an error only if the rule catalogue and accessors disagree.
    pub fn violations(
        &self,
        password: &str,
        context: &ValidationContext<'_>,
    ) -> Result<Vec<PolicyViolation>, PolicyError> {
        let h = &self.helper;
        let mut violations = Vec::new();
        let chars: Vec<char> = password.chars().collect();
        let counts = CharCounts::of(&chars);

        let len = as_count(chars.len());
        let min_length = h.read_int(PolicyRule::MinLength)?;
        if len < min_length {
            violations.push(PolicyViolation::new(
                PolicyRule::MinLength,
                format!("password must be at least {min_length} characters"),
            ));
        }
        let max_length = h.read_int(PolicyRule::MaxLength)?;
        if max_length > 0 && len > max_length {
            violations.push(PolicyViolation::new(
                PolicyRule::MaxLength,
                format!("password must be at most {max_length} characters"),
            ));
        }

        for (min_rule, max_rule, count, label) in [
            (PolicyRule::MinUpper, PolicyRule::MaxUpper, counts.upper, "uppercase"),
            (PolicyRule::MinLower, PolicyRule::MaxLower, counts.lower, "lowercase"),
            (PolicyRule::MinNumeric, PolicyRule::MaxNumeric, counts.numeric, "numeric"),
            (PolicyRule::MinSpecial, PolicyRule::MaxSpecial, counts.special, "special"),
            (PolicyRule::MinAlpha, PolicyRule::MaxAlpha, counts.alpha, "alphabetic"),
        ] {
            let min = h.read_int(min_rule)?;
            if count < min {
                violations.push(PolicyViolation::new(
                    min_rule,
                    format!("password must contain at least {min} {label} characters"),
                ));
            }
            let max = h.read_int(max_rule)?;
            if max > 0 && count > max {
                violations.push(PolicyViolation::new(
                    max_rule,
                    format!("password must contain at most {max} {label} characters"),
                ));
            }
        }

        self.check_positions(&chars, &counts, &mut violations)?;
        self.check_repeats(&chars, &mut violations)?;
        self.check_values(password, context, &mut violations)?;
        self.check_patterns(password, &mut violations)?;

        Ok(violations)
    }

    /// Convenience wrapper returning the first violation.
    ///
    /// # Errors
    /// Returns an error only if the rule catalogue and accessors disagree.
    pub fn first_violation(
        &self,
        password: &str,
        context: &ValidationContext<'_>,
    ) -> Result<Option<PolicyViolation>, PolicyError> {
        Ok(self.violations(password, context)?.into_iter().next())
    }

    fn check_positions(
        &self,
        chars: &[char],
        counts: &CharCounts,
        violations: &mut Vec<PolicyViolation>,
    ) -> Result<(), PolicyError> {
        let h = &self.helper;

        if !h.read_bool(PolicyRule::AllowNumeric)? && counts.numeric > 0 {
            violations.push(PolicyViolation::new(
                PolicyRule::AllowNumeric,
                "numeric characters are not allowed",
            ));
        }
        if !h.read_bool(PolicyRule::AllowSpecial)? && counts.special > 0 {
            violations.push(PolicyViolation::new(
                PolicyRule::AllowSpecial,
                "special characters are not allowed",
            ));
        }

        let (Some(first), Some(last)) = (chars.first(), chars.last()) else {
            return Ok(());
        };
        for (rule, c, test, message) in [
            (
                PolicyRule::AllowFirstCharNumeric,
                first,
                char::is_numeric as fn(char) -> bool,
                "password may not start with a numeric character",
            ),
            (
                PolicyRule::AllowLastCharNumeric,
                last,
                char::is_numeric,
                "password may not end with a numeric character",
            ),
            (
                PolicyRule::AllowFirstCharSpecial,
                first,
                is_special,
                "password may not start with a special character",
            ),
            (
                PolicyRule::AllowLastCharSpecial,
                last,
                is_special,
                "password may not end with a special character",
            ),
        ] {
            if !h.read_bool(rule)? && test(*c) {
                violations.push(PolicyViolation::new(rule, message));
            }
        }

        Ok(())
    }

    fn check_repeats(
        &self,
        chars: &[char],
        violations: &mut Vec<PolicyViolation>,
    ) -> Result<(), PolicyError> {
        let h = &self.helper;

        let min_unique = h.read_int(PolicyRule::MinUnique)?;
        let unique = as_count(chars.iter().collect::<HashSet<_>>().len());
        if unique < min_unique {
            violations.push(PolicyViolation::new(
                PolicyRule::MinUnique,
                format!("password must contain at least {min_unique} unique characters"),
            ));
        }

        let max_repeat = h.read_int(PolicyRule::MaxRepeat)?;
        if max_repeat > 0 {
            let mut occurrences: HashMap<char, i64> = HashMap::new();
            for c in chars {
                *occurrences.entry(*c).or_default() += 1;
            }
            if occurrences.values().any(|n| *n > max_repeat) {
                violations.push(PolicyViolation::new(
                    PolicyRule::MaxRepeat,
                    format!("no character may appear more than {max_repeat} times"),
                ));
            }
        }

        let max_sequential = h.read_int(PolicyRule::MaxSequentialRepeat)?;
        if max_sequential > 0 && longest_run(chars) > max_sequential {
            violations.push(PolicyViolation::new(
                PolicyRule::MaxSequentialRepeat,
                format!("no character may repeat more than {max_sequential} times in a row"),
            ));
        }

        Ok(())
    }

    fn check_values(
        &self,
        password: &str,
        context: &ValidationContext<'_>,
        violations: &mut Vec<PolicyViolation>,
    ) -> Result<(), PolicyError> {
        let h = &self.helper;
        let case_sensitive = h.read_bool(PolicyRule::CaseSensitive)?;
        let lowered = password.to_lowercase();

        for value in h.read_list(PolicyRule::DisallowedValues)? {
            if lowered.contains(&value.to_lowercase()) {
                violations.push(PolicyViolation::new(
                    PolicyRule::DisallowedValues,
                    "password contains a disallowed value",
                ));
                break;
            }
        }

        if let Some(attributes) = context.attributes {
            for name in h.read_list(PolicyRule::DisallowedAttributes)? {
                let Some(value) = attributes.get(&name) else {
                    continue;
                };
                if value.chars().count() > 2 && lowered.contains(&value.to_lowercase()) {
                    violations.push(PolicyViolation::new(
                        PolicyRule::DisallowedAttributes,
                        format!("password may not contain the value of {name}"),
                    ));
                    break;
                }
            }
        }

        if h.read_bool(PolicyRule::DisallowCurrent)? {
            if let Some(old) = context.old_password.filter(|old| !old.is_empty()) {
                let same = if case_sensitive {
                    old == password
                } else {
                    old.to_lowercase() == lowered
                };
                if same {
                    violations.push(PolicyViolation::new(
                        PolicyRule::DisallowCurrent,
                        "new password must differ from the current password",
                    ));
                }
            }
        }

        Ok(())
    }

    fn check_patterns(
        &self,
        password: &str,
        violations: &mut Vec<PolicyViolation>,
    ) -> Result<(), PolicyError> {
        let h = &self.helper;

        if h
            .read_patterns(PolicyRule::RegexMatch)?
            .iter()
            .any(|re| !re.is_match(password))
        {
            violations.push(PolicyViolation::new(
                PolicyRule::RegexMatch,
                "password does not match a required pattern",
            ));
        }

        if h
            .read_patterns(PolicyRule::RegexNoMatch)?
            .iter()
            .any(|re| re.is_match(password))
        {
            violations.push(PolicyViolation::new(
                PolicyRule::RegexNoMatch,
                "password matches a disallowed pattern",
            ));
        }

        let (groups, min_match) = h.char_groups()?;
        if !groups.is_empty() && min_match > 0 {
            let matched = groups.iter().filter(|re| re.is_match(password)).count();
            if matched < min_match.min(groups.len()) {
                violations.push(PolicyViolation::new(
                    PolicyRule::CharGroupsMinMatch,
                    format!("password must contain characters from {min_match} character groups"),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct CharCounts {
    upper: i64,
    lower: i64,
    numeric: i64,
    special: i64,
    alpha: i64,
}

impl CharCounts {
    fn of(chars: &[char]) -> Self {
        let mut counts = Self::default();
        for c in chars {
            if c.is_uppercase() {
                counts.upper += 1;
            }
            if c.is_lowercase() {
                counts.lower += 1;
            }
            if c.is_alphabetic() {
                counts.alpha += 1;
            }
            if c.is_numeric() {
                counts.numeric += 1;
            }
            if is_special(*c) {
                counts.special += 1;
            }
        }
        counts
    }
}

fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

fn longest_run(chars: &[char]) -> i64 {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;
    for c in chars {
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

fn as_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
