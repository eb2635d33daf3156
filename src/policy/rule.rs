//! Password rule catalogue.
//!
//! Every rule carries a stable key, a merge type and the default value used when
//! a policy does not set it.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::PolicyError;

/// How two values of the same rule are combined when policies are merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeType {
    /// Numeric minimum requirement, the larger value wins.
    Min,
    /// Numeric maximum allowance, the smaller non-zero value wins (0 = unbounded).
    Max,
    /// Permissive flag, either side may enable it.
    BooleanOr,
    /// Restrictive flag, both sides must enable it.
    BooleanAnd,
    /// Newline separated list, entries are unioned.
    SetUnion,
    /// Free text, the base value is kept unless it is empty.
    ReplaceIfEmpty,
}

macro_rules! rules {
    ($($variant:ident => ($key:literal, $merge:ident, $default:literal),)+) => {
        /// A single password rule.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum PolicyRule {
            $(
                #[serde(rename = $key)]
                $variant,
            )+
        }

        impl PolicyRule {
            pub const ALL: &'static [PolicyRule] = &[$(PolicyRule::$variant,)+];

            /// Stable key used in configuration and display.
            #[must_use]
            pub const fn key(self) -> &'static str {
                match self {
                    $(PolicyRule::$variant => $key,)+
                }
            }

            #[must_use]
            pub const fn merge_type(self) -> MergeType {
                match self {
                    $(PolicyRule::$variant => MergeType::$merge,)+
                }
            }

            /// Value assumed when a policy does not carry this rule.
            #[must_use]
            pub const fn default_value(self) -> &'static str {
                match self {
                    $(PolicyRule::$variant => $default,)+
                }
            }
        }
    };
}

rules! {
    MinLength => ("minimumLength", Min, "0"),
    MaxLength => ("maximumLength", Max, "0"),
    MinUpper => ("minimumUpperCase", Min, "0"),
    MaxUpper => ("maximumUpperCase", Max, "0"),
    MinLower => ("minimumLowerCase", Min, "0"),
    MaxLower => ("maximumLowerCase", Max, "0"),
    MinNumeric => ("minimumNumeric", Min, "0"),
    MaxNumeric => ("maximumNumeric", Max, "0"),
    MinSpecial => ("minimumSpecial", Min, "0"),
    MaxSpecial => ("maximumSpecial", Max, "0"),
    MinAlpha => ("minimumAlpha", Min, "0"),
    MaxAlpha => ("maximumAlpha", Max, "0"),
    MinUnique => ("minimumUnique", Min, "0"),
    MaxRepeat => ("maximumRepeat", Max, "0"),
    MaxSequentialRepeat => ("maximumSequentialRepeat", Max, "0"),
    AllowNumeric => ("allowNumeric", BooleanOr, "true"),
    AllowSpecial => ("allowSpecial", BooleanOr, "true"),
    AllowFirstCharNumeric => ("allowFirstCharNumeric", BooleanOr, "true"),
    AllowLastCharNumeric => ("allowLastCharNumeric", BooleanOr, "true"),
    AllowFirstCharSpecial => ("allowFirstCharSpecial", BooleanOr, "true"),
    AllowLastCharSpecial => ("allowLastCharSpecial", BooleanOr, "true"),
    CaseSensitive => ("caseSensitive", BooleanAnd, "true"),
    DisallowCurrent => ("disallowCurrent", BooleanAnd, "true"),
    EnforceAtLogin => ("enforceAtLogin", BooleanAnd, "false"),
    DisallowedValues => ("disallowedValues", SetUnion, ""),
    DisallowedAttributes => ("disallowedAttributes", SetUnion, ""),
    RegexMatch => ("regExMatch", SetUnion, ""),
    RegexNoMatch => ("regExNoMatch", SetUnion, ""),
    CharGroupsValues => ("charGroupsValues", SetUnion, ""),
    CharGroupsMinMatch => ("charGroupsMinMatch", Min, "0"),
    ExpirationInterval => ("expirationInterval", Max, "0"),
    MinimumLifetime => ("minimumLifetime", Min, "0"),
    ChangeMessage => ("changeMessage", ReplaceIfEmpty, ""),
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PolicyRule {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|rule| rule.key().eq_ignore_ascii_case(key))
            .ok_or_else(|| PolicyError::UnknownRule(key.to_string()))
    }
}

/// Parse a `key=value` pair as passed on the command line.
///
/// # Errors
/// Returns an error if the pair has no `=` or the key is not a known rule.
pub fn parse_rule_pair(pair: &str) -> Result<(PolicyRule, String), PolicyError> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| PolicyError::MalformedPair(pair.to_string()))?;

    Ok((key.parse()?, value.trim().to_string()))
}

/// Interpret a stored value as a number, malformed input counts as 0.
#[must_use]
pub fn numeric_value(value: &str) -> i64 {
    value.trim().parse::<i64>().unwrap_or(0)
}

#[must_use]
pub fn boolean_value(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Split a stored list into its non-empty entries.
pub fn list_entries(value: &str) -> impl Iterator<Item = &str> {
    value.lines().map(str::trim).filter(|entry| !entry.is_empty())
}
