use crate::cli::actions::{check, resolve, status, Action, PolicyArgs};
use crate::cli::commands::{
    ARG_DIRECTORY_RULE, ARG_EXPIRED, ARG_EXPIRES_AT, ARG_OLD_PASSWORD, ARG_PASSWORD,
    ARG_PRE_EXPIRE_WINDOW, ARG_RULE, ARG_WARN_WINDOW, CMD_CHECK, CMD_RESOLVE, CMD_STATUS,
};
use crate::policy::{MergeType, PasswordPolicy, PolicyRule};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::collections::{btree_map::Entry, BTreeMap};

/// Collect repeated `key=value` arguments into a policy.
///
/// A list rule given more than once keeps every value, any other rule keeps
/// the last one.
fn policy_from(matches: &clap::ArgMatches, id: &str) -> Option<PasswordPolicy> {
    let pairs = matches.get_many::<(PolicyRule, String)>(id)?;

    let mut rules: BTreeMap<PolicyRule, String> = BTreeMap::new();
    for (rule, value) in pairs {
        let is_list = rule.merge_type() == MergeType::SetUnion;
        match rules.entry(*rule) {
            Entry::Occupied(mut existing) if is_list => {
                let existing = existing.get_mut();
                existing.push('\n');
                existing.push_str(value);
            }
            Entry::Occupied(mut existing) => {
                existing.insert(value.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(value.clone());
            }
        }
    }

    Some(rules.into_iter().collect())
}

fn policy_args(matches: &clap::ArgMatches) -> PolicyArgs {
    PolicyArgs {
        global: policy_from(matches, ARG_RULE).unwrap_or_default(),
        directory: policy_from(matches, ARG_DIRECTORY_RULE),
    }
}

fn secret(matches: &clap::ArgMatches, id: &str) -> Option<SecretString> {
    matches
        .get_one::<String>(id)
        .map(|value| SecretString::from(value.clone()))
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let (name, sub_m) = matches.subcommand().context("missing subcommand")?;

    match name {
        CMD_RESOLVE => Ok(Action::Resolve(resolve::Args {
            policy: policy_args(sub_m),
        })),
        CMD_CHECK => Ok(Action::Check(check::Args {
            policy: policy_args(sub_m),
            password: secret(sub_m, ARG_PASSWORD)
                .context("missing required argument: --password")?,
            old_password: secret(sub_m, ARG_OLD_PASSWORD),
        })),
        CMD_STATUS => Ok(Action::Status(status::Args {
            policy: policy_args(sub_m),
            password: secret(sub_m, ARG_PASSWORD),
            expired: sub_m.get_flag(ARG_EXPIRED),
            expires_at: sub_m.get_one::<DateTime<Utc>>(ARG_EXPIRES_AT).copied(),
            pre_expire_window: sub_m
                .get_one::<i64>(ARG_PRE_EXPIRE_WINDOW)
                .copied()
                .unwrap_or(432_000),
            warn_window: sub_m.get_one::<i64>(ARG_WARN_WINDOW).copied().unwrap_or(0),
        })),
        other => Err(anyhow!("unknown subcommand: {other}")),
    }
}
