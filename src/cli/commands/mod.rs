pub mod logging;

use crate::policy::{parse_rule_pair, PolicyRule};
use chrono::{DateTime, Utc};
use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub const CMD_RESOLVE: &str = "resolve";
pub const CMD_CHECK: &str = "check";
pub const CMD_STATUS: &str = "status";

pub const ARG_RULE: &str = "rule";
pub const ARG_DIRECTORY_RULE: &str = "directory-rule";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_OLD_PASSWORD: &str = "old-password";
pub const ARG_EXPIRES_AT: &str = "expires-at";
pub const ARG_EXPIRED: &str = "expired";
pub const ARG_PRE_EXPIRE_WINDOW: &str = "pre-expire-window";
pub const ARG_WARN_WINDOW: &str = "warn-window";

pub fn validator_rule() -> ValueParser {
    ValueParser::from(
        move |pair: &str| -> std::result::Result<(PolicyRule, String), String> {
            parse_rule_pair(pair).map_err(|e| e.to_string())
        },
    )
}

pub fn validator_timestamp() -> ValueParser {
    ValueParser::from(
        move |value: &str| -> std::result::Result<DateTime<Utc>, String> {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("invalid RFC 3339 timestamp: {e}"))
        },
    )
}

fn with_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RULE)
                .short('r')
                .long("rule")
                .help("Global policy rule as key=value, repeat for more rules")
                .env("PWSELF_GLOBAL_POLICY")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_parser(validator_rule()),
        )
        .arg(
            Arg::new(ARG_DIRECTORY_RULE)
                .short('d')
                .long("directory-rule")
                .help("Directory assigned policy rule as key=value, repeat for more rules")
                .env("PWSELF_DIRECTORY_POLICY")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_parser(validator_rule()),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("pwself")
        .about("Password self-service policy engine")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(with_policy_args(
            Command::new(CMD_RESOLVE).about("Print the effective password policy"),
        ))
        .subcommand(with_policy_args(
            Command::new(CMD_CHECK)
                .about("Check a password against the effective policy")
                .arg(
                    Arg::new(ARG_PASSWORD)
                        .long("password")
                        .help("Password to check")
                        .env("PWSELF_PASSWORD")
                        .hide_env_values(true)
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_OLD_PASSWORD)
                        .long("old-password")
                        .help("Current password, enables the disallow-current rule")
                        .env("PWSELF_OLD_PASSWORD")
                        .hide_env_values(true),
                ),
        ))
        .subcommand(with_policy_args(
            Command::new(CMD_STATUS)
                .about("Evaluate password status from expiration data")
                .arg(
                    Arg::new(ARG_EXPIRES_AT)
                        .long("expires-at")
                        .help("Password expiration time (RFC 3339)")
                        .env("PWSELF_EXPIRES_AT")
                        .value_parser(validator_timestamp()),
                )
                .arg(
                    Arg::new(ARG_EXPIRED)
                        .long("expired")
                        .help("Directory reports the password as expired")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new(ARG_PRE_EXPIRE_WINDOW)
                        .long("pre-expire-window")
                        .help("Seconds before expiration the user is asked to change the password")
                        .env("PWSELF_PRE_EXPIRE_WINDOW")
                        .default_value("432000")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new(ARG_WARN_WINDOW)
                        .long("warn-window")
                        .help("Seconds before expiration the user is warned")
                        .env("PWSELF_WARN_WINDOW")
                        .default_value("0")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new(ARG_PASSWORD)
                        .long("password")
                        .help("Current password, checked when the policy enforces it at login")
                        .env("PWSELF_PASSWORD")
                        .hide_env_values(true),
                ),
        ));

    logging::with_args(command)
}
