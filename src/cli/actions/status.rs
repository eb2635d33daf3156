use crate::cli::actions::PolicyArgs;
use crate::directory::{memory::MemoryUser, MemoryDirectory};
use crate::status::{StatusConfig, StatusEvaluator};
use anyhow::Result;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

const IDENTITY: &str = "cli";

#[derive(Debug)]
pub struct Args {
    pub policy: PolicyArgs,
    pub password: Option<SecretString>,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub pre_expire_window: i64,
    pub warn_window: i64,
}

/// Evaluate the password status of a user described by the arguments.
/// # Errors
/// Returns an error if the status cannot be serialized.
pub async fn execute(args: Args) -> Result<()> {
    let policy = args.policy.effective();

    let mut user = MemoryUser::new(
        args.password
            .as_ref()
            .map_or("", |password| password.expose_secret()),
    )
    .with_expired(args.expired);
    if let Some(expires_at) = args.expires_at {
        user = user.with_expiration_time(expires_at);
    }
    let directory = MemoryDirectory::new().with_user(IDENTITY, user);

    let config = StatusConfig::new()
        .with_pre_expire_window_seconds(args.pre_expire_window)
        .with_warn_window_seconds(args.warn_window);

    let status = StatusEvaluator::new(&directory, config).evaluate(
        IDENTITY,
        args.password.as_ref(),
        &policy,
        Utc::now(),
    );

    println!("{}", serde_json::to_string_pretty(&status)?);

    Ok(())
}
