use crate::cli::actions::PolicyArgs;
use crate::policy::{PasswordValidator, ValidationContext};
use anyhow::{bail, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub policy: PolicyArgs,
    pub password: SecretString,
    pub old_password: Option<SecretString>,
}

/// Validate the password and print every violated rule as JSON.
/// # Errors
/// Returns an error if the password violates the effective policy.
pub async fn execute(args: Args) -> Result<()> {
    let policy = args.policy.effective();

    let context = ValidationContext {
        old_password: args.old_password.as_ref().map(|s| s.expose_secret()),
        attributes: None,
    };
    let violations =
        PasswordValidator::new(&policy).violations(args.password.expose_secret(), &context)?;

    println!("{}", serde_json::to_string_pretty(&violations)?);

    if !violations.is_empty() {
        bail!("password violates {} policy rule(s)", violations.len());
    }

    info!("password complies with policy");

    Ok(())
}
