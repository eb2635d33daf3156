use crate::cli::actions::PolicyArgs;
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub policy: PolicyArgs,
}

/// Print the effective policy as JSON.
/// # Errors
/// Returns an error if the policy cannot be serialized.
pub async fn execute(args: Args) -> Result<()> {
    let policy = args.policy.effective();
    debug!(rules = policy.len(), "resolved password policy");

    println!("{}", serde_json::to_string_pretty(&policy)?);

    Ok(())
}
