use crate::cli::actions::{check, resolve, status, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Resolve(args) => resolve::execute(args).await,
        Action::Check(args) => check::execute(args).await,
        Action::Status(args) => status::execute(args).await,
    }
}
