pub mod check;
pub mod resolve;
pub mod status;

mod run;

use crate::policy::{resolve as resolve_policy, PasswordPolicy};

#[derive(Debug)]
pub enum Action {
    Resolve(resolve::Args),
    Check(check::Args),
    Status(status::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}

/// Policies given on the command line.
#[derive(Debug, Default)]
pub struct PolicyArgs {
    pub global: PasswordPolicy,
    pub directory: Option<PasswordPolicy>,
}

impl PolicyArgs {
    /// The effective policy, global rules merged with the directory assigned ones.
    #[must_use]
    pub fn effective(&self) -> PasswordPolicy {
        resolve_policy(&self.global, self.directory.as_ref())
    }
}
