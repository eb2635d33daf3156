//! Password self-service core.
//!
//! Resolves the effective password policy for a user, evaluates the state of
//! the current password against it and orchestrates password changes against
//! a replicated directory.

pub mod change;
pub mod cli;
pub mod directory;
pub mod policy;
pub mod status;

pub use change::{
    ChangeConfig, ChangeError, ChangeOrchestrator, ChangeReport, ChangeRequest,
    ReplicationOutcome, ReplicationStatistics,
};
pub use directory::{DirectoryClient, DirectoryError, DirectoryErrorCode, MemoryDirectory};
pub use policy::{
    MergeType, PasswordPolicy, PasswordValidator, PolicyError, PolicyRule, PolicyViolation,
    RuleHelper,
};
pub use status::{PasswordStatus, StatusConfig, StatusEvaluator};
