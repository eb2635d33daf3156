//! Password change orchestration.

pub mod actions;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod replication;

pub use actions::{
    AllowAll, ChangeListener, HistoryStore, LogChangeListener, LogNotificationSender,
    NotificationSender, PermissionChecker, PostChangeAction,
};
pub use config::ChangeConfig;
pub use error::{map_directory_error, ChangeError, RejectReason};
pub use orchestrator::{ChangeOrchestrator, ChangeReport, ChangeRequest};
pub use replication::{ReplicationOutcome, ReplicationStatistics, ReplicationStatisticsSnapshot};
