//! External collaborators of the governance engine
//!
//! The engine owns no I/O of its own. Identity lookup, notification
//! delivery, audit recording and project updates sit behind these traits;
//! the in-process implementations here serve embedding hosts and tests.

pub mod audit;
pub mod identity;
pub mod notifier;
pub mod project;

pub use audit::{AuditEntry, AuditLog, MemoryAuditLog};
pub use identity::{IdentitySource, StaticDirectory};
pub use notifier::{NotificationKind, Notifier, Recipient, RecordingNotifier, TracingNotifier};
pub use project::{MemoryProjects, Project, ProjectMutator, ScopeChange};
