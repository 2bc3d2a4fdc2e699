//! Change governance engine
//!
//! Resolves role-based capabilities, routes changes to an approval
//! authority, runs committee ballots and enforces the change lifecycle.
//! Persistence, identity, notification, audit and project updates are
//! collaborators supplied by the host.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod governance;
pub mod models;
pub mod store;
pub mod telemetry;

pub use config::GovernanceConfig;
pub use error::{GovernanceError, Result};
pub use governance::{
    ActorContext, ChangeStatus, Collaborators, GovernanceEvent, GovernanceFacade, VoteReceipt,
};
pub use models::{AnalysisUpdate, ChangeRequest, NewChangeRequest};
pub use store::{ChangeSet, ChangeStore, MemoryStore, SqliteStore};
