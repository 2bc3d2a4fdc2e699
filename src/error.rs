//! Error types for the governance engine

use thiserror::Error;
use uuid::Uuid;

use crate::governance::committee::SeatId;
use crate::governance::state_machine::ChangeStatus;

#[derive(Error, Debug)]
pub enum GovernanceError {
    /// Capability missing or approval limit exceeded
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid transition from {from}: {reason}")]
    InvalidTransition { from: ChangeStatus, reason: String },

    #[error("Impact analysis incomplete: {alternatives} of {required} alternatives, analysis complete = {analysis_complete}")]
    IncompleteAnalysis {
        alternatives: usize,
        required: usize,
        analysis_complete: bool,
    },

    #[error("Invalid voter for seat {seat}: {reason}")]
    InvalidVoter { seat: SeatId, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// Stale write detected by the store; the caller must re-read and retry
    #[error("Conflict on project {project_id}: expected version {expected}, found {found}")]
    Conflict {
        project_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GovernanceError {
    /// Stable machine-readable code for the presentation layer
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::PermissionDenied(_) => "PERMISSION_DENIED",
            GovernanceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            GovernanceError::IncompleteAnalysis { .. } => "INCOMPLETE_ANALYSIS",
            GovernanceError::InvalidVoter { .. } => "INVALID_VOTER",
            GovernanceError::Validation(_) => "VALIDATION_ERROR",
            GovernanceError::Conflict { .. } => "CONFLICT",
            GovernanceError::NotFound(_) => "NOT_FOUND",
            GovernanceError::Database(_) => "DATABASE_ERROR",
            GovernanceError::Serialization(_) => "SERIALIZATION_ERROR",
            GovernanceError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller should re-read and retry the operation
    pub fn is_conflict(&self) -> bool {
        matches!(self, GovernanceError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::Validation(msg.into())
}

/// Helper function to create a permission error
pub fn permission_denied(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::PermissionDenied(msg.into())
}
