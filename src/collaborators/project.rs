//! Project side effects of approved changes
//!
//! An approval adjusts the project's budget, end date and scope history.
//! If persisting the approval fails, the caller reverts exactly that change's
//! adjustment; effects of other approvals applied in between are kept.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{GovernanceError, Result};
use crate::models::ChangeRequest;

/// Scope-history entry left by an approved change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeChange {
    pub change_id: Uuid,
    pub change_number: String,
    pub title: String,
    pub cost_delta: f64,
    pub schedule_delta_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub budget: f64,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub scope_history: Vec<ScopeChange>,
}

impl Project {
    pub fn new(name: impl Into<String>, budget: f64, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            budget,
            end_date,
            scope_history: Vec::new(),
        }
    }

    /// The project with an approved change applied. Applying a change that
    /// is already in the scope history leaves the project as it is.
    pub fn with_change_applied(&self, change: &ChangeRequest, at: DateTime<Utc>) -> Result<Self> {
        if self.has_applied(change.id) {
            return Ok(self.clone());
        }

        let end_date = self
            .end_date
            .checked_add_days(Days::new(u64::from(change.impact.schedule_days)))
            .ok_or_else(|| {
                GovernanceError::Validation(format!(
                    "{} days moves the end date of {} out of range",
                    change.impact.schedule_days, self.name
                ))
            })?;

        let mut updated = self.clone();
        updated.budget += change.impact.cost;
        updated.end_date = end_date;
        updated.scope_history.push(ScopeChange {
            change_id: change.id,
            change_number: change.change_number.clone(),
            title: change.title.clone(),
            cost_delta: change.impact.cost,
            schedule_delta_days: change.impact.schedule_days,
            scope: change.impact.scope.clone(),
            applied_at: at,
        });
        Ok(updated)
    }

    /// The project with one applied change taken back out, using the deltas
    /// recorded when it was applied. Other scope entries are untouched.
    pub fn with_change_reverted(&self, change_id: Uuid) -> Result<Self> {
        let Some(idx) = self
            .scope_history
            .iter()
            .position(|entry| entry.change_id == change_id)
        else {
            return Ok(self.clone());
        };

        let mut updated = self.clone();
        let entry = updated.scope_history.remove(idx);
        updated.budget -= entry.cost_delta;
        updated.end_date = self
            .end_date
            .checked_sub_days(Days::new(u64::from(entry.schedule_delta_days)))
            .ok_or_else(|| {
                GovernanceError::Validation(format!(
                    "cannot move the end date of {} back by {} days",
                    self.name, entry.schedule_delta_days
                ))
            })?;
        Ok(updated)
    }

    pub fn has_applied(&self, change_id: Uuid) -> bool {
        self.scope_history.iter().any(|e| e.change_id == change_id)
    }
}

#[async_trait]
pub trait ProjectMutator: Send + Sync {
    /// Apply an approved change to its project. Returns the updated project.
    async fn apply_approved_change(&self, change: &ChangeRequest) -> Result<Project>;

    /// Undo only this change's adjustment, leaving every other applied change
    /// in place. Returns the updated project.
    async fn revert_approved_change(&self, change: &ChangeRequest) -> Result<Project>;
}

/// In-memory project registry
#[derive(Default)]
pub struct MemoryProjects {
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl MemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, project: Project) {
        let mut projects = self.projects.write().await;
        projects.insert(project.id, project);
    }

    pub async fn get(&self, id: Uuid) -> Option<Project> {
        let projects = self.projects.read().await;
        projects.get(&id).cloned()
    }
}

#[async_trait]
impl ProjectMutator for MemoryProjects {
    async fn apply_approved_change(&self, change: &ChangeRequest) -> Result<Project> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&change.project_id)
            .ok_or_else(|| GovernanceError::NotFound(format!("Project {}", change.project_id)))?;

        *project = project.with_change_applied(change, Utc::now())?;

        tracing::info!(
            project_id = %project.id,
            change_number = %change.change_number,
            budget = project.budget,
            end_date = %project.end_date,
            "Applied approved change to project"
        );

        Ok(project.clone())
    }

    async fn revert_approved_change(&self, change: &ChangeRequest) -> Result<Project> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&change.project_id)
            .ok_or_else(|| GovernanceError::NotFound(format!("Project {}", change.project_id)))?;

        *project = project.with_change_reverted(change.id)?;

        tracing::warn!(
            project_id = %project.id,
            change_number = %change.change_number,
            "Reverted approved change after failed save"
        );

        Ok(project.clone())
    }
}
