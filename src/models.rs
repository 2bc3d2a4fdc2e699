//! Data models for change requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{validation_error, Result};
use crate::governance::authority::{Approver, AuthorityLevel};
use crate::governance::committee::CommitteeVote;
use crate::governance::state_machine::ChangeStatus;

/// Longest schedule impact a change may claim, in days (about a century)
pub const MAX_SCHEDULE_DAYS: u32 = 36_500;

/// Area of the project a change touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Scope,
    Schedule,
    Cost,
    Quality,
    Resources,
    Risk,
    Procurement,
    Communication,
}

impl ChangeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Scope => "scope",
            ChangeCategory::Schedule => "schedule",
            ChangeCategory::Cost => "cost",
            ChangeCategory::Quality => "quality",
            ChangeCategory::Resources => "resources",
            ChangeCategory::Risk => "risk",
            ChangeCategory::Procurement => "procurement",
            ChangeCategory::Communication => "communication",
        }
    }
}

impl std::str::FromStr for ChangeCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scope" => Ok(ChangeCategory::Scope),
            "schedule" => Ok(ChangeCategory::Schedule),
            "cost" => Ok(ChangeCategory::Cost),
            "quality" => Ok(ChangeCategory::Quality),
            "resources" => Ok(ChangeCategory::Resources),
            "risk" => Ok(ChangeCategory::Risk),
            "procurement" => Ok(ChangeCategory::Procurement),
            "communication" => Ok(ChangeCategory::Communication),
            _ => Err(format!("Invalid change category: {}", s)),
        }
    }
}

/// Priority of a change request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl ChangePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangePriority::Low => "low",
            ChangePriority::Medium => "medium",
            ChangePriority::High => "high",
            ChangePriority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for ChangePriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(ChangePriority::Low),
            "medium" => Ok(ChangePriority::Medium),
            "high" => Ok(ChangePriority::High),
            "critical" => Ok(ChangePriority::Critical),
            _ => Err(format!("Invalid change priority: {}", s)),
        }
    }
}

/// Estimated impact of a change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    /// Currency units
    pub cost: f64,
    pub schedule_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
}

impl ImpactAssessment {
    pub fn new(cost: f64, schedule_days: u32) -> Self {
        Self {
            cost,
            schedule_days,
            ..Self::default()
        }
    }
}

/// A candidate way of implementing a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub cost: f64,
    pub schedule_days: u32,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

impl Alternative {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        cost: f64,
        schedule_days: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            cost,
            schedule_days,
            pros: Vec::new(),
            cons: Vec::new(),
        }
    }

    pub fn with_pros(mut self, pros: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pros = pros.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cons(mut self, cons: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cons = cons.into_iter().map(Into::into).collect();
        self
    }
}

/// Point-in-time record of who acted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub user_id: Uuid,
    pub email: String,
    pub role_label: String,
}

/// One entry of the append-only status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: ChangeStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub actor: ActorSnapshot,
}

/// A proposed change to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: Uuid,
    /// Per-project sequential number, e.g. `CR-0007`
    pub change_number: String,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub justification: String,
    pub category: ChangeCategory,
    pub priority: ChangePriority,
    pub impact: ImpactAssessment,
    pub status: ChangeStatus,
    pub required_approver: Approver,
    pub authority_level: AuthorityLevel,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    pub selected_alternative: Option<usize>,
    pub committee_votes: Option<Vec<CommitteeVote>>,
    #[serde(default)]
    pub impact_analysis_complete: bool,
    #[serde(default)]
    pub status_history: Vec<StatusEntry>,
    pub created_by: ActorSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChangeRequest {
    /// Append a history entry and move to `status`
    pub(crate) fn record_status(
        &mut self,
        status: ChangeStatus,
        actor: ActorSnapshot,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history.push(StatusEntry {
            status,
            timestamp: at,
            comments,
            actor,
        });
        self.updated_at = at;
    }

    pub fn selected(&self) -> Option<&Alternative> {
        self.selected_alternative
            .and_then(|idx| self.alternatives.get(idx))
    }
}

/// Request to create a new change
#[derive(Debug, Clone, Deserialize)]
pub struct NewChangeRequest {
    pub title: String,
    pub description: String,
    pub justification: String,
    pub category: ChangeCategory,
    #[serde(default)]
    pub priority: ChangePriority,
    pub impact: ImpactAssessment,
}

impl NewChangeRequest {
    /// Required fields must be present and impact values usable
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.justification.trim().is_empty() {
            missing.push("justification");
        }
        if !missing.is_empty() {
            return Err(validation_error(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        if !self.impact.cost.is_finite() || self.impact.cost < 0.0 {
            return Err(validation_error(
                "Cost impact must be a non-negative amount",
            ));
        }
        if self.impact.schedule_days > MAX_SCHEDULE_DAYS {
            return Err(validation_error(format!(
                "Schedule impact of {} days exceeds the {} day limit",
                self.impact.schedule_days, MAX_SCHEDULE_DAYS
            )));
        }
        Ok(())
    }
}

/// Edits allowed while a change is in impact analysis
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisUpdate {
    pub alternatives: Option<Vec<Alternative>>,
    pub analysis_complete: Option<bool>,
    pub scope: Option<String>,
    pub quality: Option<String>,
    pub resources: Option<String>,
}

/// Format a change number from its sequence
pub fn format_change_number(prefix: &str, sequence: u32) -> String {
    format!("{}-{:04}", prefix, sequence)
}

/// Next change number for a project: one past the highest existing sequence
pub fn next_change_number(prefix: &str, existing: &[ChangeRequest]) -> String {
    let highest = existing
        .iter()
        .filter_map(|c| c.change_number.rsplit('-').next())
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format_change_number(prefix, highest + 1)
}
