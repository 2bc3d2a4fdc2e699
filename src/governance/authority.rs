//! Authority routing
//!
//! Maps a change's cost and schedule impact to the approver tier that may
//! decide it. Cost picks the starting tier; schedule can only escalate it.

use serde::{Deserialize, Serialize};

/// Escalation tier, ordered low < medium < high < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl AuthorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityLevel::Low => "low",
            AuthorityLevel::Medium => "medium",
            AuthorityLevel::High => "high",
            AuthorityLevel::Critical => "critical",
        }
    }

    /// Approver that owns decisions at this tier
    pub fn approver(&self) -> Approver {
        match self {
            AuthorityLevel::Low => Approver::ProjectManager,
            AuthorityLevel::Medium => Approver::Sponsor,
            AuthorityLevel::High => Approver::Committee,
            AuthorityLevel::Critical => Approver::ExecutiveBoard,
        }
    }
}

impl std::str::FromStr for AuthorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AuthorityLevel::Low),
            "medium" => Ok(AuthorityLevel::Medium),
            "high" => Ok(AuthorityLevel::High),
            "critical" => Ok(AuthorityLevel::Critical),
            _ => Err(format!("Invalid authority level: {}", s)),
        }
    }
}

impl std::fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who must sign off on a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approver {
    ProjectManager,
    Sponsor,
    Committee,
    ExecutiveBoard,
}

impl Approver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approver::ProjectManager => "project_manager",
            Approver::Sponsor => "sponsor",
            Approver::Committee => "committee",
            Approver::ExecutiveBoard => "executive_board",
        }
    }

    /// Approvers that can only act through a committee vote
    pub fn is_collective(&self) -> bool {
        matches!(self, Approver::Committee | Approver::ExecutiveBoard)
    }
}

impl std::fmt::Display for Approver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of routing a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDecision {
    pub approver: Approver,
    pub level: AuthorityLevel,
}

/// Cost and schedule boundaries used by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityThresholds {
    /// Costs below this are `low`
    pub low_cost_below: f64,
    /// Costs below this are `medium`
    pub medium_cost_below: f64,
    /// Costs below this are `high`, anything else `critical`
    pub high_cost_below: f64,
    /// Schedule slip that lifts a `low` change to `medium`
    pub medium_schedule_days: u32,
    /// Schedule slip that lifts a change to `high`
    pub high_schedule_days: u32,
    pub analysis_cost: f64,
    pub analysis_schedule_days: u32,
    /// Strict upper bounds past which a committee is always required
    pub committee_cost_above: f64,
    pub committee_schedule_days_above: u32,
}

impl Default for AuthorityThresholds {
    fn default() -> Self {
        Self {
            low_cost_below: 5_000.0,
            medium_cost_below: 25_000.0,
            high_cost_below: 100_000.0,
            medium_schedule_days: 15,
            high_schedule_days: 30,
            analysis_cost: 25_000.0,
            analysis_schedule_days: 15,
            committee_cost_above: 100_000.0,
            committee_schedule_days_above: 30,
        }
    }
}

/// Pure router from impact to authority
#[derive(Debug, Clone, Default)]
pub struct AuthorityRouter {
    thresholds: AuthorityThresholds,
}

impl AuthorityRouter {
    pub fn new(thresholds: AuthorityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AuthorityThresholds {
        &self.thresholds
    }

    /// Route a change. Schedule escalates monotonically and never reaches
    /// `critical` on its own.
    pub fn route(&self, cost: f64, schedule_days: u32) -> AuthorityDecision {
        let t = &self.thresholds;

        let mut level = if cost < t.low_cost_below {
            AuthorityLevel::Low
        } else if cost < t.medium_cost_below {
            AuthorityLevel::Medium
        } else if cost < t.high_cost_below {
            AuthorityLevel::High
        } else {
            AuthorityLevel::Critical
        };

        if schedule_days >= t.high_schedule_days {
            level = level.max(AuthorityLevel::High);
        } else if schedule_days >= t.medium_schedule_days && level == AuthorityLevel::Low {
            level = AuthorityLevel::Medium;
        }

        let decision = AuthorityDecision {
            approver: level.approver(),
            level,
        };

        tracing::debug!(
            cost,
            schedule_days,
            level = decision.level.as_str(),
            approver = decision.approver.as_str(),
            "Routed change authority"
        );

        decision
    }

    /// Whether the change must pass through impact analysis first
    pub fn needs_analysis(&self, cost: f64, schedule_days: u32) -> bool {
        cost >= self.thresholds.analysis_cost
            || schedule_days >= self.thresholds.analysis_schedule_days
    }

    /// Whether the change can only be decided by the committee
    pub fn requires_committee(
        &self,
        level: AuthorityLevel,
        approver: Approver,
        cost: f64,
        schedule_days: u32,
    ) -> bool {
        level >= AuthorityLevel::High
            || approver.is_collective()
            || cost > self.thresholds.committee_cost_above
            || schedule_days > self.thresholds.committee_schedule_days_above
    }

    /// `requires_committee` for a freshly routed impact
    pub fn requires_committee_for(&self, cost: f64, schedule_days: u32) -> bool {
        let decision = self.route(cost, schedule_days);
        self.requires_committee(decision.level, decision.approver, cost, schedule_days)
    }
}
