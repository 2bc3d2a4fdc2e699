//! Change lifecycle
//!
//! Validates and applies status transitions. Every precondition is checked
//! before the record is touched, so a failed transition leaves the change
//! exactly as it was. A successful transition appends one history entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::authority::AuthorityRouter;
use super::committee::{CommitteeVotingEngine, SeatId, Tally, VoteResult, VoteValue};
use super::permission::ActorContext;
use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};
use crate::models::{ChangeRequest, NewChangeRequest};

/// Lifecycle status of a change request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Legacy intake status; creation never assigns it
    Submitted,
    ImpactAnalysis,
    ReadyForReview,
    UnderReview,
    Approved,
    Implementing,
    Implemented,
    Rejected,
    Cancelled,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Submitted => "submitted",
            ChangeStatus::ImpactAnalysis => "impact_analysis",
            ChangeStatus::ReadyForReview => "ready_for_review",
            ChangeStatus::UnderReview => "under_review",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Implementing => "implementing",
            ChangeStatus::Implemented => "implemented",
            ChangeStatus::Rejected => "rejected",
            ChangeStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChangeStatus::Implemented | ChangeStatus::Rejected | ChangeStatus::Cancelled
        )
    }
}

impl std::str::FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(ChangeStatus::Submitted),
            "impact_analysis" => Ok(ChangeStatus::ImpactAnalysis),
            "ready_for_review" => Ok(ChangeStatus::ReadyForReview),
            "under_review" => Ok(ChangeStatus::UnderReview),
            "approved" => Ok(ChangeStatus::Approved),
            "implementing" => Ok(ChangeStatus::Implementing),
            "implemented" => Ok(ChangeStatus::Implemented),
            "rejected" => Ok(ChangeStatus::Rejected),
            "cancelled" => Ok(ChangeStatus::Cancelled),
            _ => Err(format!("Invalid change status: {}", s)),
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested lifecycle move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// impact_analysis -> ready_for_review
    CompleteAnalysis,
    /// ready_for_review -> approved, single approver
    Approve,
    /// ready_for_review -> rejected
    Reject,
    /// ready_for_review -> under_review
    ReferToCommittee,
    /// under_review -> approved | rejected, from the ballot tally
    CommitteeDecision,
    /// approved -> implementing
    SelectAlternative(usize),
    /// implementing -> implemented
    MarkImplemented,
    /// submitted -> initial status for the change's impact
    Triage,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::CompleteAnalysis => "complete_analysis",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::ReferToCommittee => "refer_to_committee",
            Transition::CommitteeDecision => "committee_decision",
            Transition::SelectAlternative(_) => "select_alternative",
            Transition::MarkImplemented => "mark_implemented",
            Transition::Triage => "triage",
        }
    }
}

/// Who is moving the change, when, and why
#[derive(Debug, Clone)]
pub struct TransitionContext<'a> {
    pub actor: &'a ActorContext,
    pub comments: Option<String>,
    pub at: DateTime<Utc>,
}

impl<'a> TransitionContext<'a> {
    pub fn new(actor: &'a ActorContext, comments: Option<String>) -> Self {
        Self {
            actor,
            comments,
            at: Utc::now(),
        }
    }
}

fn invalid(from: ChangeStatus, reason: impl Into<String>) -> GovernanceError {
    GovernanceError::InvalidTransition {
        from,
        reason: reason.into(),
    }
}

fn denied(actor: &ActorContext, what: &str) -> GovernanceError {
    GovernanceError::PermissionDenied(format!("{} may not {}", actor.email, what))
}

/// Lifecycle rules for change requests
#[derive(Debug, Clone)]
pub struct ChangeStateMachine {
    router: AuthorityRouter,
    committee: CommitteeVotingEngine,
    min_alternatives: usize,
}

impl ChangeStateMachine {
    pub fn new(
        router: AuthorityRouter,
        committee: CommitteeVotingEngine,
        min_alternatives: usize,
    ) -> Self {
        Self {
            router,
            committee,
            min_alternatives,
        }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(
            AuthorityRouter::new(config.authority.clone()),
            CommitteeVotingEngine::new(config.committee.clone()),
            config.min_alternatives,
        )
    }

    pub fn min_alternatives(&self) -> usize {
        self.min_alternatives
    }

    pub fn router(&self) -> &AuthorityRouter {
        &self.router
    }

    pub fn committee(&self) -> &CommitteeVotingEngine {
        &self.committee
    }

    /// Status a change starts in, given its impact
    pub fn initial_status(&self, cost: f64, schedule_days: u32) -> ChangeStatus {
        if self.router.needs_analysis(cost, schedule_days) {
            ChangeStatus::ImpactAnalysis
        } else {
            ChangeStatus::ReadyForReview
        }
    }

    pub fn requires_committee(&self, change: &ChangeRequest) -> bool {
        self.router.requires_committee(
            change.authority_level,
            change.required_approver,
            change.impact.cost,
            change.impact.schedule_days,
        )
    }

    /// Build a new change: routed, numbered and placed in its initial status
    pub fn open(
        &self,
        project_id: Uuid,
        change_number: String,
        request: NewChangeRequest,
        ctx: &TransitionContext<'_>,
    ) -> Result<ChangeRequest> {
        request.validate()?;

        let impact = request.impact;
        let decision = self.router.route(impact.cost, impact.schedule_days);
        let status = self.initial_status(impact.cost, impact.schedule_days);
        let creator = ctx.actor.snapshot();

        let mut change = ChangeRequest {
            id: Uuid::new_v4(),
            change_number,
            project_id,
            title: request.title,
            description: request.description,
            justification: request.justification,
            category: request.category,
            priority: request.priority,
            impact,
            status,
            required_approver: decision.approver,
            authority_level: decision.level,
            alternatives: Vec::new(),
            selected_alternative: None,
            committee_votes: None,
            impact_analysis_complete: false,
            status_history: Vec::new(),
            created_by: creator.clone(),
            created_at: ctx.at,
            updated_at: ctx.at,
        };
        change.record_status(status, creator, ctx.comments.clone(), ctx.at);

        Ok(change)
    }

    /// Validate a transition without touching the change. Returns the target status.
    pub fn check(
        &self,
        change: &ChangeRequest,
        transition: Transition,
        actor: &ActorContext,
    ) -> Result<ChangeStatus> {
        let from = change.status;
        if from.is_terminal() {
            return Err(invalid(from, "change is closed"));
        }

        let caps = actor.capabilities();
        let require_status = |required: ChangeStatus| {
            if from == required {
                Ok(())
            } else {
                Err(invalid(
                    from,
                    format!("{} requires status {}", transition.as_str(), required),
                ))
            }
        };

        match transition {
            Transition::CompleteAnalysis => {
                require_status(ChangeStatus::ImpactAnalysis)?;
                if !(caps.can_implement || caps.can_assign) {
                    return Err(denied(actor, "complete impact analysis"));
                }
                if !change.impact_analysis_complete
                    || change.alternatives.len() < self.min_alternatives
                {
                    return Err(GovernanceError::IncompleteAnalysis {
                        alternatives: change.alternatives.len(),
                        required: self.min_alternatives,
                        analysis_complete: change.impact_analysis_complete,
                    });
                }
                Ok(ChangeStatus::ReadyForReview)
            }
            Transition::Approve => {
                require_status(ChangeStatus::ReadyForReview)?;
                if self.requires_committee(change) {
                    return Err(invalid(
                        from,
                        format!(
                            "{} authority requires committee review",
                            change.required_approver
                        ),
                    ));
                }
                if !caps.can_approve {
                    return Err(denied(actor, "approve changes"));
                }
                if !caps.approval_limit.permits(change.impact.cost, change.impact.schedule_days) {
                    return Err(GovernanceError::PermissionDenied(format!(
                        "impact of {} / {} days exceeds the approval limit of {}",
                        change.impact.cost, change.impact.schedule_days, caps.resolved_role_label
                    )));
                }
                Ok(ChangeStatus::Approved)
            }
            Transition::Reject => {
                require_status(ChangeStatus::ReadyForReview)?;
                if !caps.can_reject {
                    return Err(denied(actor, "reject changes"));
                }
                Ok(ChangeStatus::Rejected)
            }
            Transition::ReferToCommittee => {
                require_status(ChangeStatus::ReadyForReview)?;
                if !self.requires_committee(change) {
                    return Err(invalid(
                        from,
                        format!("{} can decide this change directly", change.required_approver),
                    ));
                }
                if !(caps.can_approve || caps.can_assign) {
                    return Err(denied(actor, "refer changes to the committee"));
                }
                Ok(ChangeStatus::UnderReview)
            }
            Transition::CommitteeDecision => {
                require_status(ChangeStatus::UnderReview)?;
                match self.tally(change).result {
                    VoteResult::Pending => Err(invalid(from, "committee vote is still pending")),
                    VoteResult::Approved => Ok(ChangeStatus::Approved),
                    VoteResult::Rejected => Ok(ChangeStatus::Rejected),
                }
            }
            Transition::SelectAlternative(index) => {
                require_status(ChangeStatus::Approved)?;
                if !(caps.can_implement || caps.can_approve) {
                    return Err(denied(actor, "select an implementation alternative"));
                }
                if index >= change.alternatives.len() {
                    return Err(GovernanceError::Validation(format!(
                        "alternative {} does not exist ({} available)",
                        index,
                        change.alternatives.len()
                    )));
                }
                Ok(ChangeStatus::Implementing)
            }
            Transition::MarkImplemented => {
                require_status(ChangeStatus::Implementing)?;
                if !caps.can_implement {
                    return Err(denied(actor, "mark changes implemented"));
                }
                Ok(ChangeStatus::Implemented)
            }
            Transition::Triage => {
                require_status(ChangeStatus::Submitted)?;
                if !caps.can_create {
                    return Err(denied(actor, "triage changes"));
                }
                Ok(self.initial_status(change.impact.cost, change.impact.schedule_days))
            }
        }
    }

    /// Validate and apply a transition, appending one history entry
    pub fn apply(
        &self,
        change: &mut ChangeRequest,
        transition: Transition,
        ctx: &TransitionContext<'_>,
    ) -> Result<ChangeStatus> {
        let target = self.check(change, transition, ctx.actor)?;

        match transition {
            Transition::ReferToCommittee => {
                change.committee_votes = Some(self.committee.open_ballot());
            }
            Transition::SelectAlternative(index) => {
                change.selected_alternative = Some(index);
            }
            _ => {}
        }

        let from = change.status;
        change.record_status(target, ctx.actor.snapshot(), ctx.comments.clone(), ctx.at);

        tracing::info!(
            change_id = %change.id,
            change_number = %change.change_number,
            from = from.as_str(),
            to = target.as_str(),
            transition = transition.as_str(),
            "Change transitioned"
        );

        Ok(target)
    }

    /// Record a seat vote on a change under committee review. Not a
    /// transition: the history is untouched until the ballot resolves.
    pub fn record_vote(
        &self,
        change: &mut ChangeRequest,
        seat: SeatId,
        value: VoteValue,
        ctx: &TransitionContext<'_>,
    ) -> Result<Tally> {
        if change.status != ChangeStatus::UnderReview {
            return Err(invalid(change.status, "votes are only accepted under committee review"));
        }

        let mut ballot = change
            .committee_votes
            .clone()
            .unwrap_or_else(|| self.committee.open_ballot());
        self.committee
            .cast_vote(&mut ballot, seat, value, ctx.comments.clone(), ctx.actor, ctx.at)?;

        change.committee_votes = Some(ballot);
        change.updated_at = ctx.at;
        Ok(self.tally(change))
    }

    /// Current tally of a change's ballot
    pub fn tally(&self, change: &ChangeRequest) -> Tally {
        let ballot = change.committee_votes.as_deref().unwrap_or(&[]);
        self.committee.tally(ballot)
    }
}

impl Default for ChangeStateMachine {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}
