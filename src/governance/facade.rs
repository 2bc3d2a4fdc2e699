//! Governance facade
//!
//! Entry point for the presentation layer. Every mutating operation reads the
//! project's changes, validates and mutates a copy of one change, and saves
//! with the version it read. A stale version comes back as
//! `GovernanceError::Conflict`; the caller re-reads and retries.
//!
//! Audit records, notifications and events are emitted after a successful
//! save. Their failures are logged, never returned.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::authority::Approver;
use super::committee::{SeatId, Tally, VoteResult, VoteValue};
use super::permission::{ActorContext, CapabilitySet, FunctionalRole, PermissionResolver};
use super::state_machine::{ChangeStateMachine, ChangeStatus, Transition, TransitionContext};
use crate::collaborators::{
    AuditLog, IdentitySource, MemoryAuditLog, MemoryProjects, NotificationKind, Notifier,
    ProjectMutator, Recipient, StaticDirectory, TracingNotifier,
};
use crate::config::GovernanceConfig;
use crate::error::{permission_denied, GovernanceError, Result};
use crate::models::{next_change_number, AnalysisUpdate, ChangeRequest, NewChangeRequest};
use crate::store::{ChangeSet, ChangeStore, MemoryStore};

const AUDIT_CATEGORY: &str = "change_request";

/// Events emitted by the facade after a successful save
#[derive(Debug, Clone)]
pub enum GovernanceEvent {
    ChangeCreated {
        project_id: Uuid,
        change_id: Uuid,
        change_number: String,
        status: ChangeStatus,
    },
    AnalysisUpdated {
        project_id: Uuid,
        change_id: Uuid,
        alternatives: usize,
        analysis_complete: bool,
    },
    StatusChanged {
        project_id: Uuid,
        change_id: Uuid,
        from: ChangeStatus,
        to: ChangeStatus,
        actor_id: Uuid,
    },
    VoteCast {
        project_id: Uuid,
        change_id: Uuid,
        seat: SeatId,
        vote: VoteValue,
        tally: Tally,
    },
    /// The ballot left `pending`
    CommitteeResolved {
        project_id: Uuid,
        change_id: Uuid,
        result: VoteResult,
    },
}

/// External collaborators the facade talks to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ChangeStore>,
    pub identity: Arc<dyn IdentitySource>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
    pub projects: Arc<dyn ProjectMutator>,
}

impl Collaborators {
    /// In-process collaborators: memory store, empty directory, tracing notifier
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            identity: Arc::new(StaticDirectory::new()),
            notifier: Arc::new(TracingNotifier),
            audit: Arc::new(MemoryAuditLog::new()),
            projects: Arc::new(MemoryProjects::new()),
        }
    }
}

/// Result of a committee vote
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub change: ChangeRequest,
    pub tally: Tally,
}

pub struct GovernanceFacade {
    config: GovernanceConfig,
    machine: ChangeStateMachine,
    resolver: PermissionResolver,
    collaborators: Collaborators,
    event_tx: broadcast::Sender<GovernanceEvent>,
}

impl GovernanceFacade {
    pub fn new(config: GovernanceConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            machine: ChangeStateMachine::from_config(&config),
            resolver: PermissionResolver::new(),
            config,
            collaborators,
            event_tx,
        })
    }

    /// Subscribe to governance events
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn machine(&self) -> &ChangeStateMachine {
        &self.machine
    }

    pub fn capabilities(&self, actor: &ActorContext) -> CapabilitySet {
        self.resolver.resolve(actor.org_role, actor.functional_role)
    }

    /// Resolve the acting user through the identity source
    pub async fn actor_for(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<ActorContext> {
        self.collaborators
            .identity
            .current_actor(org_id, project_id, user_id)
            .await
    }

    // ========================================================================
    // Creation and analysis
    // ========================================================================

    /// Submit a new change. Its number, approver and initial status are
    /// assigned here.
    pub async fn create_change(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        request: NewChangeRequest,
    ) -> Result<ChangeRequest> {
        if !self.capabilities(actor).can_create {
            return Err(permission_denied(format!(
                "{} may not create changes",
                actor.email
            )));
        }

        let mut set = self.collaborators.store.load_changes(project_id).await?;
        let number = next_change_number(&self.config.change_number_prefix, &set.changes);
        let ctx = TransitionContext::new(actor, None);
        let change = self.machine.open(project_id, number, request, &ctx)?;

        set.changes.push(change.clone());
        self.collaborators.store.save_changes(&set).await?;

        tracing::info!(
            project_id = %project_id,
            change_id = %change.id,
            change_number = %change.change_number,
            status = change.status.as_str(),
            approver = change.required_approver.as_str(),
            "Change created"
        );

        self.audit(
            "created",
            json!({
                "change_id": change.id,
                "change_number": change.change_number,
                "project_id": project_id,
                "status": change.status,
                "required_approver": change.required_approver,
                "authority_level": change.authority_level,
                "actor": actor.email,
            }),
        )
        .await;
        let _ = self.event_tx.send(GovernanceEvent::ChangeCreated {
            project_id,
            change_id: change.id,
            change_number: change.change_number.clone(),
            status: change.status,
        });
        self.notify_all(self.notifications_for(&change), &change).await;

        Ok(change)
    }

    /// Edit alternatives and analysis text while the change is in impact analysis
    pub async fn update_analysis(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        update: AnalysisUpdate,
    ) -> Result<ChangeRequest> {
        let (set, mut change) = self.load_change(project_id, change_id).await?;

        if change.status != ChangeStatus::ImpactAnalysis {
            return Err(GovernanceError::InvalidTransition {
                from: change.status,
                reason: "analysis can only be edited during impact analysis".to_string(),
            });
        }
        let caps = self.capabilities(actor);
        if !(caps.can_implement || caps.can_assign) {
            return Err(permission_denied(format!(
                "{} may not edit impact analysis",
                actor.email
            )));
        }
        if let Some(bad) = update
            .alternatives
            .iter()
            .flatten()
            .find(|alt| alt.name.trim().is_empty() || !alt.cost.is_finite() || alt.cost < 0.0)
        {
            return Err(GovernanceError::Validation(format!(
                "alternative {} needs a name and a non-negative cost",
                bad.id
            )));
        }

        if let Some(alternatives) = update.alternatives {
            change.alternatives = alternatives;
        }
        if let Some(complete) = update.analysis_complete {
            change.impact_analysis_complete = complete;
        }
        if update.scope.is_some() {
            change.impact.scope = update.scope;
        }
        if update.quality.is_some() {
            change.impact.quality = update.quality;
        }
        if update.resources.is_some() {
            change.impact.resources = update.resources;
        }
        change.updated_at = chrono::Utc::now();

        let change = self.commit(set, change).await?;

        tracing::debug!(
            change_id = %change.id,
            alternatives = change.alternatives.len(),
            complete = change.impact_analysis_complete,
            "Analysis updated"
        );
        self.audit(
            "analysis_updated",
            json!({
                "change_id": change.id,
                "alternatives": change.alternatives.len(),
                "analysis_complete": change.impact_analysis_complete,
                "actor": actor.email,
            }),
        )
        .await;
        let _ = self.event_tx.send(GovernanceEvent::AnalysisUpdated {
            project_id,
            change_id: change.id,
            alternatives: change.alternatives.len(),
            analysis_complete: change.impact_analysis_complete,
        });

        Ok(change)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub async fn complete_analysis(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        self.transition(actor, project_id, change_id, Transition::CompleteAnalysis, comments)
            .await
    }

    /// Direct approval by a single approver. Applies the change to the project.
    pub async fn approve(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        self.transition(actor, project_id, change_id, Transition::Approve, comments)
            .await
    }

    pub async fn reject(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        self.transition(actor, project_id, change_id, Transition::Reject, comments)
            .await
    }

    pub async fn refer_to_committee(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        self.transition(actor, project_id, change_id, Transition::ReferToCommittee, comments)
            .await
    }

    pub async fn select_alternative(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        index: usize,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        self.transition(
            actor,
            project_id,
            change_id,
            Transition::SelectAlternative(index),
            comments,
        )
        .await
    }

    pub async fn mark_implemented(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        self.transition(actor, project_id, change_id, Transition::MarkImplemented, comments)
            .await
    }

    /// Move a legacy `submitted` change to the status its impact calls for
    pub async fn triage(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
    ) -> Result<ChangeRequest> {
        self.transition(actor, project_id, change_id, Transition::Triage, None)
            .await
    }

    /// Record a committee vote. When the ballot resolves, the committee
    /// decision is applied in the same save.
    pub async fn cast_vote(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        seat: SeatId,
        vote: VoteValue,
        comments: Option<String>,
    ) -> Result<VoteReceipt> {
        let (set, mut change) = self.load_change(project_id, change_id).await?;
        let ctx = TransitionContext::new(actor, comments);

        let tally = self.machine.record_vote(&mut change, seat, vote, &ctx)?;
        let from = change.status;
        if tally.result != VoteResult::Pending {
            self.machine
                .apply(&mut change, Transition::CommitteeDecision, &ctx)?;
        }

        let change = self.persist(set, change).await?;

        tracing::info!(
            change_id = %change.id,
            seat = seat.as_str(),
            vote = vote.as_str(),
            votes_cast = tally.votes_cast,
            result = tally.result.as_str(),
            "Committee vote recorded"
        );
        self.audit(
            "vote_cast",
            json!({
                "change_id": change.id,
                "seat": seat,
                "vote": vote,
                "voter": actor.email,
                "tally": &tally,
            }),
        )
        .await;
        let _ = self.event_tx.send(GovernanceEvent::VoteCast {
            project_id,
            change_id: change.id,
            seat,
            vote,
            tally: tally.clone(),
        });

        if tally.result != VoteResult::Pending {
            let _ = self.event_tx.send(GovernanceEvent::CommitteeResolved {
                project_id,
                change_id: change.id,
                result: tally.result,
            });
            self.after_transition(actor, from, &change, Transition::CommitteeDecision)
                .await;
        }

        Ok(VoteReceipt { change, tally })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Changes the actor may see: all of them with view-all, otherwise their own
    pub async fn list_changes(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
    ) -> Result<Vec<ChangeRequest>> {
        let caps = self.capabilities(actor);
        let set = self.collaborators.store.load_changes(project_id).await?;
        Ok(set
            .changes
            .into_iter()
            .filter(|c| caps.can_view_all || c.created_by.user_id == actor.user_id)
            .collect())
    }

    pub async fn get_change(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
    ) -> Result<ChangeRequest> {
        let (_, change) = self.load_change(project_id, change_id).await?;
        if !self.capabilities(actor).can_view_all && change.created_by.user_id != actor.user_id {
            return Err(permission_denied(format!(
                "{} may not view {}",
                actor.email, change.change_number
            )));
        }
        Ok(change)
    }

    /// Live tally of a change's ballot
    pub async fn tally(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
    ) -> Result<Tally> {
        let change = self.get_change(actor, project_id, change_id).await?;
        Ok(self.machine.tally(&change))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn load_change(
        &self,
        project_id: Uuid,
        change_id: Uuid,
    ) -> Result<(ChangeSet, ChangeRequest)> {
        let set = self.collaborators.store.load_changes(project_id).await?;
        let change = set.find(change_id).cloned().ok_or_else(|| {
            GovernanceError::NotFound(format!("Change {} in project {}", change_id, project_id))
        })?;
        Ok((set, change))
    }

    async fn transition(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        change_id: Uuid,
        transition: Transition,
        comments: Option<String>,
    ) -> Result<ChangeRequest> {
        let (set, mut change) = self.load_change(project_id, change_id).await?;
        let from = change.status;

        let ctx = TransitionContext::new(actor, comments);
        self.machine.apply(&mut change, transition, &ctx)?;

        let change = self.persist(set, change).await?;
        self.after_transition(actor, from, &change, transition).await;
        Ok(change)
    }

    /// Save a mutated change. An approval is applied to the project first and
    /// reverted if the save fails. The revert removes only this change's
    /// adjustment, so approvals applied in between keep theirs.
    async fn persist(&self, set: ChangeSet, change: ChangeRequest) -> Result<ChangeRequest> {
        let approved_now = change.status == ChangeStatus::Approved
            && set
                .find(change.id)
                .map_or(true, |stored| stored.status != ChangeStatus::Approved);
        if !approved_now {
            return self.commit(set, change).await;
        }

        self.collaborators
            .projects
            .apply_approved_change(&change)
            .await?;

        let applied = change.clone();
        match self.commit(set, change).await {
            Ok(change) => Ok(change),
            Err(err) => {
                if let Err(revert_err) = self
                    .collaborators
                    .projects
                    .revert_approved_change(&applied)
                    .await
                {
                    tracing::error!(
                        change_id = %applied.id,
                        error = %revert_err,
                        "Failed to revert project after failed approval save"
                    );
                }
                Err(err)
            }
        }
    }

    async fn commit(&self, mut set: ChangeSet, change: ChangeRequest) -> Result<ChangeRequest> {
        match set.find_mut(change.id) {
            Some(slot) => *slot = change.clone(),
            None => set.changes.push(change.clone()),
        }
        let version = self.collaborators.store.save_changes(&set).await?;
        tracing::debug!(project_id = %set.project_id, version, "Saved changes");
        Ok(change)
    }

    async fn after_transition(
        &self,
        actor: &ActorContext,
        from: ChangeStatus,
        change: &ChangeRequest,
        transition: Transition,
    ) {
        self.audit(
            transition.as_str(),
            json!({
                "change_id": change.id,
                "change_number": change.change_number,
                "from": from,
                "to": change.status,
                "selected_alternative": change.selected_alternative,
                "actor": actor.email,
            }),
        )
        .await;
        let _ = self.event_tx.send(GovernanceEvent::StatusChanged {
            project_id: change.project_id,
            change_id: change.id,
            from,
            to: change.status,
            actor_id: actor.user_id,
        });
        self.notify_all(self.notifications_for(change), change).await;
    }

    /// Who to tell about a change that just entered its current status
    fn notifications_for(&self, change: &ChangeRequest) -> Vec<(NotificationKind, Recipient)> {
        let mut notes = vec![(
            NotificationKind::StatusChanged,
            Recipient::User(change.created_by.email.clone()),
        )];

        match change.status {
            ChangeStatus::ImpactAnalysis => notes.push((
                NotificationKind::AnalysisRequired,
                Recipient::Role(FunctionalRole::ProjectManager),
            )),
            ChangeStatus::ReadyForReview if self.machine.requires_committee(change) => notes.push((
                NotificationKind::ApprovalRequired,
                Recipient::Approver(Approver::Committee),
            )),
            ChangeStatus::ReadyForReview => notes.push((
                NotificationKind::ApprovalRequired,
                Recipient::Approver(change.required_approver),
            )),
            ChangeStatus::UnderReview => notes.extend(
                self.machine
                    .committee()
                    .config()
                    .seats
                    .iter()
                    .map(|s| (NotificationKind::CommitteeReviewRequested, Recipient::Seat(s.seat))),
            ),
            _ => {}
        }

        notes
    }

    async fn notify_all(&self, notes: Vec<(NotificationKind, Recipient)>, change: &ChangeRequest) {
        let notifier = &self.collaborators.notifier;
        let sends = notes.iter().map(|(kind, recipient)| async move {
            (recipient, notifier.notify(*kind, recipient, change).await)
        });

        for (recipient, result) in join_all(sends).await {
            if let Err(err) = result {
                tracing::warn!(
                    change_id = %change.id,
                    recipient = ?recipient,
                    error = %err,
                    "Notification failed"
                );
            }
        }
    }

    async fn audit(&self, action: &str, payload: serde_json::Value) {
        if let Err(err) = self
            .collaborators
            .audit
            .record(AUDIT_CATEGORY, action, payload)
            .await
        {
            tracing::warn!(action, error = %err, "Audit record failed");
        }
    }
}
