//! Governance engine integration tests
//!
//! Drives full change lifecycles through the facade with in-process
//! collaborators and both store backends.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use change_governance::collaborators::{
    MemoryAuditLog, MemoryProjects, NotificationKind, Project, Recipient, RecordingNotifier,
    StaticDirectory,
};
use change_governance::governance::{
    ActorContext, Approver, AuthorityLevel, ChangeStatus, Collaborators, FunctionalRole,
    GovernanceEvent, GovernanceFacade, OrgRole, SeatId, TransitionContext, VoteResult, VoteValue,
};
use change_governance::models::{
    Alternative, AnalysisUpdate, ChangeCategory, ChangePriority, ImpactAssessment,
    NewChangeRequest,
};
use change_governance::store::{ChangeSet, ChangeStore, MemoryStore, SqliteStore};
use change_governance::{GovernanceConfig, GovernanceError, Result};

const BUDGET: f64 = 1_000_000.0;

/// Memory store that can let another writer slip in before the next save
#[derive(Default)]
struct RacingStore {
    inner: MemoryStore,
    race_next_save: AtomicBool,
}

#[async_trait]
impl ChangeStore for RacingStore {
    async fn load_changes(&self, project_id: Uuid) -> Result<ChangeSet> {
        self.inner.load_changes(project_id).await
    }

    async fn save_changes(&self, set: &ChangeSet) -> Result<u64> {
        if self.race_next_save.swap(false, Ordering::SeqCst) {
            let current = self.inner.load_changes(set.project_id).await?;
            self.inner.save_changes(&current).await?;
        }
        self.inner.save_changes(set).await
    }
}

/// Memory store that parks the next save until the test releases it
#[derive(Default)]
struct GatedStore {
    inner: MemoryStore,
    hold_next_save: AtomicBool,
    parked: Notify,
    release: Notify,
}

#[async_trait]
impl ChangeStore for GatedStore {
    async fn load_changes(&self, project_id: Uuid) -> Result<ChangeSet> {
        self.inner.load_changes(project_id).await
    }

    async fn save_changes(&self, set: &ChangeSet) -> Result<u64> {
        if self.hold_next_save.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        self.inner.save_changes(set).await
    }
}

struct TestEnv {
    facade: GovernanceFacade,
    store: Arc<dyn ChangeStore>,
    projects: Arc<MemoryProjects>,
    audit: Arc<MemoryAuditLog>,
    notifier: Arc<RecordingNotifier>,
    project_id: Uuid,
}

async fn setup_with_store(store: Arc<dyn ChangeStore>) -> TestEnv {
    let projects = Arc::new(MemoryProjects::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let project = Project::new(
        "ERP rollout",
        BUDGET,
        NaiveDate::from_ymd_opt(2027, 3, 31).unwrap(),
    );
    let project_id = project.id;
    projects.insert(project).await;

    let collaborators = Collaborators {
        store: store.clone(),
        identity: Arc::new(StaticDirectory::new()),
        notifier: notifier.clone(),
        audit: audit.clone(),
        projects: projects.clone(),
    };
    let facade = GovernanceFacade::new(GovernanceConfig::default(), collaborators)
        .expect("Failed to build facade");

    TestEnv {
        facade,
        store,
        projects,
        audit,
        notifier,
        project_id,
    }
}

async fn setup() -> TestEnv {
    setup_with_store(Arc::new(MemoryStore::new())).await
}

fn member(role: FunctionalRole) -> ActorContext {
    ActorContext::member(format!("{}@example.com", role.as_str()), role)
}

fn request(title: &str, cost: f64, days: u32) -> NewChangeRequest {
    NewChangeRequest {
        title: title.to_string(),
        description: "Replace the reporting module".to_string(),
        justification: "Finance needs monthly close reports".to_string(),
        category: ChangeCategory::Scope,
        priority: ChangePriority::High,
        impact: ImpactAssessment::new(cost, days),
    }
}

fn three_alternatives() -> AnalysisUpdate {
    AnalysisUpdate {
        alternatives: Some(vec![
            Alternative::new("Defer", "Revisit next phase", 0.0, 0).with_cons(["no reports"]),
            Alternative::new("Extend", "Extend current module", 12_000.0, 10),
            Alternative::new("Replace", "Buy a reporting add-on", 20_000.0, 15)
                .with_pros(["vendor support"]),
        ]),
        analysis_complete: Some(true),
        scope: Some("Reporting".to_string()),
        ..AnalysisUpdate::default()
    }
}

/// Create a change and carry it through impact analysis
async fn ready_change(env: &TestEnv, cost: f64, days: u32) -> Uuid {
    let pm = member(FunctionalRole::ProjectManager);
    let change = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Reporting", cost, days))
            .await
    );
    assert_eq!(change.status, ChangeStatus::ImpactAnalysis);

    assert_ok!(
        env.facade
            .update_analysis(&pm, env.project_id, change.id, three_alternatives())
            .await
    );
    let change = assert_ok!(
        env.facade
            .complete_analysis(&pm, env.project_id, change.id, None)
            .await
    );
    assert_eq!(change.status, ChangeStatus::ReadyForReview);
    change.id
}

#[tokio::test]
async fn test_sponsor_flow_through_implementation() {
    let env = setup().await;
    let pm = member(FunctionalRole::ProjectManager);
    let sponsor = member(FunctionalRole::Sponsor);

    let change = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Reporting", 20_000.0, 15))
            .await
    );
    assert_eq!(change.authority_level, AuthorityLevel::Medium);
    assert_eq!(change.required_approver, Approver::Sponsor);
    assert!(!env.facade.machine().requires_committee(&change));

    // analysis gate: two alternatives are not enough
    let mut short = three_alternatives();
    if let Some(alts) = short.alternatives.as_mut() {
        alts.truncate(2);
    }
    assert_ok!(
        env.facade
            .update_analysis(&pm, env.project_id, change.id, short)
            .await
    );
    let err = assert_err!(
        env.facade
            .complete_analysis(&pm, env.project_id, change.id, None)
            .await
    );
    assert!(matches!(
        err,
        GovernanceError::IncompleteAnalysis {
            alternatives: 2,
            required: 3,
            ..
        }
    ));

    assert_ok!(
        env.facade
            .update_analysis(&pm, env.project_id, change.id, three_alternatives())
            .await
    );
    assert_ok!(
        env.facade
            .complete_analysis(&pm, env.project_id, change.id, Some("analysed".into()))
            .await
    );

    let approved = assert_ok!(
        env.facade
            .approve(&sponsor, env.project_id, change.id, Some("go".into()))
            .await
    );
    assert_eq!(approved.status, ChangeStatus::Approved);

    let implementing = assert_ok!(
        env.facade
            .select_alternative(&pm, env.project_id, change.id, 2, None)
            .await
    );
    assert_eq!(implementing.status, ChangeStatus::Implementing);
    assert_eq!(implementing.selected().map(|a| a.name.as_str()), Some("Replace"));

    let done = assert_ok!(
        env.facade
            .mark_implemented(&pm, env.project_id, change.id, None)
            .await
    );
    assert_eq!(done.status, ChangeStatus::Implemented);

    let statuses: Vec<ChangeStatus> = done.status_history.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            ChangeStatus::ImpactAnalysis,
            ChangeStatus::ReadyForReview,
            ChangeStatus::Approved,
            ChangeStatus::Implementing,
            ChangeStatus::Implemented,
        ]
    );
    assert_eq!(done.status_history[2].actor.email, sponsor.email);

    let project = env.projects.get(env.project_id).await.unwrap();
    assert_eq!(project.budget, BUDGET + 20_000.0);
    assert_eq!(project.end_date, NaiveDate::from_ymd_opt(2027, 4, 15).unwrap());

    // closed changes accept no further moves
    let err = assert_err!(
        env.facade
            .approve(&sponsor, env.project_id, change.id, None)
            .await
    );
    assert_eq!(err.code(), "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_approval_over_limit_is_denied() {
    let env = setup().await;
    let change_id = ready_change(&env, 30_000.0, 5).await;

    // 30k is committee territory even for a sponsor
    let err = assert_err!(
        env.facade
            .approve(&member(FunctionalRole::Sponsor), env.project_id, change_id, None)
            .await
    );
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let pm = member(FunctionalRole::ProjectManager);
    let small = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Licenses", 24_000.0, 16))
            .await
    );
    let small_id = small.id;
    assert_ok!(
        env.facade
            .update_analysis(&pm, env.project_id, small_id, three_alternatives())
            .await
    );
    assert_ok!(
        env.facade
            .complete_analysis(&pm, env.project_id, small_id, None)
            .await
    );

    let err = assert_err!(env.facade.approve(&pm, env.project_id, small_id, None).await);
    assert_eq!(err.code(), "PERMISSION_DENIED");

    let stored = assert_ok!(env.facade.get_change(&pm, env.project_id, small_id).await);
    assert_eq!(stored.status, ChangeStatus::ReadyForReview);
    assert_eq!(stored.status_history.len(), 2);
    assert_eq!(env.projects.get(env.project_id).await.unwrap().budget, BUDGET);
}

#[tokio::test]
async fn test_critical_change_goes_to_committee() {
    let env = setup().await;
    let mut rx = env.facade.subscribe();
    let change_id = ready_change(&env, 150_000.0, 10).await;

    let executive = member(FunctionalRole::Executive);
    let err = assert_err!(
        env.facade
            .approve(&executive, env.project_id, change_id, None)
            .await
    );
    assert!(matches!(err, GovernanceError::InvalidTransition { .. }));

    let referred = assert_ok!(
        env.facade
            .refer_to_committee(&member(FunctionalRole::ProjectManager), env.project_id, change_id, None)
            .await
    );
    assert_eq!(referred.status, ChangeStatus::UnderReview);
    assert_eq!(referred.authority_level, AuthorityLevel::Critical);
    assert_eq!(referred.required_approver, Approver::ExecutiveBoard);
    let ballot = referred.committee_votes.clone().unwrap();
    assert_eq!(ballot.len(), 5);
    assert!(ballot.iter().all(|v| v.vote == VoteValue::Unset));

    let sent = env.notifier.sent().await;
    for seat in [SeatId::Pm, SeatId::Tech, SeatId::Finance, SeatId::Quality, SeatId::Sponsor] {
        assert!(sent.contains(&(
            NotificationKind::CommitteeReviewRequested,
            Recipient::Seat(seat),
            change_id
        )));
    }

    let votes = [
        (FunctionalRole::ProjectManager, SeatId::Pm, VoteValue::Approve),
        (FunctionalRole::TechnicalLead, SeatId::Tech, VoteValue::Approve),
        (FunctionalRole::FinanceManager, SeatId::Finance, VoteValue::Approve),
        (FunctionalRole::QualityManager, SeatId::Quality, VoteValue::Reject),
    ];
    for (role, seat, vote) in votes {
        let receipt = assert_ok!(
            env.facade
                .cast_vote(&member(role), env.project_id, change_id, seat, vote, None)
                .await
        );
        assert_eq!(receipt.tally.result, VoteResult::Pending);
        assert_eq!(receipt.change.status, ChangeStatus::UnderReview);
    }

    let receipt = assert_ok!(
        env.facade
            .cast_vote(
                &member(FunctionalRole::Sponsor),
                env.project_id,
                change_id,
                SeatId::Sponsor,
                VoteValue::Abstain,
                Some("conflict of interest".into()),
            )
            .await
    );
    assert_eq!(receipt.tally.quorum_pct, 100.0);
    assert_eq!(receipt.tally.approve_pct, 60.0);
    assert!(receipt.tally.has_majority);
    assert_eq!(receipt.tally.result, VoteResult::Approved);
    assert_eq!(receipt.change.status, ChangeStatus::Approved);

    let project = env.projects.get(env.project_id).await.unwrap();
    assert_eq!(project.budget, BUDGET + 150_000.0);
    assert_eq!(project.scope_history.len(), 1);

    let mut resolved = false;
    while let Ok(event) = rx.try_recv() {
        if let GovernanceEvent::CommitteeResolved { result, .. } = event {
            assert_eq!(result, VoteResult::Approved);
            resolved = true;
        }
    }
    assert!(resolved);
    assert_eq!(env.audit.entries_for("vote_cast").await.len(), 5);
    assert_eq!(env.audit.entries_for("committee_decision").await.len(), 1);
}

#[tokio::test]
async fn test_committee_rejection_leaves_project_alone() {
    let env = setup().await;
    let change_id = ready_change(&env, 120_000.0, 0).await;
    let pm = member(FunctionalRole::ProjectManager);
    assert_ok!(
        env.facade
            .refer_to_committee(&pm, env.project_id, change_id, None)
            .await
    );

    let votes = [
        (FunctionalRole::ProjectManager, SeatId::Pm, VoteValue::Approve),
        (FunctionalRole::TechnicalLead, SeatId::Tech, VoteValue::Approve),
        (FunctionalRole::FinanceManager, SeatId::Finance, VoteValue::Reject),
        (FunctionalRole::QualityManager, SeatId::Quality, VoteValue::Reject),
        (FunctionalRole::Sponsor, SeatId::Sponsor, VoteValue::Abstain),
    ];
    let mut last = None;
    for (role, seat, vote) in votes {
        last = Some(assert_ok!(
            env.facade
                .cast_vote(&member(role), env.project_id, change_id, seat, vote, None)
                .await
        ));
    }

    let receipt = last.unwrap();
    assert_eq!(receipt.tally.approve_pct, 40.0);
    assert_eq!(receipt.tally.result, VoteResult::Rejected);
    assert_eq!(receipt.change.status, ChangeStatus::Rejected);
    assert_eq!(env.projects.get(env.project_id).await.unwrap().budget, BUDGET);

    // resolved ballots take no more votes
    let err = assert_err!(
        env.facade
            .cast_vote(&pm, env.project_id, change_id, SeatId::Pm, VoteValue::Reject, None)
            .await
    );
    assert_eq!(err.code(), "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_partial_ballot_stays_pending() {
    let env = setup().await;
    let change_id = ready_change(&env, 200_000.0, 0).await;
    assert_ok!(
        env.facade
            .refer_to_committee(&member(FunctionalRole::Sponsor), env.project_id, change_id, None)
            .await
    );

    for (role, seat) in [
        (FunctionalRole::ProjectManager, SeatId::Pm),
        (FunctionalRole::FinanceManager, SeatId::Finance),
    ] {
        assert_ok!(
            env.facade
                .cast_vote(&member(role), env.project_id, change_id, seat, VoteValue::Approve, None)
                .await
        );
    }

    let viewer = member(FunctionalRole::Executive);
    let tally = assert_ok!(env.facade.tally(&viewer, env.project_id, change_id).await);
    assert_eq!(tally.quorum_pct, 40.0);
    assert_eq!(tally.approve_pct, 40.0);
    assert!(!tally.has_quorum);
    assert_eq!(tally.result, VoteResult::Pending);
}

#[tokio::test]
async fn test_voter_must_hold_the_seat() {
    let env = setup().await;
    let change_id = ready_change(&env, 110_000.0, 0).await;
    assert_ok!(
        env.facade
            .refer_to_committee(&member(FunctionalRole::ProjectManager), env.project_id, change_id, None)
            .await
    );

    let err = assert_err!(
        env.facade
            .cast_vote(
                &member(FunctionalRole::TechnicalLead),
                env.project_id,
                change_id,
                SeatId::Finance,
                VoteValue::Approve,
                None,
            )
            .await
    );
    assert!(matches!(err, GovernanceError::InvalidVoter { seat: SeatId::Finance, .. }));

    // executives hold no seat
    let err = assert_err!(
        env.facade
            .cast_vote(
                &member(FunctionalRole::Executive),
                env.project_id,
                change_id,
                SeatId::Sponsor,
                VoteValue::Approve,
                None,
            )
            .await
    );
    assert_eq!(err.code(), "INVALID_VOTER");

    let err = assert_err!(
        env.facade
            .cast_vote(
                &member(FunctionalRole::TeamMember),
                env.project_id,
                change_id,
                SeatId::Pm,
                VoteValue::Approve,
                None,
            )
            .await
    );
    assert_eq!(err.code(), "INVALID_VOTER");

    // the pm seat holder with a read-only org role is refused by capability
    let reader = ActorContext::new(
        "reader@example.com",
        Some(OrgRole::MemberRead),
        Some(FunctionalRole::ProjectManager),
    );
    let err = assert_err!(
        env.facade
            .cast_vote(&reader, env.project_id, change_id, SeatId::Pm, VoteValue::Approve, None)
            .await
    );
    assert_eq!(err.code(), "PERMISSION_DENIED");

    let tally = assert_ok!(
        env.facade
            .tally(&member(FunctionalRole::Sponsor), env.project_id, change_id)
            .await
    );
    assert_eq!(tally.votes_cast, 0);
}

#[tokio::test]
async fn test_votes_on_different_seats_both_land() {
    let env = setup().await;
    let change_id = ready_change(&env, 130_000.0, 0).await;
    assert_ok!(
        env.facade
            .refer_to_committee(&member(FunctionalRole::ProjectManager), env.project_id, change_id, None)
            .await
    );

    let tech = member(FunctionalRole::TechnicalLead);
    let quality = member(FunctionalRole::QualityManager);
    let (a, b) = tokio::join!(
        env.facade
            .cast_vote(&tech, env.project_id, change_id, SeatId::Tech, VoteValue::Approve, None),
        env.facade
            .cast_vote(&quality, env.project_id, change_id, SeatId::Quality, VoteValue::Reject, None),
    );

    // a loser of the race must re-read and retry, never merge
    for (result, actor, seat, vote) in [
        (a, &tech, SeatId::Tech, VoteValue::Approve),
        (b, &quality, SeatId::Quality, VoteValue::Reject),
    ] {
        match result {
            Ok(_) => {}
            Err(err) if err.is_conflict() => {
                assert_ok!(
                    env.facade
                        .cast_vote(actor, env.project_id, change_id, seat, vote, None)
                        .await
                );
            }
            Err(err) => panic!("unexpected error: {}", err),
        }
    }

    let tally = assert_ok!(
        env.facade
            .tally(&member(FunctionalRole::Sponsor), env.project_id, change_id)
            .await
    );
    assert_eq!(tally.votes_cast, 2);
    assert_eq!(tally.approvals, 1);
    assert_eq!(tally.rejections, 1);
}

#[tokio::test]
async fn test_stale_write_is_a_conflict() {
    let env = setup().await;
    let change_id = ready_change(&env, 140_000.0, 0).await;

    let stale = assert_ok!(env.store.load_changes(env.project_id).await);
    assert_ok!(
        env.facade
            .refer_to_committee(&member(FunctionalRole::ProjectManager), env.project_id, change_id, None)
            .await
    );

    let err = assert_err!(env.store.save_changes(&stale).await);
    assert!(err.is_conflict());

    let current = assert_ok!(env.store.load_changes(env.project_id).await);
    assert_eq!(current.find(change_id).unwrap().status, ChangeStatus::UnderReview);
}

#[tokio::test]
async fn test_failed_approval_save_reverts_project() {
    let store = Arc::new(RacingStore::default());
    let env = setup_with_store(store.clone()).await;
    let pm = member(FunctionalRole::ProjectManager);

    let change = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Monitors", 3_000.0, 0))
            .await
    );
    assert_eq!(change.status, ChangeStatus::ReadyForReview);

    store.race_next_save.store(true, Ordering::SeqCst);
    let err = assert_err!(env.facade.approve(&pm, env.project_id, change.id, None).await);
    assert!(err.is_conflict());

    let project = env.projects.get(env.project_id).await.unwrap();
    assert_eq!(project.budget, BUDGET);
    assert!(project.scope_history.is_empty());
    let stored = assert_ok!(env.facade.get_change(&pm, env.project_id, change.id).await);
    assert_eq!(stored.status, ChangeStatus::ReadyForReview);

    // retry from a fresh read
    let approved = assert_ok!(env.facade.approve(&pm, env.project_id, change.id, None).await);
    assert_eq!(approved.status, ChangeStatus::Approved);
    assert_eq!(env.projects.get(env.project_id).await.unwrap().budget, BUDGET + 3_000.0);
}

#[tokio::test]
async fn test_failed_approval_keeps_interleaved_approval() {
    let store = Arc::new(GatedStore::default());
    let env = setup_with_store(store.clone()).await;
    let pm = member(FunctionalRole::ProjectManager);

    let first = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Monitors", 3_000.0, 0))
            .await
    );
    let second = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Docking stations", 4_000.0, 0))
            .await
    );

    // the first approval has touched the project and is parked before its save;
    // the second approval completes in full meanwhile
    store.hold_next_save.store(true, Ordering::SeqCst);
    let (result, ()) = tokio::join!(
        env.facade.approve(&pm, env.project_id, first.id, None),
        async {
            store.parked.notified().await;
            let approved =
                assert_ok!(env.facade.approve(&pm, env.project_id, second.id, None).await);
            assert_eq!(approved.status, ChangeStatus::Approved);
            store.release.notify_one();
        },
    );
    let err = assert_err!(result);
    assert!(err.is_conflict());

    let project = env.projects.get(env.project_id).await.unwrap();
    assert_eq!(project.budget, BUDGET + 4_000.0);
    assert_eq!(project.scope_history.len(), 1);
    assert_eq!(project.scope_history[0].change_id, second.id);

    let stored = assert_ok!(env.facade.get_change(&pm, env.project_id, first.id).await);
    assert_eq!(stored.status, ChangeStatus::ReadyForReview);
    let stored = assert_ok!(env.facade.get_change(&pm, env.project_id, second.id).await);
    assert_eq!(stored.status, ChangeStatus::Approved);
}

#[tokio::test]
async fn test_out_of_range_schedule_aborts_approval() {
    let env = setup().await;
    let pm = member(FunctionalRole::ProjectManager);

    // a stored record that predates the schedule bound
    let ctx = TransitionContext::new(&pm, None);
    let mut legacy = assert_ok!(env.facade.machine().open(
        env.project_id,
        "CR-0001".to_string(),
        request("Legacy", 1_000.0, 0),
        &ctx,
    ));
    legacy.impact.schedule_days = 200_000_000;
    legacy.status = ChangeStatus::UnderReview;

    let mut set = assert_ok!(env.store.load_changes(env.project_id).await);
    set.changes.push(legacy.clone());
    assert_ok!(env.store.save_changes(&set).await);

    let seats = [
        (SeatId::Pm, FunctionalRole::ProjectManager),
        (SeatId::Tech, FunctionalRole::TechnicalLead),
        (SeatId::Finance, FunctionalRole::FinanceManager),
        (SeatId::Quality, FunctionalRole::QualityManager),
    ];
    for (seat, role) in seats {
        assert_ok!(
            env.facade
                .cast_vote(&member(role), env.project_id, legacy.id, seat, VoteValue::Approve, None)
                .await
        );
    }
    let err = assert_err!(
        env.facade
            .cast_vote(
                &member(FunctionalRole::Sponsor),
                env.project_id,
                legacy.id,
                SeatId::Sponsor,
                VoteValue::Approve,
                None,
            )
            .await
    );
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let project = env.projects.get(env.project_id).await.unwrap();
    assert_eq!(project.budget, BUDGET);
    assert!(project.scope_history.is_empty());
    let stored = assert_ok!(env.facade.get_change(&pm, env.project_id, legacy.id).await);
    assert_eq!(stored.status, ChangeStatus::UnderReview);
    assert_eq!(env.facade.machine().tally(&stored).votes_cast, 4);
}

#[tokio::test]
async fn test_legacy_submitted_change_is_triaged() {
    let env = setup().await;
    let pm = member(FunctionalRole::ProjectManager);

    let ctx = TransitionContext::new(&pm, None);
    let mut legacy = assert_ok!(env.facade.machine().open(
        env.project_id,
        "CR-0001".to_string(),
        request("Legacy", 40_000.0, 0),
        &ctx,
    ));
    legacy.status = ChangeStatus::Submitted;

    let mut set = assert_ok!(env.store.load_changes(env.project_id).await);
    set.changes.push(legacy.clone());
    assert_ok!(env.store.save_changes(&set).await);

    let err = assert_err!(env.facade.approve(&pm, env.project_id, legacy.id, None).await);
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let triaged = assert_ok!(env.facade.triage(&pm, env.project_id, legacy.id).await);
    assert_eq!(triaged.status, ChangeStatus::ImpactAnalysis);

    // numbering continues after the legacy record
    let next = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Next", 1_000.0, 0))
            .await
    );
    assert_eq!(next.change_number, "CR-0002");
}

#[tokio::test]
async fn test_actor_for_resolves_through_directory() {
    let directory = Arc::new(StaticDirectory::new());
    let (org, project, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    directory
        .add_member(org, user, "sponsor@example.com", OrgRole::MemberWrite)
        .await;
    directory.assign_role(project, user, FunctionalRole::Sponsor).await;

    let collaborators = Collaborators {
        identity: directory,
        ..Collaborators::in_memory()
    };
    let facade = assert_ok!(GovernanceFacade::new(GovernanceConfig::default(), collaborators));

    let actor = assert_ok!(facade.actor_for(org, project, user).await);
    let caps = facade.capabilities(&actor);
    assert!(caps.can_approve);
    assert_eq!(caps.approval_limit.cost, Some(100_000.0));

    let err = assert_err!(facade.actor_for(org, project, Uuid::new_v4()).await);
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_sqlite_backed_lifecycle() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    let sqlite = SqliteStore::new(pool.clone());
    sqlite.init_schema().await.expect("Failed to create schema");

    let env = setup_with_store(Arc::new(sqlite)).await;
    let pm = member(FunctionalRole::ProjectManager);

    let change = assert_ok!(
        env.facade
            .create_change(&pm, env.project_id, request("Badges", 2_500.0, 2))
            .await
    );
    let rejected = assert_ok!(
        env.facade
            .reject(&pm, env.project_id, change.id, Some("not now".into()))
            .await
    );
    assert_eq!(rejected.status, ChangeStatus::Rejected);

    // a second store on the same pool sees the persisted record
    let reopened = SqliteStore::new(pool);
    let set = assert_ok!(reopened.load_changes(env.project_id).await);
    assert_eq!(set.version, 2);
    let stored = set.find(change.id).unwrap();
    assert_eq!(stored, &rejected);
    assert_eq!(stored.status_history[1].comments.as_deref(), Some("not now"));
}
