//! Permission resolution
//!
//! Maps an actor's organizational role and functional role to a concrete
//! capability set with numeric approval limits. Resolution is a pure,
//! two-key lookup: the organizational role picks a branch, the functional
//! role picks a row inside it, and every branch has an explicit default.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ActorSnapshot;

/// Role held within the owning organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    MemberWrite,
    MemberRead,
    /// Explicitly no access to the organization
    #[serde(rename = "none")]
    NoRole,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Owner => "owner",
            OrgRole::Admin => "admin",
            OrgRole::MemberWrite => "member_write",
            OrgRole::MemberRead => "member_read",
            OrgRole::NoRole => "none",
        }
    }

    pub fn all() -> [OrgRole; 5] {
        [
            OrgRole::Owner,
            OrgRole::Admin,
            OrgRole::MemberWrite,
            OrgRole::MemberRead,
            OrgRole::NoRole,
        ]
    }
}

impl std::str::FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(OrgRole::Owner),
            "admin" => Ok(OrgRole::Admin),
            "member_write" => Ok(OrgRole::MemberWrite),
            "member_read" => Ok(OrgRole::MemberRead),
            "none" => Ok(OrgRole::NoRole),
            _ => Err(format!("Invalid org role: {}", s)),
        }
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role held within a project's governance structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalRole {
    Executive,
    Sponsor,
    ProjectManager,
    FinanceManager,
    QualityManager,
    TechnicalLead,
    PmoAssistant,
    ProjectCoordinator,
    TeamMember,
    Auditor,
}

impl FunctionalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionalRole::Executive => "executive",
            FunctionalRole::Sponsor => "sponsor",
            FunctionalRole::ProjectManager => "project_manager",
            FunctionalRole::FinanceManager => "finance_manager",
            FunctionalRole::QualityManager => "quality_manager",
            FunctionalRole::TechnicalLead => "technical_lead",
            FunctionalRole::PmoAssistant => "pmo_assistant",
            FunctionalRole::ProjectCoordinator => "project_coordinator",
            FunctionalRole::TeamMember => "team_member",
            FunctionalRole::Auditor => "auditor",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            FunctionalRole::Executive => "Executive",
            FunctionalRole::Sponsor => "Sponsor",
            FunctionalRole::ProjectManager => "Project Manager",
            FunctionalRole::FinanceManager => "Finance Manager",
            FunctionalRole::QualityManager => "Quality Manager",
            FunctionalRole::TechnicalLead => "Technical Lead",
            FunctionalRole::PmoAssistant => "PMO Assistant",
            FunctionalRole::ProjectCoordinator => "Project Coordinator",
            FunctionalRole::TeamMember => "Team Member",
            FunctionalRole::Auditor => "Auditor",
        }
    }

    pub fn all() -> [FunctionalRole; 10] {
        [
            FunctionalRole::Executive,
            FunctionalRole::Sponsor,
            FunctionalRole::ProjectManager,
            FunctionalRole::FinanceManager,
            FunctionalRole::QualityManager,
            FunctionalRole::TechnicalLead,
            FunctionalRole::PmoAssistant,
            FunctionalRole::ProjectCoordinator,
            FunctionalRole::TeamMember,
            FunctionalRole::Auditor,
        ]
    }
}

impl std::str::FromStr for FunctionalRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FunctionalRole::all()
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("Invalid functional role: {}", s))
    }
}

impl std::fmt::Display for FunctionalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse access tier attached to a resolved capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Unlimited,
    Executive,
    Senior,
    Manager,
    Reviewer,
    Contributor,
    ReadOnly,
    Audit,
    NoAccess,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Unlimited => "unlimited",
            AccessLevel::Executive => "executive",
            AccessLevel::Senior => "senior",
            AccessLevel::Manager => "manager",
            AccessLevel::Reviewer => "reviewer",
            AccessLevel::Contributor => "contributor",
            AccessLevel::ReadOnly => "read_only",
            AccessLevel::Audit => "audit",
            AccessLevel::NoAccess => "no_access",
        }
    }
}

/// Maximum impact an actor may approve on their own. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApprovalLimit {
    pub cost: Option<f64>,
    pub schedule_days: Option<u32>,
}

impl ApprovalLimit {
    pub const fn unbounded() -> Self {
        Self {
            cost: None,
            schedule_days: None,
        }
    }

    pub const fn zero() -> Self {
        Self::capped(0.0, 0)
    }

    pub const fn capped(cost: f64, schedule_days: u32) -> Self {
        Self {
            cost: Some(cost),
            schedule_days: Some(schedule_days),
        }
    }

    /// Check both impact dimensions against the limit (inclusive)
    pub fn permits(&self, cost: f64, schedule_days: u32) -> bool {
        let cost_ok = self.cost.map_or(true, |limit| cost <= limit);
        let schedule_ok = self.schedule_days.map_or(true, |limit| schedule_days <= limit);
        cost_ok && schedule_ok
    }
}

/// Derived capabilities of an actor. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilitySet {
    pub can_create: bool,
    pub can_approve: bool,
    pub can_reject: bool,
    pub can_implement: bool,
    pub can_vote_in_committee: bool,
    pub can_assign: bool,
    pub can_comment: bool,
    pub can_view_all: bool,
    pub approval_limit: ApprovalLimit,
    pub resolved_role_label: String,
    pub level: AccessLevel,
}

impl CapabilitySet {
    /// Owners and admins: everything, no limits
    pub fn unrestricted(label: impl Into<String>) -> Self {
        Self {
            can_create: true,
            can_approve: true,
            can_reject: true,
            can_implement: true,
            can_vote_in_committee: true,
            can_assign: true,
            can_comment: true,
            can_view_all: true,
            approval_limit: ApprovalLimit::unbounded(),
            resolved_role_label: label.into(),
            level: AccessLevel::Unlimited,
        }
    }

    /// Write member whose functional role has no table row
    pub fn write_default() -> Self {
        Self {
            can_create: true,
            can_implement: true,
            can_comment: true,
            level: AccessLevel::Contributor,
            ..Self::none("Member")
        }
    }

    /// Read member, any functional role except auditor
    pub fn read_default() -> Self {
        Self {
            can_create: true,
            can_comment: true,
            level: AccessLevel::ReadOnly,
            ..Self::none("Viewer")
        }
    }

    /// Read member holding the auditor role
    pub fn auditor() -> Self {
        Self {
            can_view_all: true,
            can_comment: true,
            level: AccessLevel::Audit,
            ..Self::none(FunctionalRole::Auditor.label())
        }
    }

    /// No organizational access at all
    pub fn none(label: impl Into<String>) -> Self {
        Self {
            can_create: false,
            can_approve: false,
            can_reject: false,
            can_implement: false,
            can_vote_in_committee: false,
            can_assign: false,
            can_comment: false,
            can_view_all: false,
            approval_limit: ApprovalLimit::zero(),
            resolved_role_label: label.into(),
            level: AccessLevel::NoAccess,
        }
    }

    /// Approve capability combined with the approval limit check
    pub fn can_approve_impact(&self, cost: f64, schedule_days: u32) -> bool {
        self.can_approve && self.approval_limit.permits(cost, schedule_days)
    }
}

/// One row of the write-member table
struct RoleRow {
    role: FunctionalRole,
    approve: bool,
    reject: bool,
    implement: bool,
    vote: bool,
    assign: bool,
    view_all: bool,
    limit: ApprovalLimit,
    level: AccessLevel,
}

const WRITE_ROLE_TABLE: [RoleRow; 9] = [
    RoleRow {
        role: FunctionalRole::Executive,
        approve: true,
        reject: true,
        implement: false,
        vote: true,
        assign: true,
        view_all: true,
        limit: ApprovalLimit::unbounded(),
        level: AccessLevel::Executive,
    },
    RoleRow {
        role: FunctionalRole::Sponsor,
        approve: true,
        reject: true,
        implement: false,
        vote: true,
        assign: true,
        view_all: true,
        limit: ApprovalLimit::capped(100_000.0, 30),
        level: AccessLevel::Senior,
    },
    RoleRow {
        role: FunctionalRole::ProjectManager,
        approve: true,
        reject: true,
        implement: true,
        vote: true,
        assign: true,
        view_all: true,
        limit: ApprovalLimit::capped(25_000.0, 15),
        level: AccessLevel::Manager,
    },
    RoleRow {
        role: FunctionalRole::FinanceManager,
        approve: true,
        reject: true,
        implement: false,
        vote: true,
        assign: false,
        view_all: true,
        limit: ApprovalLimit::capped(100_000.0, 0),
        level: AccessLevel::Senior,
    },
    RoleRow {
        role: FunctionalRole::QualityManager,
        approve: true,
        reject: true,
        implement: false,
        vote: true,
        assign: false,
        view_all: true,
        limit: ApprovalLimit::zero(),
        level: AccessLevel::Reviewer,
    },
    RoleRow {
        role: FunctionalRole::TechnicalLead,
        approve: false,
        reject: false,
        implement: true,
        vote: true,
        assign: false,
        view_all: false,
        limit: ApprovalLimit::zero(),
        level: AccessLevel::Contributor,
    },
    RoleRow {
        role: FunctionalRole::PmoAssistant,
        approve: false,
        reject: false,
        implement: true,
        vote: false,
        assign: false,
        view_all: false,
        limit: ApprovalLimit::zero(),
        level: AccessLevel::Contributor,
    },
    RoleRow {
        role: FunctionalRole::ProjectCoordinator,
        approve: false,
        reject: false,
        implement: true,
        vote: false,
        assign: false,
        view_all: false,
        limit: ApprovalLimit::zero(),
        level: AccessLevel::Contributor,
    },
    RoleRow {
        role: FunctionalRole::TeamMember,
        approve: false,
        reject: false,
        implement: false,
        vote: false,
        assign: false,
        view_all: false,
        limit: ApprovalLimit::zero(),
        level: AccessLevel::Contributor,
    },
];

impl RoleRow {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            can_create: true,
            can_approve: self.approve,
            can_reject: self.reject,
            can_implement: self.implement,
            can_vote_in_committee: self.vote,
            can_assign: self.assign,
            can_comment: true,
            can_view_all: self.view_all,
            approval_limit: self.limit,
            resolved_role_label: self.role.label().to_string(),
            level: self.level,
        }
    }
}

/// Resolves (org role, functional role) pairs into capability sets
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve capabilities. Unknown or missing inputs degrade to the most
    /// restrictive set; this never fails.
    pub fn resolve(
        &self,
        org_role: Option<OrgRole>,
        functional_role: Option<FunctionalRole>,
    ) -> CapabilitySet {
        let caps = match org_role {
            Some(OrgRole::Owner) => CapabilitySet::unrestricted("Owner"),
            Some(OrgRole::Admin) => CapabilitySet::unrestricted("Administrator"),
            Some(OrgRole::MemberWrite) => functional_role
                .and_then(|role| WRITE_ROLE_TABLE.iter().find(|row| row.role == role))
                .map(RoleRow::capabilities)
                .unwrap_or_else(CapabilitySet::write_default),
            Some(OrgRole::MemberRead) => match functional_role {
                Some(FunctionalRole::Auditor) => CapabilitySet::auditor(),
                _ => CapabilitySet::read_default(),
            },
            Some(OrgRole::NoRole) | None => CapabilitySet::none("No Access"),
        };

        tracing::debug!(
            org_role = org_role.map(|r| r.as_str()),
            functional_role = functional_role.map(|r| r.as_str()),
            level = caps.level.as_str(),
            "Resolved capabilities"
        );

        caps
    }
}

/// The acting user, supplied explicitly to every facade call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub email: String,
    pub org_role: Option<OrgRole>,
    pub functional_role: Option<FunctionalRole>,
}

impl ActorContext {
    pub fn new(
        email: impl Into<String>,
        org_role: Option<OrgRole>,
        functional_role: Option<FunctionalRole>,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: email.into(),
            org_role,
            functional_role,
        }
    }

    /// Convenience constructor for a write member with a functional role
    pub fn member(email: impl Into<String>, functional_role: FunctionalRole) -> Self {
        Self::new(email, Some(OrgRole::MemberWrite), Some(functional_role))
    }

    pub fn capabilities(&self) -> CapabilitySet {
        PermissionResolver::new().resolve(self.org_role, self.functional_role)
    }

    /// Point-in-time record of this actor for history entries
    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            user_id: self.user_id,
            email: self.email.clone(),
            role_label: self.capabilities().resolved_role_label,
        }
    }
}
