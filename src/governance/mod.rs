//! Change governance: who may act on a change, who must approve it, how the
//! committee decides, and which lifecycle moves are legal.

pub mod authority;
pub mod committee;
pub mod facade;
pub mod permission;
pub mod state_machine;

pub use authority::{Approver, AuthorityDecision, AuthorityLevel, AuthorityRouter, AuthorityThresholds};
pub use committee::{
    CommitteeConfig, CommitteeVote, CommitteeVotingEngine, SeatConfig, SeatId, Tally, VoteResult,
    VoteValue,
};
pub use facade::{Collaborators, GovernanceEvent, GovernanceFacade, VoteReceipt};
pub use permission::{
    AccessLevel, ActorContext, ApprovalLimit, CapabilitySet, FunctionalRole, OrgRole,
    PermissionResolver,
};
pub use state_machine::{ChangeStateMachine, ChangeStatus, Transition, TransitionContext};
