//! Committee voting
//!
//! A fixed roster of seats votes on changes that exceed any single
//! approver's authority. Percentages are always taken over the whole roster,
//! never over the votes actually cast: two approvals out of five seats is 40%
//! even when nobody else has voted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::{ActorContext, FunctionalRole};
use crate::error::{GovernanceError, Result};

/// Committee seat identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatId {
    Pm,
    Tech,
    Finance,
    Quality,
    Sponsor,
}

impl SeatId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatId::Pm => "pm",
            SeatId::Tech => "tech",
            SeatId::Finance => "finance",
            SeatId::Quality => "quality",
            SeatId::Sponsor => "sponsor",
        }
    }
}

impl std::str::FromStr for SeatId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pm" => Ok(SeatId::Pm),
            "tech" => Ok(SeatId::Tech),
            "finance" => Ok(SeatId::Finance),
            "quality" => Ok(SeatId::Quality),
            "sponsor" => Ok(SeatId::Sponsor),
            _ => Err(format!("Invalid seat: {}", s)),
        }
    }
}

impl std::fmt::Display for SeatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A seat's vote. `Unset` means the seat has not voted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Approve,
    Reject,
    Abstain,
    #[default]
    Unset,
}

impl VoteValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteValue::Approve => "approve",
            VoteValue::Reject => "reject",
            VoteValue::Abstain => "abstain",
            VoteValue::Unset => "unset",
        }
    }

    pub fn is_recorded(&self) -> bool {
        !matches!(self, VoteValue::Unset)
    }
}

impl std::str::FromStr for VoteValue {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "approve" => Ok(VoteValue::Approve),
            "reject" => Ok(VoteValue::Reject),
            "abstain" => Ok(VoteValue::Abstain),
            "unset" => Ok(VoteValue::Unset),
            _ => Err(format!("Invalid vote: {}", s)),
        }
    }
}

/// One seat's entry on a change's ballot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeVote {
    pub seat_id: SeatId,
    pub vote: VoteValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_by: Option<Uuid>,
}

impl CommitteeVote {
    pub fn unset(seat_id: SeatId) -> Self {
        Self {
            seat_id,
            vote: VoteValue::Unset,
            comments: None,
            voted_at: None,
            voted_by: None,
        }
    }
}

/// Roster entry mapping a seat to the functional role that holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatConfig {
    pub seat: SeatId,
    pub role: FunctionalRole,
    pub label: String,
    /// Carried for presentation only; quorum and majority ignore it
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl SeatConfig {
    pub fn new(seat: SeatId, role: FunctionalRole, label: impl Into<String>) -> Self {
        Self {
            seat,
            role,
            label: label.into(),
            required: true,
        }
    }
}

/// Committee roster and decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteeConfig {
    pub seats: Vec<SeatConfig>,
    /// Minimum share of the roster that must vote, inclusive
    pub quorum_pct: u32,
    /// Share of the roster that must approve, exclusive
    pub majority_pct: u32,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            seats: vec![
                SeatConfig::new(SeatId::Pm, FunctionalRole::ProjectManager, "Project Manager"),
                SeatConfig::new(SeatId::Tech, FunctionalRole::TechnicalLead, "Technical Lead"),
                SeatConfig::new(SeatId::Finance, FunctionalRole::FinanceManager, "Finance"),
                SeatConfig::new(SeatId::Quality, FunctionalRole::QualityManager, "Quality"),
                SeatConfig::new(SeatId::Sponsor, FunctionalRole::Sponsor, "Sponsor"),
            ],
            quorum_pct: 60,
            majority_pct: 50,
        }
    }
}

/// Outcome of a ballot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteResult {
    Pending,
    Approved,
    Rejected,
}

impl VoteResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteResult::Pending => "pending",
            VoteResult::Approved => "approved",
            VoteResult::Rejected => "rejected",
        }
    }
}

/// Live tally of a ballot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub total_seats: usize,
    pub votes_cast: usize,
    pub approvals: usize,
    pub rejections: usize,
    pub abstentions: usize,
    pub quorum_pct: f64,
    pub approve_pct: f64,
    pub has_quorum: bool,
    pub has_majority: bool,
    pub result: VoteResult,
}

/// Records votes and computes tallies against the configured roster
#[derive(Debug, Clone, Default)]
pub struct CommitteeVotingEngine {
    config: CommitteeConfig,
}

impl CommitteeVotingEngine {
    pub fn new(config: CommitteeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommitteeConfig {
        &self.config
    }

    /// Seat held by a functional role, if any
    pub fn seat_for_role(&self, role: FunctionalRole) -> Option<SeatId> {
        self.config
            .seats
            .iter()
            .find(|s| s.role == role)
            .map(|s| s.seat)
    }

    /// Fresh ballot with every roster seat unset
    pub fn open_ballot(&self) -> Vec<CommitteeVote> {
        self.config
            .seats
            .iter()
            .map(|s| CommitteeVote::unset(s.seat))
            .collect()
    }

    /// Record `value` for `seat`, overwriting any earlier vote by that seat.
    /// All checks run before the ballot is touched.
    pub fn cast_vote(
        &self,
        ballot: &mut Vec<CommitteeVote>,
        seat: SeatId,
        value: VoteValue,
        comments: Option<String>,
        voter: &ActorContext,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !value.is_recorded() {
            return Err(GovernanceError::Validation(
                "A vote must be approve, reject or abstain".to_string(),
            ));
        }

        let seat_config = self
            .config
            .seats
            .iter()
            .find(|s| s.seat == seat)
            .ok_or_else(|| GovernanceError::InvalidVoter {
                seat,
                reason: "seat is not on the committee roster".to_string(),
            })?;

        match voter.functional_role {
            Some(role) if role == seat_config.role => {}
            Some(role) => {
                return Err(GovernanceError::InvalidVoter {
                    seat,
                    reason: match self.seat_for_role(role) {
                        Some(own) => format!("role {} holds seat {}", role, own),
                        None => format!("role {} holds no committee seat", role),
                    },
                })
            }
            None => {
                return Err(GovernanceError::InvalidVoter {
                    seat,
                    reason: "voter has no functional role".to_string(),
                })
            }
        }

        // the seat holder's org role can still withhold the vote
        if !voter.capabilities().can_vote_in_committee {
            return Err(GovernanceError::PermissionDenied(format!(
                "{} may not vote in committee",
                voter.email
            )));
        }

        let entry = match ballot.iter().position(|v| v.seat_id == seat) {
            Some(idx) => &mut ballot[idx],
            None => {
                ballot.push(CommitteeVote::unset(seat));
                let last = ballot.len() - 1;
                &mut ballot[last]
            }
        };
        entry.vote = value;
        entry.comments = comments;
        entry.voted_at = Some(at);
        entry.voted_by = Some(voter.user_id);

        tracing::debug!(seat = seat.as_str(), vote = value.as_str(), "Recorded committee vote");
        Ok(())
    }

    /// Tally a ballot. Only roster seats count, each at most once.
    pub fn tally(&self, ballot: &[CommitteeVote]) -> Tally {
        let total = self.config.seats.len();
        let (mut cast, mut approvals, mut rejections, mut abstentions) = (0, 0, 0, 0);

        for seat in &self.config.seats {
            let vote = ballot
                .iter()
                .find(|v| v.seat_id == seat.seat)
                .map(|v| v.vote)
                .unwrap_or_default();
            match vote {
                VoteValue::Approve => approvals += 1,
                VoteValue::Reject => rejections += 1,
                VoteValue::Abstain => abstentions += 1,
                VoteValue::Unset => continue,
            }
            cast += 1;
        }

        let pct = |count: usize| {
            if total == 0 {
                0.0
            } else {
                (count as f64 * 100.0) / total as f64
            }
        };

        // integer comparisons keep exact boundaries (3 of 5 is exactly 60%)
        let has_quorum = cast * 100 >= self.config.quorum_pct as usize * total;
        let has_majority = has_quorum && approvals * 100 > self.config.majority_pct as usize * total;

        let result = if cast < total {
            VoteResult::Pending
        } else if has_quorum && has_majority {
            VoteResult::Approved
        } else {
            VoteResult::Rejected
        };

        Tally {
            total_seats: total,
            votes_cast: cast,
            approvals,
            rejections,
            abstentions,
            quorum_pct: pct(cast),
            approve_pct: pct(approvals),
            has_quorum,
            has_majority,
            result,
        }
    }
}
