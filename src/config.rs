//! Engine configuration
//!
//! Defaults carry the governance constants; hosts may embed the struct in
//! their own config file or overlay a few values from the environment.

use serde::Deserialize;
use std::collections::HashSet;

use crate::error::{GovernanceError, Result};
use crate::governance::authority::AuthorityThresholds;
use crate::governance::committee::CommitteeConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub authority: AuthorityThresholds,
    pub committee: CommitteeConfig,
    /// Alternatives required before a change may leave impact analysis
    pub min_alternatives: usize,
    pub change_number_prefix: String,
    /// Capacity of the in-process event channel
    pub event_capacity: usize,
    /// SQLite URL for `SqliteStore`, if the host wants one
    pub database_url: Option<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityThresholds::default(),
            committee: CommitteeConfig::default(),
            min_alternatives: 3,
            change_number_prefix: "CR".to_string(),
            event_capacity: 256,
            database_url: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GovernanceError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

impl GovernanceConfig {
    /// Defaults overlaid with `GOVERNANCE_*` and `DATABASE_URL` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(pct) = env_parse("GOVERNANCE_QUORUM_PCT")? {
            config.committee.quorum_pct = pct;
        }
        if let Some(pct) = env_parse("GOVERNANCE_MAJORITY_PCT")? {
            config.committee.majority_pct = pct;
        }
        if let Some(min) = env_parse("GOVERNANCE_MIN_ALTERNATIVES")? {
            config.min_alternatives = min;
        }
        if let Ok(prefix) = std::env::var("GOVERNANCE_CHANGE_PREFIX") {
            config.change_number_prefix = prefix;
        }
        config.database_url = std::env::var("DATABASE_URL").ok();

        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let committee = &self.committee;
        if committee.seats.is_empty() {
            return Err(GovernanceError::Config(
                "committee roster must have at least one seat".to_string(),
            ));
        }

        let mut seats = HashSet::new();
        let mut roles = HashSet::new();
        for seat in &committee.seats {
            if !seats.insert(seat.seat) {
                return Err(GovernanceError::Config(format!(
                    "seat {} appears more than once",
                    seat.seat
                )));
            }
            if !roles.insert(seat.role) {
                return Err(GovernanceError::Config(format!(
                    "role {} holds more than one seat",
                    seat.role
                )));
            }
        }

        if committee.quorum_pct > 100 || committee.majority_pct > 100 {
            return Err(GovernanceError::Config(
                "quorum and majority must be percentages".to_string(),
            ));
        }

        let t = &self.authority;
        if !(t.low_cost_below <= t.medium_cost_below && t.medium_cost_below <= t.high_cost_below) {
            return Err(GovernanceError::Config(
                "authority cost tiers must be ascending".to_string(),
            ));
        }
        if t.medium_schedule_days > t.high_schedule_days {
            return Err(GovernanceError::Config(
                "authority schedule tiers must be ascending".to_string(),
            ));
        }

        if self.change_number_prefix.trim().is_empty() {
            return Err(GovernanceError::Config(
                "change number prefix must not be empty".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(GovernanceError::Config(
                "event capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
