//! Actor identity lookup

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{GovernanceError, Result};
use crate::governance::permission::{ActorContext, FunctionalRole, OrgRole};

/// Supplies the acting user's roles for an organization/project context
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn current_actor(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<ActorContext>;
}

#[derive(Debug, Clone)]
struct Membership {
    email: String,
    org_role: OrgRole,
}

/// Fixed in-memory directory of organization members and project roles
#[derive(Default)]
pub struct StaticDirectory {
    /// (org_id, user_id) -> membership
    members: RwLock<HashMap<(Uuid, Uuid), Membership>>,
    /// (project_id, user_id) -> functional role
    roles: RwLock<HashMap<(Uuid, Uuid), FunctionalRole>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        email: impl Into<String>,
        org_role: OrgRole,
    ) {
        let mut members = self.members.write().await;
        members.insert(
            (org_id, user_id),
            Membership {
                email: email.into(),
                org_role,
            },
        );
    }

    pub async fn assign_role(&self, project_id: Uuid, user_id: Uuid, role: FunctionalRole) {
        let mut roles = self.roles.write().await;
        roles.insert((project_id, user_id), role);
    }
}

#[async_trait]
impl IdentitySource for StaticDirectory {
    async fn current_actor(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<ActorContext> {
        let membership = {
            let members = self.members.read().await;
            members
                .get(&(org_id, user_id))
                .cloned()
                .ok_or_else(|| GovernanceError::NotFound(format!("User {} in organization {}", user_id, org_id)))?
        };

        let functional_role = {
            let roles = self.roles.read().await;
            roles.get(&(project_id, user_id)).copied()
        };

        Ok(ActorContext {
            user_id,
            email: membership.email,
            org_role: Some(membership.org_role),
            functional_role,
        })
    }
}
