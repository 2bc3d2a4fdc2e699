//! Audit trail

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub category: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(
        &self,
        category: &str,
        action: &str,
        payload: serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// Append-only audit log held in memory
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Entries whose action matches
    pub async fn entries_for(&self, action: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(
        &self,
        category: &str,
        action: &str,
        payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(AuditEntry {
            category: category.to_string(),
            action: action.to_string(),
            payload,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
