//! Change persistence
//!
//! Changes are stored per project as one versioned list. Every save names
//! the version it was read at; a stale version is a conflict and the caller
//! must re-read. Nothing here merges concurrent writes.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};
use crate::models::ChangeRequest;

/// All changes of one project as read at `version`
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub project_id: Uuid,
    /// Zero for a project that has never been saved
    pub version: u64,
    pub changes: Vec<ChangeRequest>,
}

impl ChangeSet {
    pub fn empty(project_id: Uuid) -> Self {
        Self {
            project_id,
            version: 0,
            changes: Vec::new(),
        }
    }

    pub fn find(&self, change_id: Uuid) -> Option<&ChangeRequest> {
        self.changes.iter().find(|c| c.id == change_id)
    }

    pub fn find_mut(&mut self, change_id: Uuid) -> Option<&mut ChangeRequest> {
        self.changes.iter_mut().find(|c| c.id == change_id)
    }
}

#[async_trait]
pub trait ChangeStore: Send + Sync {
    async fn load_changes(&self, project_id: Uuid) -> Result<ChangeSet>;

    /// Persist the set if the stored version still equals `set.version`.
    /// Returns the new version.
    async fn save_changes(&self, set: &ChangeSet) -> Result<u64>;
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<Uuid, (u64, Vec<ChangeRequest>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeStore for MemoryStore {
    async fn load_changes(&self, project_id: Uuid) -> Result<ChangeSet> {
        let projects = self.projects.read().await;
        Ok(projects
            .get(&project_id)
            .map(|(version, changes)| ChangeSet {
                project_id,
                version: *version,
                changes: changes.clone(),
            })
            .unwrap_or_else(|| ChangeSet::empty(project_id)))
    }

    async fn save_changes(&self, set: &ChangeSet) -> Result<u64> {
        let mut projects = self.projects.write().await;
        let found = projects.get(&set.project_id).map_or(0, |(v, _)| *v);

        if found != set.version {
            tracing::warn!(
                project_id = %set.project_id,
                expected = set.version,
                found,
                "Rejected stale write"
            );
            return Err(GovernanceError::Conflict {
                project_id: set.project_id,
                expected: set.version,
                found,
            });
        }

        let version = found + 1;
        projects.insert(set.project_id, (version, set.changes.clone()));
        Ok(version)
    }
}

/// SQLite-backed store; each project is one row holding its changes as JSON
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool on `database_url` and make sure the table exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        tracing::info!(database_url, "Connected change store");
        Ok(store)
    }

    /// Connect using the configured `database_url`
    pub async fn from_config(config: &GovernanceConfig) -> Result<Self> {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            GovernanceError::Config("database_url is required for the SQLite store".to_string())
        })?;
        Self::connect(database_url).await
    }

    /// Create the backing table if it does not exist
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS project_changes (
                project_id TEXT PRIMARY KEY NOT NULL,
                version INTEGER NOT NULL,
                changes TEXT NOT NULL DEFAULT '[]',
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn current_version(&self, project_id: Uuid) -> Result<u64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM project_changes WHERE project_id = ?")
                .bind(project_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map_or(0, |v| v as u64))
    }
}

#[async_trait]
impl ChangeStore for SqliteStore {
    async fn load_changes(&self, project_id: Uuid) -> Result<ChangeSet> {
        let row = sqlx::query_as::<_, ChangeSetRow>(
            r#"
            SELECT version, changes
            FROM project_changes
            WHERE project_id = ?
            "#,
        )
        .bind(project_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(ChangeSet {
                project_id,
                version: row.version as u64,
                changes: serde_json::from_str(&row.changes)?,
            }),
            None => Ok(ChangeSet::empty(project_id)),
        }
    }

    async fn save_changes(&self, set: &ChangeSet) -> Result<u64> {
        let payload = serde_json::to_string(&set.changes)?;
        let now = Utc::now();
        let next = set.version + 1;

        let result = if set.version == 0 {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO project_changes (project_id, version, changes, updated_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(set.project_id.to_string())
            .bind(next as i64)
            .bind(&payload)
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE project_changes
                SET version = ?, changes = ?, updated_at = ?
                WHERE project_id = ? AND version = ?
                "#,
            )
            .bind(next as i64)
            .bind(&payload)
            .bind(now)
            .bind(set.project_id.to_string())
            .bind(set.version as i64)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            let found = self.current_version(set.project_id).await?;
            tracing::warn!(
                project_id = %set.project_id,
                expected = set.version,
                found,
                "Rejected stale write"
            );
            return Err(GovernanceError::Conflict {
                project_id: set.project_id,
                expected: set.version,
                found,
            });
        }

        Ok(next)
    }
}

// Internal row type for sqlx

#[derive(sqlx::FromRow)]
struct ChangeSetRow {
    version: i64,
    changes: String,
}
