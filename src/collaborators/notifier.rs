//! Best-effort notifications

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::governance::authority::Approver;
use crate::governance::committee::SeatId;
use crate::governance::permission::FunctionalRole;
use crate::models::ChangeRequest;

/// What happened to the change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AnalysisRequired,
    ApprovalRequired,
    CommitteeReviewRequested,
    StatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AnalysisRequired => "analysis_required",
            NotificationKind::ApprovalRequired => "approval_required",
            NotificationKind::CommitteeReviewRequested => "committee_review_requested",
            NotificationKind::StatusChanged => "status_changed",
        }
    }
}

/// Who should hear about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Recipient {
    User(String),
    Role(FunctionalRole),
    Approver(Approver),
    Seat(SeatId),
}

/// Delivery failures are reported back but never fail the engine operation
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        kind: NotificationKind,
        recipient: &Recipient,
        change: &ChangeRequest,
    ) -> anyhow::Result<()>;
}

/// Writes notifications to the trace log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        recipient: &Recipient,
        change: &ChangeRequest,
    ) -> anyhow::Result<()> {
        tracing::info!(
            kind = kind.as_str(),
            recipient = ?recipient,
            change_number = %change.change_number,
            status = change.status.as_str(),
            "Notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory; can be told to fail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<(NotificationKind, Recipient, Uuid)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<(NotificationKind, Recipient, Uuid)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        recipient: &Recipient,
        change: &ChangeRequest,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("delivery to {:?} failed", recipient);
        }
        let mut sent = self.sent.write().await;
        sent.push((kind, recipient.clone(), change.id));
        Ok(())
    }
}
