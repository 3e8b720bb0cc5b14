use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::SchedulingRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// Action-tracking record written before a request goes to the solver.
/// Informational only; nothing in the planning flow reads it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub category: String,
    pub kind: String,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action_required: bool,
}

impl NotificationRecord {
    pub fn generation_requested(request: &SchedulingRequest) -> Self {
        Self {
            category: "planning".to_string(),
            kind: "session_generation_requested".to_string(),
            priority: Priority::Normal,
            title: format!("Génération du planning: {}", request.display_name()),
            message: format!(
                "Demande envoyée au solveur pour une {} du {} au {} ({} participants, {} jours)",
                request.session_kind.label(),
                request.start_date,
                request.end_date,
                request.participant_count,
                request.nb_jours
            ),
            entity_type: "session".to_string(),
            entity_id: request.code_formation.clone(),
            action_required: true,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, record: &NotificationRecord) -> anyhow::Result<()>;
}

/// Sink that only writes the record to the log.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        tracing::info!(
            category = %record.category,
            kind = %record.kind,
            priority = record.priority.as_str(),
            entity_id = %record.entity_id,
            "{}",
            record.title
        );
        Ok(())
    }
}
