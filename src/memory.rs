use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{SchedulingRequest, Subject};
use crate::notify::{NotificationRecord, NotificationSink};
use crate::proposal::Proposal;
use crate::repository::{planned_sessions, PlannedSession, SessionRepository, SubjectRepository};

/// Store for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    programmes: Arc<RwLock<HashMap<String, Vec<Subject>>>>,
    sessions: Arc<RwLock<Vec<PlannedSession>>>,
    notifications: Arc<RwLock<Vec<NotificationRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl SubjectRepository for InMemoryStore {
    async fn programme(&self, code_formation: &str) -> anyhow::Result<Vec<Subject>> {
        Ok(self
            .programmes
            .read()
            .await
            .get(code_formation)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_subject(&self, code_formation: &str, subject: &Subject) -> anyhow::Result<bool> {
        let mut programmes = self.programmes.write().await;
        let programme = programmes.entry(code_formation.to_string()).or_default();

        match programme.iter_mut().find(|s| s.name == subject.name) {
            Some(existing) => {
                *existing = subject.clone();
                Ok(false)
            }
            None => {
                programme.push(subject.clone());
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn save_planning(
        &self,
        request: &SchedulingRequest,
        proposal: &Proposal,
    ) -> anyhow::Result<Uuid> {
        let planning_id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .extend(planned_sessions(planning_id, request, proposal));
        Ok(planning_id)
    }

    async fn list_sessions(&self, code_formation: &str) -> anyhow::Result<Vec<PlannedSession>> {
        let mut sessions: Vec<PlannedSession> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|session| session.code_formation == code_formation)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
        Ok(sessions)
    }
}

#[async_trait]
impl NotificationSink for InMemoryStore {
    async fn notify(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        self.notifications.write().await.push(record.clone());
        Ok(())
    }
}
