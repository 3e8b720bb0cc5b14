use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{SchedulingRequest, Subject};
use crate::proposal::Proposal;

/// One dated session of an accepted planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSession {
    pub planning_id: Uuid,
    pub code_formation: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub subject: Option<String>,
    pub room_id: Option<String>,
    pub trainer_id: Option<String>,
}

#[async_trait]
pub trait SubjectRepository: Send + Sync {
    /// Subjects of a formation's programme, in programme order.
    async fn programme(&self, code_formation: &str) -> anyhow::Result<Vec<Subject>>;

    /// Insert or replace a subject of a formation's programme. Returns true when new.
    async fn upsert_subject(&self, code_formation: &str, subject: &Subject) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store an accepted planning and return its id.
    async fn save_planning(
        &self,
        request: &SchedulingRequest,
        proposal: &Proposal,
    ) -> anyhow::Result<Uuid>;

    async fn list_sessions(&self, code_formation: &str) -> anyhow::Result<Vec<PlannedSession>>;
}

pub(crate) fn planned_sessions(
    planning_id: Uuid,
    request: &SchedulingRequest,
    proposal: &Proposal,
) -> Vec<PlannedSession> {
    proposal
        .sessions()
        .iter()
        .map(|session| PlannedSession {
            planning_id,
            code_formation: request.code_formation.clone(),
            date: session.date,
            start_time: session.start_time,
            end_time: session.end_time,
            subject: session.subject.clone(),
            room_id: session.room_id.clone(),
            trainer_id: session.trainer_id.clone(),
        })
        .collect()
}
