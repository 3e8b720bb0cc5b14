use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Operating hours of the training centre, in minutes after midnight (08:00 to 21:00).
pub const OPENING_MINUTE: u32 = 8 * 60;
pub const CLOSING_MINUTE: u32 = 21 * 60;

pub const SLOT_MINUTES: u32 = 30;

/// CAP programmes are sized at 800 hours, with a 10% tolerance either way.
pub const PROGRAMME_MIN_HOURS: u32 = 720;
pub const PROGRAMME_MAX_HOURS: u32 = 880;

pub const SHORT_MIN_DAYS: usize = 5;
pub const SHORT_MAX_DAYS: usize = 15;

pub const MAX_CONSECUTIVE_HOURS_LIMIT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    /// A 5 to 15 day session with a single trainer and room.
    Short,
    /// A CAP-style session spanning months with a full subject programme.
    Long,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Short => "SHORT",
            SessionKind::Long => "LONG",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Short => "session courte",
            SessionKind::Long => "formation CAP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    pub total_hours: u32,
    pub max_consecutive_hours_per_day: u32,
    #[serde(default)]
    pub room_preferences: Vec<String>,
    #[serde(default)]
    pub trainer_preferences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trainer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub trainers: Vec<Trainer>,
    /// When set the solver may leave room assignments null.
    #[serde(default)]
    pub assign_rooms_later: bool,
    /// When set the solver may leave trainer assignments null.
    #[serde(default)]
    pub assign_trainers_later: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForbiddenPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub reason: String,
}

impl ForbiddenPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A validated scheduling request, as sent to the solver.
///
/// Built by [`crate::builder::SessionDraft::build`]; `nb_jours` is the number of
/// schedulable days once inactive weekdays and forbidden periods are removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingRequest {
    pub session_kind: SessionKind,
    pub code_formation: String,
    pub nom_session: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_months: Option<u32>,
    pub active_weekdays: Vec<Weekday>,
    pub forbidden_periods: Vec<ForbiddenPeriod>,
    pub participant_count: u32,
    pub subjects: Vec<Subject>,
    pub resource_pool: ResourcePool,
    pub allow_trainer_multi_subject: bool,
    pub allow_room_multi_subject: bool,
    pub subjects_may_run_in_parallel: bool,
    pub nb_jours: usize,
}

impl SchedulingRequest {
    /// Sum of every subject's hour budget. Zero for short sessions.
    pub fn programme_hours(&self) -> u64 {
        self.subjects.iter().map(|subject| u64::from(subject.total_hours)).sum()
    }

    pub fn display_name(&self) -> String {
        match &self.nom_session {
            Some(name) => format!("{} ({})", name, self.code_formation),
            None => self.code_formation.clone(),
        }
    }
}
