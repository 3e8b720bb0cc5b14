use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar;
use crate::error::SubmissionError;
use crate::models::{SchedulingRequest, SessionKind};

// Solver totals may differ from the programme by rounding only.
const HOURS_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSession {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub trainer_id: Option<String>,
}

impl ScheduledSession {
    pub fn hours(&self) -> f64 {
        calendar::duration_hours(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOccupancy {
    pub room_id: String,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerLoad {
    pub trainer_id: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyStats {
    #[serde(default)]
    pub rooms: Vec<RoomOccupancy>,
    #[serde(default)]
    pub trainers: Vec<TrainerLoad>,
}

/// Body returned by the solver, before any local checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResponse {
    #[serde(default)]
    pub sessions: Vec<ScheduledSession>,
    #[serde(default)]
    pub occupancy_stats: OccupancyStats,
    #[serde(default)]
    pub narrative_report: String,
    #[serde(default, alias = "total_heures_formation")]
    pub total_scheduled_hours: Option<f64>,
}

/// Where a proposal's total hours came from.
///
/// A long session's sessions are a distribution of the fixed programme total,
/// so the two sources are not interchangeable and there is no conversion
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "hours", rename_all = "snake_case")]
pub enum ScheduledHours {
    /// Authoritative total: the declared programme for a long session, the solver total otherwise.
    Programme(f64),
    /// Sum of session durations, for a short session whose solver sent no total.
    Summed(f64),
}

impl ScheduledHours {
    pub fn hours(&self) -> f64 {
        match self {
            ScheduledHours::Programme(hours) | ScheduledHours::Summed(hours) => *hours,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, ScheduledHours::Programme(_))
    }
}

/// A solver proposal accepted for review.
///
/// Read-only once built: a rejected proposal is dropped and replaced by a new
/// one, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    id: Uuid,
    received_at: DateTime<Utc>,
    sessions: Vec<ScheduledSession>,
    occupancy_stats: OccupancyStats,
    narrative_report: String,
    total_hours: ScheduledHours,
}

impl Proposal {
    /// Accept a solver response for `request`, or reject it whole.
    pub fn from_solver(
        request: &SchedulingRequest,
        response: SolverResponse,
    ) -> Result<Self, SubmissionError> {
        for (index, session) in response.sessions.iter().enumerate() {
            check_session(request, index, session)?;
        }

        let total_hours = total_hours(request, &response)?;

        let mut sessions = response.sessions;
        sessions.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));

        Ok(Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            sessions,
            occupancy_stats: response.occupancy_stats,
            narrative_report: response.narrative_report,
            total_hours,
        })
    }

    /// Check a proposal held elsewhere (a parked workflow) against `request`
    /// with the same rules `from_solver` applies.
    pub fn check_against(&self, request: &SchedulingRequest) -> Result<(), SubmissionError> {
        for (index, session) in self.sessions.iter().enumerate() {
            check_session(request, index, session)?;
        }

        let reported = match self.total_hours {
            ScheduledHours::Programme(hours) => Some(hours),
            ScheduledHours::Summed(_) => None,
        };
        let expected = total_hours(
            request,
            &SolverResponse {
                sessions: self.sessions.clone(),
                total_scheduled_hours: reported,
                ..SolverResponse::default()
            },
        )?;
        if expected.is_authoritative() != self.total_hours.is_authoritative()
            || (expected.hours() - self.total_hours.hours()).abs() > HOURS_TOLERANCE
        {
            return Err(SubmissionError::malformed(format!(
                "total d'heures {}h incohérent",
                self.total_hours.hours()
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn sessions(&self) -> &[ScheduledSession] {
        &self.sessions
    }

    pub fn occupancy_stats(&self) -> &OccupancyStats {
        &self.occupancy_stats
    }

    pub fn narrative_report(&self) -> &str {
        &self.narrative_report
    }

    pub fn total_scheduled_hours(&self) -> ScheduledHours {
        self.total_hours
    }

    pub fn unique_trainer_count(&self) -> usize {
        self.sessions
            .iter()
            .filter_map(|session| session.trainer_id.as_deref())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn unique_room_count(&self) -> usize {
        self.sessions
            .iter()
            .filter_map(|session| session.room_id.as_deref())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn unassigned_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|session| session.room_id.is_none() || session.trainer_id.is_none())
            .count()
    }

    pub fn average_session_hours(&self) -> f64 {
        if self.sessions.is_empty() {
            return 0.0;
        }
        let total: f64 = self.sessions.iter().map(ScheduledSession::hours).sum();
        total / self.sessions.len() as f64
    }

    /// Hours planned per subject, for display. Never compared with the programme total.
    pub fn hours_by_subject(&self) -> Vec<(String, f64)> {
        let mut map: BTreeMap<&str, f64> = BTreeMap::new();
        for session in &self.sessions {
            if let Some(subject) = session.subject.as_deref() {
                *map.entry(subject).or_insert(0.0) += session.hours();
            }
        }
        map.into_iter()
            .map(|(subject, hours)| (subject.to_string(), hours))
            .collect()
    }
}

/// A long session always carries its programme total; only a short one may
/// fall back to summing session durations.
fn total_hours(
    request: &SchedulingRequest,
    response: &SolverResponse,
) -> Result<ScheduledHours, SubmissionError> {
    if let Some(hours) = response.total_scheduled_hours {
        if !hours.is_finite() || hours < 0.0 {
            return Err(SubmissionError::malformed(format!(
                "total d'heures invalide: {hours}"
            )));
        }
    }

    match (request.session_kind, response.total_scheduled_hours) {
        (SessionKind::Long, total) => {
            let programme = request.programme_hours() as f64;
            match total {
                Some(hours) if (hours - programme).abs() > HOURS_TOLERANCE => {
                    Err(SubmissionError::malformed(format!(
                        "total d'heures {hours}h différent du programme ({programme}h)"
                    )))
                }
                _ => Ok(ScheduledHours::Programme(programme)),
            }
        }
        (SessionKind::Short, Some(hours)) => Ok(ScheduledHours::Programme(hours)),
        (SessionKind::Short, None) => Ok(ScheduledHours::Summed(
            response.sessions.iter().map(ScheduledSession::hours).sum(),
        )),
    }
}

fn check_session(
    request: &SchedulingRequest,
    index: usize,
    session: &ScheduledSession,
) -> Result<(), SubmissionError> {
    let label = format!("séance {} du {}", index + 1, session.date);

    if session.end_time <= session.start_time {
        return Err(SubmissionError::malformed(format!(
            "{label}: fin avant le début"
        )));
    }
    if !calendar::slot_aligned(session.start_time) || !calendar::slot_aligned(session.end_time) {
        return Err(SubmissionError::malformed(format!(
            "{label}: horaires hors grille de 30 minutes"
        )));
    }
    if !calendar::within_operating_hours(session.start_time, session.end_time) {
        return Err(SubmissionError::malformed(format!(
            "{label}: hors des heures d'ouverture (08:00-21:00)"
        )));
    }
    if session.date < request.start_date || session.date > request.end_date {
        return Err(SubmissionError::malformed(format!(
            "{label}: hors de la période de la session"
        )));
    }
    if !request.active_weekdays.contains(&session.date.weekday()) {
        return Err(SubmissionError::malformed(format!(
            "{label}: jour non actif"
        )));
    }
    if request.forbidden_periods.iter().any(|period| period.contains(session.date)) {
        return Err(SubmissionError::malformed(format!(
            "{label}: dans une période interdite"
        )));
    }

    if request.session_kind == SessionKind::Long {
        match session.subject.as_deref() {
            Some(subject) if request.subjects.iter().any(|s| s.name == subject) => {}
            Some(subject) => {
                return Err(SubmissionError::malformed(format!(
                    "{label}: matière inconnue {subject}"
                )))
            }
            None => {
                return Err(SubmissionError::malformed(format!(
                    "{label}: matière manquante"
                )))
            }
        }
    }

    Ok(())
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::tests::{long_draft, short_draft};
    use crate::models::ForbiddenPeriod;

    pub(crate) fn session(
        date: NaiveDate,
        start: (u32, u32),
        end: (u32, u32),
        subject: Option<&str>,
        room: Option<&str>,
        trainer: Option<&str>,
    ) -> ScheduledSession {
        ScheduledSession {
            date,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            subject: subject.map(str::to_string),
            room_id: room.map(str::to_string),
            trainer_id: trainer.map(str::to_string),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn solver_total_is_kept_verbatim() {
        let request = long_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![session(
                NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                (8, 0),
                (12, 0),
                Some("Hygiène et sécurité"),
                Some("salle-a"),
                Some("f-martin"),
            )],
            total_scheduled_hours: Some(800.0),
            ..SolverResponse::default()
        };

        let proposal = Proposal::from_solver(&request, response).unwrap();
        assert_eq!(proposal.total_scheduled_hours(), ScheduledHours::Programme(800.0));
        assert!(proposal.total_scheduled_hours().is_authoritative());
    }

    #[test]
    fn long_total_must_match_programme() {
        let request = long_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![session(
                NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                (8, 0),
                (12, 0),
                Some("Hygiène et sécurité"),
                None,
                None,
            )],
            total_scheduled_hours: Some(35.0),
            ..SolverResponse::default()
        };

        let err = Proposal::from_solver(&request, response).unwrap_err();
        assert!(matches!(err, SubmissionError::Malformed(ref message) if message.contains("800h")));
    }

    #[test]
    fn long_without_total_uses_programme_not_sessions() {
        let request = long_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![session(
                NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                (8, 0),
                (12, 0),
                Some("Hygiène et sécurité"),
                None,
                None,
            )],
            ..SolverResponse::default()
        };

        let proposal = Proposal::from_solver(&request, response).unwrap();
        assert_eq!(proposal.total_scheduled_hours(), ScheduledHours::Programme(800.0));
    }

    #[test]
    fn sessions_on_forbidden_or_inactive_days_are_malformed() {
        let mut draft = short_draft();
        draft.end_date = Some(day(20));
        draft.forbidden_periods = vec![ForbiddenPeriod {
            start: day(12),
            end: day(12),
            reason: "Journée pédagogique".to_string(),
        }];
        let request = draft.build().unwrap();

        let ok = SolverResponse {
            sessions: vec![session(day(11), (9, 0), (12, 0), None, None, None)],
            ..SolverResponse::default()
        };
        assert!(Proposal::from_solver(&request, ok).is_ok());

        // 12 March is forbidden, 14 March is a Saturday.
        for bad in [day(12), day(14)] {
            let response = SolverResponse {
                sessions: vec![
                    session(day(11), (9, 0), (12, 0), None, None, None),
                    session(bad, (9, 0), (12, 0), None, None, None),
                ],
                ..SolverResponse::default()
            };
            let err = Proposal::from_solver(&request, response).unwrap_err();
            assert!(matches!(err, SubmissionError::Malformed(_)));
        }
    }

    #[test]
    fn falls_back_to_summed_durations() {
        let request = short_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![
                session(day(9), (9, 0), (12, 30), None, Some("salle-b"), Some("f-durand")),
                session(day(10), (13, 0), (17, 0), None, Some("salle-b"), Some("f-durand")),
            ],
            ..SolverResponse::default()
        };

        let proposal = Proposal::from_solver(&request, response).unwrap();
        assert_eq!(proposal.total_scheduled_hours(), ScheduledHours::Summed(7.5));
    }

    #[test]
    fn unassigned_resources_are_listed_but_not_counted() {
        let request = short_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![
                session(day(9), (9, 0), (12, 0), None, Some("salle-b"), Some("f-durand")),
                session(day(10), (9, 0), (12, 0), None, None, Some("f-durand")),
                session(day(11), (9, 0), (12, 0), None, Some("salle-c"), None),
            ],
            ..SolverResponse::default()
        };

        let proposal = Proposal::from_solver(&request, response).unwrap();
        assert_eq!(proposal.sessions().len(), 3);
        assert_eq!(proposal.unique_trainer_count(), 1);
        assert_eq!(proposal.unique_room_count(), 2);
        assert_eq!(proposal.unassigned_count(), 2);
    }

    #[test]
    fn one_bad_session_rejects_the_whole_payload() {
        let request = short_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![
                session(day(9), (9, 0), (12, 0), None, None, None),
                session(day(10), (20, 0), (22, 0), None, None, None),
            ],
            ..SolverResponse::default()
        };

        let err = Proposal::from_solver(&request, response).unwrap_err();
        assert!(matches!(err, SubmissionError::Malformed(_)));
    }

    #[test]
    fn off_grid_and_inverted_times_are_malformed() {
        let request = short_draft().build().unwrap();
        for bad in [
            session(day(9), (9, 15), (12, 0), None, None, None),
            session(day(9), (12, 0), (9, 0), None, None, None),
            session(day(20), (9, 0), (12, 0), None, None, None),
        ] {
            let response = SolverResponse {
                sessions: vec![bad],
                ..SolverResponse::default()
            };
            assert!(Proposal::from_solver(&request, response).is_err());
        }
    }

    #[test]
    fn long_sessions_must_name_a_programme_subject() {
        let request = long_draft().build().unwrap();
        let response = SolverResponse {
            sessions: vec![session(
                NaiveDate::from_ymd_opt(2026, 9, 2).unwrap(),
                (8, 0),
                (10, 0),
                Some("Anglais"),
                None,
                None,
            )],
            ..SolverResponse::default()
        };

        assert!(Proposal::from_solver(&request, response).is_err());
    }

    #[test]
    fn parses_solver_json() {
        let request = short_draft().build().unwrap();
        let body = r#"{
            "sessions": [
                {"date": "2026-03-09", "startTime": "09:00", "endTime": "12:00",
                 "roomId": "salle-b", "trainerId": null}
            ],
            "occupancyStats": {
                "rooms": [{"roomId": "salle-b", "utilizationPercent": 37.5}],
                "trainers": []
            },
            "narrativeReport": "Planning généré sans conflit.",
            "total_heures_formation": 35
        }"#;

        let response: SolverResponse = serde_json::from_str(body).unwrap();
        let proposal = Proposal::from_solver(&request, response).unwrap();
        assert_eq!(proposal.total_scheduled_hours(), ScheduledHours::Programme(35.0));
        assert_eq!(proposal.occupancy_stats().rooms[0].utilization_percent, 37.5);
        assert_eq!(proposal.unique_trainer_count(), 0);
        assert_eq!(proposal.narrative_report(), "Planning généré sans conflit.");
    }

    #[test]
    fn hours_by_subject_groups_sessions() {
        let request = long_draft().build().unwrap();
        let d = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let response = SolverResponse {
            sessions: vec![
                session(d, (8, 0), (12, 0), Some("Hygiène et sécurité"), None, None),
                session(d, (13, 0), (15, 0), Some("Hygiène et sécurité"), None, None),
                session(d, (15, 0), (16, 0), Some("Technologie culinaire"), None, None),
            ],
            total_scheduled_hours: Some(800.0),
            ..SolverResponse::default()
        };

        let proposal = Proposal::from_solver(&request, response).unwrap();
        assert_eq!(
            proposal.hours_by_subject(),
            vec![
                ("Hygiène et sécurité".to_string(), 6.0),
                ("Technologie culinaire".to_string(), 1.0),
            ]
        );
    }
}
