use std::collections::HashSet;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::error::ValidationErrors;
use crate::models::{
    ForbiddenPeriod, ResourcePool, SchedulingRequest, SessionKind, Subject,
    MAX_CONSECUTIVE_HOURS_LIMIT, PROGRAMME_MAX_HOURS, PROGRAMME_MIN_HOURS, SHORT_MAX_DAYS,
    SHORT_MIN_DAYS,
};

/// Raw form input for a session, as typed by the user.
///
/// Numeric fields are signed and optional so that zero, negative and missing
/// values reach the validator instead of being coerced on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraft {
    pub session_kind: SessionKind,
    #[serde(default)]
    pub code_formation: Option<String>,
    #[serde(default)]
    pub nom_session: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_months: Option<i64>,
    #[serde(default)]
    pub active_weekdays: Vec<Weekday>,
    #[serde(default)]
    pub forbidden_periods: Vec<ForbiddenPeriod>,
    #[serde(default)]
    pub participant_count: Option<i64>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub resource_pool: ResourcePool,
    #[serde(default)]
    pub allow_trainer_multi_subject: bool,
    #[serde(default)]
    pub allow_room_multi_subject: bool,
    #[serde(default)]
    pub subjects_may_run_in_parallel: bool,
}

impl SessionDraft {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            session_kind: kind,
            code_formation: None,
            nom_session: None,
            start_date: None,
            end_date: None,
            duration_months: None,
            active_weekdays: Vec::new(),
            forbidden_periods: Vec::new(),
            participant_count: None,
            subjects: Vec::new(),
            resource_pool: ResourcePool::default(),
            allow_trainer_multi_subject: false,
            allow_room_multi_subject: false,
            subjects_may_run_in_parallel: false,
        }
    }

    /// Validate every rule and produce the canonical request, or the full list
    /// of problems found.
    pub fn build(&self) -> Result<SchedulingRequest, ValidationErrors> {
        let mut errors = Vec::new();

        let code_formation = non_blank(&self.code_formation);
        if code_formation.is_none() {
            errors.push("Code formation requis".to_string());
        }

        if self.start_date.is_none() {
            errors.push("Date de début requise".to_string());
        }

        let weekdays = calendar::normalize_weekdays(&self.active_weekdays);
        if weekdays.is_empty() {
            errors.push("Au moins un jour actif requis".to_string());
        }

        let participant_count = match self.participant_count {
            Some(count) if count > 0 => u32::try_from(count).ok(),
            _ => None,
        };
        if participant_count.is_none() {
            errors.push("Nombre de participants doit être supérieur à 0".to_string());
        }

        for period in &self.forbidden_periods {
            if period.end < period.start {
                errors.push(format!(
                    "Période interdite invalide ({} > {})",
                    period.start, period.end
                ));
            }
        }
        let mut forbidden_periods = self.forbidden_periods.clone();
        forbidden_periods.sort_by_key(|period| period.start);

        let nom_session = non_blank(&self.nom_session);
        let mut duration_months = None;
        let mut end_date = None;
        let mut subjects = Vec::new();

        match self.session_kind {
            SessionKind::Long => {
                if nom_session.is_none() {
                    errors.push("Nom de session requis".to_string());
                }

                match self.duration_months {
                    Some(months) if months > 0 => {
                        duration_months = u32::try_from(months).ok();
                        end_date = self
                            .start_date
                            .zip(duration_months)
                            .and_then(|(start, months)| {
                                calendar::end_of_long_session(start, months)
                            });
                    }
                    _ => errors.push("Durée en mois doit être supérieure à 0".to_string()),
                }

                subjects = self.normalized_subjects(&mut errors);

                let pool = &self.resource_pool;
                if pool.trainers.is_empty() && !pool.assign_trainers_later {
                    errors.push(
                        "Au moins un formateur requis (ou cocher \"assigner plus tard\")"
                            .to_string(),
                    );
                }
                if pool.rooms.is_empty() && !pool.assign_rooms_later {
                    errors.push(
                        "Au moins une salle requise (ou cocher \"assigner plus tard\")".to_string(),
                    );
                }
            }
            SessionKind::Short => {
                match (self.start_date, self.end_date) {
                    (_, None) => errors.push("Date de fin requise".to_string()),
                    (Some(start), Some(end)) if end <= start => errors
                        .push("La date de fin doit être postérieure à la date de début".to_string()),
                    (_, Some(end)) => end_date = Some(end),
                }

                if !self.subjects.is_empty() {
                    errors.push("Une session courte ne comporte pas de matières".to_string());
                }
                if self.resource_pool.trainers.len() > 1 {
                    errors.push("Une session courte n'accepte qu'un seul formateur".to_string());
                }
                if self.resource_pool.rooms.len() > 1 {
                    errors.push("Une session courte n'accepte qu'une seule salle".to_string());
                }
            }
        }

        let nb_jours = match (self.start_date, end_date) {
            (Some(start), Some(end)) if !weekdays.is_empty() => {
                calendar::schedulable_days(start, end, &weekdays, &forbidden_periods).len()
            }
            _ => 0,
        };

        if self.session_kind == SessionKind::Short
            && self.start_date.is_some()
            && end_date.is_some()
            && !weekdays.is_empty()
            && !(SHORT_MIN_DAYS..=SHORT_MAX_DAYS).contains(&nb_jours)
        {
            errors.push(format!(
                "Durée session courte hors limites ({}j, attendu {}-{}j)",
                nb_jours, SHORT_MIN_DAYS, SHORT_MAX_DAYS
            ));
        }

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        match (code_formation, self.start_date, end_date, participant_count) {
            (Some(code_formation), Some(start_date), Some(end_date), Some(participant_count)) => {
                Ok(SchedulingRequest {
                    session_kind: self.session_kind,
                    code_formation,
                    nom_session,
                    start_date,
                    end_date,
                    duration_months,
                    active_weekdays: weekdays,
                    forbidden_periods,
                    participant_count,
                    subjects,
                    resource_pool: self.resource_pool.clone(),
                    allow_trainer_multi_subject: self.allow_trainer_multi_subject,
                    allow_room_multi_subject: self.allow_room_multi_subject,
                    subjects_may_run_in_parallel: self.subjects_may_run_in_parallel,
                    nb_jours,
                })
            }
            _ => Err(ValidationErrors(vec![
                "Date de fin de session impossible à calculer".to_string(),
            ])),
        }
    }

    fn normalized_subjects(&self, errors: &mut Vec<String>) -> Vec<Subject> {
        if self.subjects.is_empty() {
            errors.push("Au moins une matière requise".to_string());
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut subjects = Vec::with_capacity(self.subjects.len());

        for subject in &self.subjects {
            let name = subject.name.trim().to_string();
            if name.is_empty() {
                errors.push("Nom de matière requis".to_string());
            } else if !seen.insert(name.to_lowercase()) {
                errors.push(format!("Matière en double: {}", name));
            }

            if subject.total_hours == 0 {
                errors.push(format!("Heures de la matière {} doivent être supérieures à 0", name));
            }

            if !(1..=MAX_CONSECUTIVE_HOURS_LIMIT).contains(&subject.max_consecutive_hours_per_day) {
                errors.push(format!(
                    "Heures consécutives max de la matière {} hors limites ({}h, attendu 1-{}h)",
                    name, subject.max_consecutive_hours_per_day, MAX_CONSECUTIVE_HOURS_LIMIT
                ));
            }

            subjects.push(Subject {
                name,
                total_hours: subject.total_hours,
                max_consecutive_hours_per_day: subject.max_consecutive_hours_per_day,
                room_preferences: dedup_ids(&subject.room_preferences),
                trainer_preferences: dedup_ids(&subject.trainer_preferences),
            });
        }

        let total: u64 = subjects.iter().map(|subject| u64::from(subject.total_hours)).sum();
        if !(u64::from(PROGRAMME_MIN_HOURS)..=u64::from(PROGRAMME_MAX_HOURS)).contains(&total) {
            errors.push(format!(
                "Total heures programme hors limites ({}h, attendu {}-{}h)",
                total, PROGRAMME_MIN_HOURS, PROGRAMME_MAX_HOURS
            ));
        }

        subjects
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Room, Trainer};

    const WEEK: [Weekday; 5] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn subject(name: &str, hours: u32) -> Subject {
        Subject {
            name: name.to_string(),
            total_hours: hours,
            max_consecutive_hours_per_day: 4,
            room_preferences: vec!["salle-a".to_string()],
            trainer_preferences: vec!["f-martin".to_string()],
        }
    }

    pub(crate) fn short_draft() -> SessionDraft {
        SessionDraft {
            code_formation: Some("SST-2026-03".to_string()),
            start_date: Some(date(2026, 3, 9)),
            end_date: Some(date(2026, 3, 13)),
            active_weekdays: WEEK.to_vec(),
            participant_count: Some(8),
            ..SessionDraft::new(SessionKind::Short)
        }
    }

    pub(crate) fn long_draft() -> SessionDraft {
        SessionDraft {
            code_formation: Some("CAP-CUISINE".to_string()),
            nom_session: Some("CAP Cuisine 2026".to_string()),
            start_date: Some(date(2026, 9, 1)),
            duration_months: Some(10),
            active_weekdays: WEEK.to_vec(),
            participant_count: Some(12),
            subjects: vec![
                subject("Technologie culinaire", 300),
                subject("Pratique professionnelle", 350),
                subject("Hygiène et sécurité", 150),
            ],
            resource_pool: ResourcePool {
                rooms: vec![Room {
                    id: "salle-a".to_string(),
                    name: "Cuisine pédagogique".to_string(),
                    capacity: 14,
                }],
                trainers: vec![Trainer {
                    id: "f-martin".to_string(),
                    name: "Claire Martin".to_string(),
                    subjects: vec!["Technologie culinaire".to_string()],
                }],
                ..ResourcePool::default()
            },
            ..SessionDraft::new(SessionKind::Long)
        }
    }

    #[test]
    fn accepts_short_working_week() {
        let request = short_draft().build().unwrap();
        assert_eq!(request.nb_jours, 5);
        assert_eq!(request.participant_count, 8);
        assert!(request.subjects.is_empty());
    }

    #[test]
    fn rejects_programme_below_window() {
        let mut draft = long_draft();
        draft.subjects = vec![subject("Technologie culinaire", 340), subject("Pratique", 350)];

        let errors = draft.build().unwrap_err();
        assert!(errors.contains("Total heures programme hors limites (690h, attendu 720-880h)"));
    }

    #[test]
    fn huge_programme_is_out_of_range_not_wrapped() {
        let mut draft = long_draft();
        draft.subjects[0].total_hours = u32::MAX;

        let errors = draft.build().unwrap_err();
        assert!(errors.contains(
            "Total heures programme hors limites (4294967795h, attendu 720-880h)"
        ));
    }

    #[test]
    fn accepts_programme_at_bounds() {
        for (a, b) in [(360, 360), (440, 440)] {
            let mut draft = long_draft();
            draft.subjects = vec![subject("Technologie", a), subject("Pratique", b)];
            assert!(draft.build().is_ok(), "{}h should be accepted", a + b);
        }
    }

    #[test]
    fn long_end_date_is_derived_from_duration() {
        let request = long_draft().build().unwrap();
        assert_eq!(request.end_date, date(2027, 6, 30));
        assert_eq!(request.duration_months, Some(10));
        assert_eq!(request.programme_hours(), 800);
    }

    #[test]
    fn zero_counts_are_rejected_not_coerced() {
        let mut draft = long_draft();
        draft.duration_months = Some(0);
        draft.participant_count = Some(0);

        let errors = draft.build().unwrap_err();
        assert!(errors.contains("Durée en mois doit être supérieure à 0"));
        assert!(errors.contains("Nombre de participants doit être supérieur à 0"));
    }

    #[test]
    fn empty_weekdays_are_rejected_for_both_kinds() {
        let mut short = short_draft();
        short.active_weekdays.clear();
        let mut long = long_draft();
        long.active_weekdays.clear();

        assert!(short.build().unwrap_err().contains("Au moins un jour actif requis"));
        assert!(long.build().unwrap_err().contains("Au moins un jour actif requis"));
    }

    #[test]
    fn collects_every_error_at_once() {
        let draft = SessionDraft::new(SessionKind::Long);
        let errors = draft.build().unwrap_err();

        assert!(errors.messages().len() >= 7);
        assert!(errors.contains("Code formation requis"));
        assert!(errors.contains("Nom de session requis"));
        assert!(errors.contains("Au moins une matière requise"));
    }

    #[test]
    fn empty_pools_need_assign_later() {
        let mut draft = long_draft();
        draft.resource_pool.rooms.clear();
        draft.resource_pool.trainers.clear();
        let errors = draft.build().unwrap_err();
        assert_eq!(errors.messages().len(), 2);

        draft.resource_pool.assign_rooms_later = true;
        draft.resource_pool.assign_trainers_later = true;
        assert!(draft.build().is_ok());
    }

    #[test]
    fn short_end_must_follow_start() {
        let mut draft = short_draft();
        draft.end_date = Some(date(2026, 3, 9));
        let errors = draft.build().unwrap_err();
        assert!(errors.contains("La date de fin doit être postérieure à la date de début"));
    }

    #[test]
    fn short_span_is_bounded() {
        let mut draft = short_draft();
        draft.end_date = Some(date(2026, 3, 10));
        let errors = draft.build().unwrap_err();
        assert!(errors.contains("Durée session courte hors limites (2j, attendu 5-15j)"));
    }

    #[test]
    fn duplicate_subjects_and_bad_daily_caps_are_reported() {
        let mut draft = long_draft();
        draft.subjects.push(Subject {
            max_consecutive_hours_per_day: 9,
            ..subject(" technologie culinaire ", 10)
        });

        let errors = draft.build().unwrap_err();
        assert!(errors.contains("Matière en double: technologie culinaire"));
        assert!(errors
            .messages()
            .iter()
            .any(|m| m.starts_with("Heures consécutives max")));
    }

    #[test]
    fn normalizes_weekdays_and_periods() {
        let mut draft = long_draft();
        draft.active_weekdays = vec![Weekday::Thu, Weekday::Mon, Weekday::Thu];
        draft.forbidden_periods = vec![
            ForbiddenPeriod {
                start: date(2027, 2, 15),
                end: date(2027, 2, 19),
                reason: "Vacances d'hiver".to_string(),
            },
            ForbiddenPeriod {
                start: date(2026, 12, 21),
                end: date(2027, 1, 1),
                reason: "Noël".to_string(),
            },
        ];

        let request = draft.build().unwrap();
        assert_eq!(request.active_weekdays, vec![Weekday::Mon, Weekday::Thu]);
        assert_eq!(request.forbidden_periods[0].reason, "Noël");
    }

    #[test]
    fn draft_loads_from_json() {
        let json = r#"{
            "sessionKind": "SHORT",
            "codeFormation": "SST-2026-03",
            "startDate": "2026-03-09",
            "endDate": "2026-03-13",
            "activeWeekdays": ["Mon", "Tue", "Wed", "Thu", "Fri"],
            "participantCount": 8
        }"#;

        let draft: SessionDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft, short_draft());
    }
}
