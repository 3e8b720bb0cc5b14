use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ResourcePool, Room, SchedulingRequest, Subject, Trainer};
use crate::notify::{NotificationRecord, NotificationSink};
use crate::proposal::{Proposal, ScheduledHours};
use crate::repository::{planned_sessions, PlannedSession, SessionRepository, SubjectRepository};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Every room and trainer known to the academy.
    pub async fn resource_pool(&self) -> anyhow::Result<ResourcePool> {
        let rooms = sqlx::query(
            "SELECT id, name, capacity FROM session_planning.rooms ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Room {
            id: row.get("id"),
            name: row.get("name"),
            capacity: row.get::<i32, _>("capacity").max(0) as u32,
        })
        .collect();

        let trainers = sqlx::query(
            "SELECT id, full_name, subjects FROM session_planning.trainers ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Trainer {
            id: row.get("id"),
            name: row.get("full_name"),
            subjects: row.get("subjects"),
        })
        .collect();

        Ok(ResourcePool {
            rooms,
            trainers,
            ..ResourcePool::default()
        })
    }
}

pub async fn seed(store: &PgStore) -> anyhow::Result<()> {
    let rooms = vec![
        ("salle-a", "Cuisine pédagogique", 14),
        ("salle-b", "Salle de cours Rabelais", 20),
        ("salle-c", "Laboratoire pâtisserie", 10),
    ];

    for (id, name, capacity) in rooms {
        sqlx::query(
            r#"
            INSERT INTO session_planning.rooms (id, name, capacity)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, capacity = EXCLUDED.capacity
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(capacity)
        .execute(store.pool())
        .await?;
    }

    let trainers = vec![
        (
            "f-martin",
            "Claire Martin",
            vec!["Technologie culinaire", "Pratique professionnelle"],
        ),
        ("f-durand", "Hugo Durand", vec!["Hygiène et sécurité", "Sciences appliquées"]),
        ("f-benali", "Samira Benali", vec!["Français", "Mathématiques", "Anglais"]),
    ];

    for (id, name, subjects) in trainers {
        let subjects: Vec<String> = subjects.into_iter().map(str::to_string).collect();
        sqlx::query(
            r#"
            INSERT INTO session_planning.trainers (id, full_name, subjects)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, subjects = EXCLUDED.subjects
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(&subjects)
        .execute(store.pool())
        .await?;
    }

    // CAP Cuisine, 800h.
    let programme = vec![
        ("Technologie culinaire", 160, 4, "salle-b", "f-martin"),
        ("Pratique professionnelle", 300, 7, "salle-a", "f-martin"),
        ("Hygiène et sécurité", 80, 3, "salle-b", "f-durand"),
        ("Sciences appliquées", 60, 3, "salle-b", "f-durand"),
        ("Français", 80, 3, "salle-b", "f-benali"),
        ("Mathématiques", 70, 3, "salle-b", "f-benali"),
        ("Anglais", 50, 2, "salle-b", "f-benali"),
    ];

    for (name, hours, daily_cap, room, trainer) in programme {
        let subject = Subject {
            name: name.to_string(),
            total_hours: hours,
            max_consecutive_hours_per_day: daily_cap,
            room_preferences: vec![room.to_string()],
            trainer_preferences: vec![trainer.to_string()],
        };
        store.upsert_subject("CAP-CUISINE", &subject).await?;
    }

    Ok(())
}

/// Load a subject programme from CSV. Returns how many subjects were new.
pub async fn import_programme_csv(
    repository: &dyn SubjectRepository,
    code_formation: &str,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        total_hours: u32,
        max_consecutive_hours_per_day: u32,
        #[serde(default)]
        room_preferences: Option<String>,
        #[serde(default)]
        trainer_preferences: Option<String>,
    }

    fn split_ids(raw: Option<String>) -> Vec<String> {
        raw.unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid programme row {}", line + 1))?;
        let subject = Subject {
            name: row.name.trim().to_string(),
            total_hours: row.total_hours,
            max_consecutive_hours_per_day: row.max_consecutive_hours_per_day,
            room_preferences: split_ids(row.room_preferences),
            trainer_preferences: split_ids(row.trainer_preferences),
        };

        if repository.upsert_subject(code_formation, &subject).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[async_trait]
impl SubjectRepository for PgStore {
    async fn programme(&self, code_formation: &str) -> anyhow::Result<Vec<Subject>> {
        let rows = sqlx::query(
            r#"
            SELECT name, total_hours, max_consecutive_hours_per_day,
                   room_preferences, trainer_preferences
            FROM session_planning.subjects
            WHERE code_formation = $1
            ORDER BY position, name
            "#,
        )
        .bind(code_formation)
        .fetch_all(&self.pool)
        .await?;

        let mut subjects = Vec::new();

        for row in rows {
            subjects.push(Subject {
                name: row.get("name"),
                total_hours: row.get::<i32, _>("total_hours").max(0) as u32,
                max_consecutive_hours_per_day: row
                    .get::<i32, _>("max_consecutive_hours_per_day")
                    .max(0) as u32,
                room_preferences: row.get("room_preferences"),
                trainer_preferences: row.get("trainer_preferences"),
            });
        }

        Ok(subjects)
    }

    async fn upsert_subject(&self, code_formation: &str, subject: &Subject) -> anyhow::Result<bool> {
        let total_hours = i32::try_from(subject.total_hours).context("total_hours too large")?;
        let daily_cap = i32::try_from(subject.max_consecutive_hours_per_day)
            .context("max_consecutive_hours_per_day too large")?;

        // xmax = 0 only for freshly inserted rows.
        let inserted: bool = sqlx::query(
            r#"
            INSERT INTO session_planning.subjects
            (id, code_formation, name, position, total_hours, max_consecutive_hours_per_day,
             room_preferences, trainer_preferences)
            VALUES ($1, $2, $3,
                    (SELECT COUNT(*) FROM session_planning.subjects WHERE code_formation = $2),
                    $4, $5, $6, $7)
            ON CONFLICT (code_formation, name) DO UPDATE
            SET total_hours = EXCLUDED.total_hours,
                max_consecutive_hours_per_day = EXCLUDED.max_consecutive_hours_per_day,
                room_preferences = EXCLUDED.room_preferences,
                trainer_preferences = EXCLUDED.trainer_preferences
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code_formation)
        .bind(&subject.name)
        .bind(total_hours)
        .bind(daily_cap)
        .bind(&subject.room_preferences)
        .bind(&subject.trainer_preferences)
        .fetch_one(&self.pool)
        .await?
        .get("inserted");

        Ok(inserted)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn save_planning(
        &self,
        request: &SchedulingRequest,
        proposal: &Proposal,
    ) -> anyhow::Result<Uuid> {
        let planning_id = Uuid::new_v4();
        let (total_hours, total_source) = match proposal.total_scheduled_hours() {
            ScheduledHours::Programme(hours) => (hours, "programme"),
            ScheduledHours::Summed(hours) => (hours, "summed"),
        };
        let request_json = serde_json::to_string(request)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO session_planning.plannings
            (id, proposal_id, code_formation, nom_session, session_kind, start_date, end_date,
             participant_count, total_hours, total_hours_source, narrative_report, request)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(planning_id)
        .bind(proposal.id())
        .bind(&request.code_formation)
        .bind(&request.nom_session)
        .bind(request.session_kind.as_str())
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(i32::try_from(request.participant_count).context("participant_count too large")?)
        .bind(total_hours)
        .bind(total_source)
        .bind(proposal.narrative_report())
        .bind(request_json)
        .execute(&mut *tx)
        .await?;

        for session in planned_sessions(planning_id, request, proposal) {
            sqlx::query(
                r#"
                INSERT INTO session_planning.planned_sessions
                (id, planning_id, code_formation, session_date, start_time, end_time,
                 subject, room_id, trainer_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(session.planning_id)
            .bind(&session.code_formation)
            .bind(session.date)
            .bind(session.start_time)
            .bind(session.end_time)
            .bind(&session.subject)
            .bind(&session.room_id)
            .bind(&session.trainer_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(planning_id)
    }

    async fn list_sessions(&self, code_formation: &str) -> anyhow::Result<Vec<PlannedSession>> {
        let rows = sqlx::query(
            r#"
            SELECT planning_id, code_formation, session_date, start_time, end_time,
                   subject, room_id, trainer_id
            FROM session_planning.planned_sessions
            WHERE code_formation = $1
            ORDER BY session_date, start_time
            "#,
        )
        .bind(code_formation)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::new();

        for row in rows {
            sessions.push(PlannedSession {
                planning_id: row.get("planning_id"),
                code_formation: row.get("code_formation"),
                date: row.get("session_date"),
                start_time: row.get("start_time"),
                end_time: row.get("end_time"),
                subject: row.get("subject"),
                room_id: row.get("room_id"),
                trainer_id: row.get("trainer_id"),
            });
        }

        Ok(sessions)
    }
}

#[async_trait]
impl NotificationSink for PgStore {
    async fn notify(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_planning.notifications
            (id, category, kind, priority, title, message, entity_type, entity_id, action_required)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.category)
        .bind(&record.kind)
        .bind(record.priority.as_str())
        .bind(&record.title)
        .bind(&record.message)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(record.action_required)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
