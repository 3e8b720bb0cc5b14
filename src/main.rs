use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_planning::builder::SessionDraft;
use session_planning::config::Settings;
use session_planning::db::{self, PgStore};
use session_planning::error::TransitionError;
use session_planning::memory::InMemoryStore;
use session_planning::models::SessionKind;
use session_planning::notify::{LogSink, NotificationSink};
use session_planning::report;
use session_planning::repository::{SessionRepository, SubjectRepository};
use session_planning::solver::HttpSolver;
use session_planning::workflow::PlanningWorkflow;

#[derive(Parser)]
#[command(name = "session-planning")]
#[command(about = "Session planning requests and solver proposals for the training academy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load rooms, trainers and a CAP programme
    Seed,
    /// Import a subject programme from a CSV file
    ImportProgramme {
        #[arg(long)]
        formation: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Validate a session draft without contacting the solver
    Check {
        #[arg(long)]
        draft: PathBuf,
    },
    /// Send a session draft to the solver and review the proposal
    Plan {
        #[arg(long)]
        draft: PathBuf,
        /// Validate the proposal and persist the sessions
        #[arg(long)]
        accept: bool,
        /// Write the proposal as markdown instead of printing it
        #[arg(long = "report")]
        out: Option<PathBuf>,
        /// Log notifications and keep accepted sessions in memory
        #[arg(long)]
        dry_run: bool,
    },
    /// List planned sessions of a formation
    Sessions {
        #[arg(long)]
        formation: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_planning=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let store = connect(&settings).await?;
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = connect(&settings).await?;
            db::seed(&store).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportProgramme { formation, csv } => {
            let store = connect(&settings).await?;
            let inserted = db::import_programme_csv(&store, &formation, &csv).await?;
            let programme = store.programme(&formation).await?;
            let total: u64 = programme.iter().map(|s| u64::from(s.total_hours)).sum();
            println!(
                "Inserted {inserted} subjects from {} ({} subjects, {total}h in {formation}).",
                csv.display(),
                programme.len()
            );
        }
        Commands::Check { draft } => {
            let mut draft = load_draft(&draft)?;
            if settings.database_url.is_some() {
                let store = connect(&settings).await?;
                complete_from_store(&mut draft, &store).await?;
            }

            match draft.build() {
                Ok(request) => {
                    println!(
                        "Draft valid: {} ({}), {} schedulable days from {} to {}.",
                        request.display_name(),
                        request.session_kind.label(),
                        request.nb_jours,
                        request.start_date,
                        request.end_date
                    );
                    println!("{}", serde_json::to_string_pretty(&request)?);
                }
                Err(errors) => print_validation_errors(errors.messages()),
            }
        }
        Commands::Plan {
            draft,
            accept,
            out,
            dry_run,
        } => {
            let mut draft = load_draft(&draft)?;
            let solver = Arc::new(HttpSolver::new(settings.solver_url()?));

            // A dry run still reads programmes from the database when one is configured.
            let store = if dry_run && settings.database_url.is_none() {
                None
            } else {
                Some(connect(&settings).await?)
            };
            if let Some(store) = &store {
                complete_from_store(&mut draft, store).await?;
            }

            let notifications: Arc<dyn NotificationSink>;
            let sessions: Arc<dyn SessionRepository>;
            match store {
                Some(store) if !dry_run => {
                    notifications = Arc::new(store.clone());
                    sessions = Arc::new(store);
                }
                _ => {
                    notifications = Arc::new(LogSink);
                    sessions = Arc::new(InMemoryStore::new());
                }
            }

            let mut workflow = PlanningWorkflow::new(solver, notifications, sessions)
                .with_response_config(settings.response_config());

            workflow.select_type(draft.session_kind)?;
            workflow.update_draft(|form| *form = draft)?;
            match workflow.submit_form() {
                Ok(()) => {}
                Err(TransitionError::Invalid(errors)) => {
                    print_validation_errors(errors.messages());
                    return Ok(());
                }
                Err(other) => return Err(other.into()),
            }

            workflow
                .confirm()
                .await
                .context("submission failed, the request is back in review")?;

            let (request, proposal) = match (workflow.request(), workflow.proposal()) {
                (Some(request), Some(proposal)) => (request, proposal),
                _ => anyhow::bail!("no proposal held after submission"),
            };
            let markdown = report::render_markdown(request, proposal);
            match &out {
                Some(path) => {
                    std::fs::write(path, &markdown)?;
                    println!("Proposal written to {}.", path.display());
                }
                None => println!("{markdown}"),
            }

            if accept {
                let planning_id = workflow.accept().await?;
                println!("Planning {planning_id} validated.");
            } else {
                println!("Proposal not validated; rerun with --accept to persist it.");
            }
        }
        Commands::Sessions { formation, limit } => {
            let store = connect(&settings).await?;
            let sessions = store.list_sessions(&formation).await?;

            if sessions.is_empty() {
                println!("No planned sessions for {formation}.");
                return Ok(());
            }

            println!("Planned sessions for {formation}:");
            for session in sessions.iter().take(limit) {
                println!(
                    "- {} {}-{} {} (salle {}, formateur {})",
                    session.date,
                    session.start_time.format("%H:%M"),
                    session.end_time.format("%H:%M"),
                    session.subject.as_deref().unwrap_or("-"),
                    session.room_id.as_deref().unwrap_or("à assigner"),
                    session.trainer_id.as_deref().unwrap_or("à assigner"),
                );
            }
        }
    }

    Ok(())
}

async fn connect(settings: &Settings) -> anyhow::Result<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgStore::new(pool))
}

fn load_draft(path: &Path) -> anyhow::Result<SessionDraft> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid draft {}", path.display()))
}

/// Fill a long session's empty programme and resource pools from the database.
async fn complete_from_store(draft: &mut SessionDraft, store: &PgStore) -> anyhow::Result<()> {
    if draft.session_kind != SessionKind::Long {
        return Ok(());
    }

    if draft.subjects.is_empty() {
        if let Some(code) = draft.code_formation.as_deref() {
            draft.subjects = store.programme(code.trim()).await?;
            tracing::info!(code_formation = code, subjects = draft.subjects.len(), "loaded programme");
        }
    }

    let pool = &draft.resource_pool;
    let needs_rooms = pool.rooms.is_empty() && !pool.assign_rooms_later;
    let needs_trainers = pool.trainers.is_empty() && !pool.assign_trainers_later;
    if needs_rooms || needs_trainers {
        let known = store.resource_pool().await?;
        if needs_rooms {
            draft.resource_pool.rooms = known.rooms;
        }
        if needs_trainers {
            draft.resource_pool.trainers = known.trainers;
        }
    }

    Ok(())
}

fn print_validation_errors(errors: &[String]) {
    println!("Draft rejected ({} errors):", errors.len());
    for error in errors {
        println!("- {error}");
    }
}
