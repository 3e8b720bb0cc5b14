use std::fmt::Write;

use crate::models::SchedulingRequest;
use crate::proposal::{Proposal, ScheduledHours};

pub fn render_markdown(request: &SchedulingRequest, proposal: &Proposal) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Proposition de planning");
    let _ = writeln!(
        output,
        "{} - {} du {} au {} ({} participants, {} jours planifiables)",
        request.display_name(),
        request.session_kind.label(),
        request.start_date,
        request.end_date,
        request.participant_count,
        request.nb_jours
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Synthèse");
    let _ = writeln!(output, "- Séances: {}", proposal.sessions().len());
    match proposal.total_scheduled_hours() {
        ScheduledHours::Programme(hours) => {
            let _ = writeln!(output, "- Total heures: {:.1}h (programme)", hours);
        }
        ScheduledHours::Summed(hours) => {
            let _ = writeln!(output, "- Total heures: {:.1}h (somme des séances)", hours);
        }
    }
    let _ = writeln!(output, "- Formateurs mobilisés: {}", proposal.unique_trainer_count());
    let _ = writeln!(output, "- Salles mobilisées: {}", proposal.unique_room_count());
    if proposal.unassigned_count() > 0 {
        let _ = writeln!(
            output,
            "- Séances à compléter (salle ou formateur à assigner): {}",
            proposal.unassigned_count()
        );
    }

    let by_subject = proposal.hours_by_subject();
    if !by_subject.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Répartition par matière");
        for (subject, hours) in &by_subject {
            let budget = request
                .subjects
                .iter()
                .find(|s| &s.name == subject)
                .map(|s| s.total_hours)
                .unwrap_or_default();
            let _ = writeln!(output, "- {}: {:.1}h planifiées / {}h", subject, hours, budget);
        }
    }

    let stats = proposal.occupancy_stats();
    if !stats.rooms.is_empty() || !stats.trainers.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Occupation");
        for room in &stats.rooms {
            let _ = writeln!(output, "- Salle {}: {:.1}%", room.room_id, room.utilization_percent);
        }
        for trainer in &stats.trainers {
            let _ = writeln!(output, "- Formateur {}: {:.1}h", trainer.trainer_id, trainer.hours);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Séances");
    if proposal.sessions().is_empty() {
        let _ = writeln!(output, "Aucune séance proposée.");
    } else {
        for session in proposal.sessions() {
            let _ = writeln!(
                output,
                "- {} {}-{} {} | salle {} | formateur {}",
                session.date,
                session.start_time.format("%H:%M"),
                session.end_time.format("%H:%M"),
                session.subject.as_deref().unwrap_or(""),
                session.room_id.as_deref().unwrap_or("à assigner"),
                session.trainer_id.as_deref().unwrap_or("à assigner"),
            );
        }
    }

    if !proposal.narrative_report().trim().is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Rapport du solveur");
        let _ = writeln!(output, "{}", proposal.narrative_report().trim());
    }

    output
}
