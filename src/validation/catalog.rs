//! Catalog integrity checks.
//!
//! Checks the structural integrity of a [`FactSnapshot`] before it is used
//! for a solve. Detects:
//! - References to unknown classes, periods, projects, faculty, rooms,
//!   sessions and talks
//! - Duplicate enrollment records
//! - Duplicate projects or ranks within one selector's list

use std::collections::BTreeSet;

use super::ValidationReport;
use crate::models::FactSnapshot;

const UNKNOWN: &str = "unknown_reference";

/// Validates the cross-references of a catalog snapshot.
///
/// All problems are errors; the report is empty for a consistent catalog.
pub fn validate_catalog(facts: &FactSnapshot) -> ValidationReport {
    let mut report = ValidationReport::new();

    for period in facts.periods.values() {
        if facts.pclass(&period.pclass_id).is_none() {
            report.error(
                UNKNOWN,
                format!("period/{}", period.id),
                format!("Period '{}' references unknown project class '{}'", period.id, period.pclass_id),
            );
        }
    }

    for project in facts.projects.values() {
        for pc in &project.pclass_ids {
            if facts.pclass(pc).is_none() {
                report.error(
                    UNKNOWN,
                    format!("project/{}/{pc}", project.id),
                    format!("Project '{}' is offered in unknown project class '{pc}'", project.id),
                );
            }
        }
        let staff = project
            .owner_id
            .iter()
            .chain(project.supervisor_pool().into_iter().flatten())
            .chain(project.assessor_pool().into_iter().flatten());
        for f in staff {
            if facts.faculty_member(f).is_none() {
                report.error(
                    UNKNOWN,
                    format!("project/{}/{f}", project.id),
                    format!("Project '{}' references unknown faculty member '{f}'", project.id),
                );
            }
        }
        for alt in project.alternatives() {
            if facts.project(&alt.project_id).is_none() {
                report.error(
                    UNKNOWN,
                    format!("project/{}/{}", project.id, alt.project_id),
                    format!("Project '{}' lists unknown alternative '{}'", project.id, alt.project_id),
                );
            }
        }
    }

    let mut enrollments = BTreeSet::new();
    for e in &facts.enrollments {
        let key = format!("{}/{}", e.faculty_id, e.pclass_id);
        if !enrollments.insert(key.clone()) {
            report.error("duplicate_id", format!("enrollment/{key}"), format!("Duplicate enrollment: {key}"));
        }
        if facts.faculty_member(&e.faculty_id).is_none() {
            report.error(
                UNKNOWN,
                format!("enrollment/{key}"),
                format!("Enrollment references unknown faculty member '{}'", e.faculty_id),
            );
        }
        if facts.pclass(&e.pclass_id).is_none() {
            report.error(
                UNKNOWN,
                format!("enrollment/{key}/pclass"),
                format!("Enrollment references unknown project class '{}'", e.pclass_id),
            );
        }
    }

    for selector in facts.selectors.values() {
        if facts.pclass(&selector.pclass_id).is_none() {
            report.error(
                UNKNOWN,
                format!("selector/{}", selector.id),
                format!("Selector '{}' references unknown project class '{}'", selector.id, selector.pclass_id),
            );
        }
        let mut projects = BTreeSet::new();
        let mut ranks = BTreeSet::new();
        for choice in &selector.choices {
            if facts.project(&choice.project_id).is_none() {
                report.error(
                    UNKNOWN,
                    format!("selector/{}/{}", selector.id, choice.project_id),
                    format!("Selector '{}' ranks unknown project '{}'", selector.id, choice.project_id),
                );
            }
            if !projects.insert(choice.project_id.as_str()) {
                report.error(
                    "duplicate_choice",
                    format!("selector/{}/{}", selector.id, choice.project_id),
                    format!("Selector '{}' ranks project '{}' twice", selector.id, choice.project_id),
                );
            }
            if !ranks.insert(choice.rank) {
                report.error(
                    "duplicate_choice",
                    format!("selector/{}/rank{}", selector.id, choice.rank),
                    format!("Selector '{}' uses rank {} twice", selector.id, choice.rank),
                );
            }
        }
    }

    for session in facts.sessions.values() {
        for room in &session.room_ids {
            if facts.room(room).is_none() {
                report.error(
                    UNKNOWN,
                    format!("session/{}/{room}", session.id),
                    format!("Session '{}' uses unknown room '{room}'", session.id),
                );
            }
        }
    }

    for talk in facts.talks.values() {
        let refs = [
            ("selector", facts.selector(&talk.selector_id).is_some(), &talk.selector_id),
            ("project", facts.project(&talk.project_id).is_some(), &talk.project_id),
            ("period", facts.period(&talk.period_id).is_some(), &talk.period_id),
        ];
        for (what, known, id) in refs {
            if !known {
                report.error(
                    UNKNOWN,
                    format!("talk/{}/{what}", talk.id),
                    format!("Talk '{}' references unknown {what} '{id}'", talk.id),
                );
            }
        }
    }

    for assessment in facts.assessments.values() {
        let missing = assessment
            .period_ids
            .iter()
            .filter(|p| facts.period(p).is_none())
            .map(|p| ("period", p))
            .chain(
                assessment
                    .session_ids
                    .iter()
                    .filter(|s| facts.session(s).is_none())
                    .map(|s| ("session", s)),
            )
            .chain(
                assessment
                    .talk_ids
                    .iter()
                    .filter(|t| facts.talk(t).is_none())
                    .map(|t| ("talk", t)),
            )
            .chain(
                assessment
                    .assessor_ids
                    .iter()
                    .filter(|f| facts.faculty_member(f).is_none())
                    .map(|f| ("faculty member", f)),
            );
        for (what, id) in missing {
            report.error(
                UNKNOWN,
                format!("assessment/{}/{id}", assessment.id),
                format!("Assessment '{}' references unknown {what} '{id}'", assessment.id),
            );
        }
    }

    report
}
