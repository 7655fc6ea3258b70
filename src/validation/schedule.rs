//! Schedule slot and attempt checks.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use super::ValidationReport;
use crate::models::{
    AssessorPoolPolicy, Availability, CatsLimits, FactSnapshot, ScheduleAttempt, ScheduleSlot,
    WorkloadCategory,
};
use crate::workload::{effective_limits, WorkloadLedger, WorkloadScope};

/// Checks one slot in isolation.
pub fn validate_slot(facts: &FactSnapshot, attempt: &ScheduleAttempt, slot: &ScheduleSlot) -> ValidationReport {
    let mut report = ValidationReport::new();
    if slot.is_empty() {
        return report;
    }
    let sid = slot.id.as_str();
    let config = &attempt.config;
    let session = slot.session_id.as_str();

    // room capacity and group size; the room seats the full required panel
    let expected = facts.required_assessors(&attempt.assessment_id) as usize;
    match facts.room(&slot.room_id) {
        None => report.error("room", sid, format!("unknown room '{}'", slot.room_id)),
        Some(room) => {
            let seats = (room.capacity as usize).saturating_sub(expected);
            if slot.talks.len() > seats {
                report.error(
                    "room_capacity",
                    sid,
                    format!(
                        "{} talks in room '{}' with {seats} seats beside a panel of {expected}",
                        slot.talks.len(),
                        room.id
                    ),
                );
            }
        }
    }
    if slot.talks.len() > config.max_group_size as usize {
        report.error(
            "group_size",
            sid,
            format!("{} talks exceed the group size of {}", slot.talks.len(), config.max_group_size),
        );
    }

    // panel size
    if slot.assessors.len() < expected {
        report.error("assessors", sid, format!("{} of {expected} assessors", slot.assessors.len()));
    } else if slot.assessors.len() > expected {
        report.warning(
            "multiplicity",
            format!("{sid}/assessors"),
            format!("{} assessors, {expected} expected", slot.assessors.len()),
        );
    }

    // availability and enrollment of the panel
    let pclasses: BTreeSet<&str> = slot
        .talks
        .iter()
        .filter_map(|t| facts.talk(t))
        .filter_map(|t| facts.period(&t.period_id))
        .map(|p| p.pclass_id.as_str())
        .collect();
    for f in &slot.assessors {
        match facts.availability.faculty(f, session) {
            Availability::Unavailable => {
                report.error("unavailable_assessor", format!("{sid}/{f}"), format!("'{f}' is unavailable in '{session}'"))
            }
            Availability::IfNeeded => {
                report.warning("if_needed", format!("{sid}/{f}"), format!("'{f}' is only available if needed"))
            }
            Availability::Available => {}
        }
        for pc in &pclasses {
            if !facts.is_enrolled(f, pc, WorkloadCategory::Presentation) {
                report.error(
                    "enrollment",
                    format!("{sid}/{f}/{pc}"),
                    format!("'{f}' is not enrolled for presentations in '{pc}'"),
                );
            }
        }
    }

    // per talk: submitter availability, own student, pool policy
    let mut clash_projects: BTreeMap<&str, usize> = BTreeMap::new();
    for talk_id in &slot.talks {
        let Some(talk) = facts.talk(talk_id) else {
            report.error("talk", format!("{sid}/{talk_id}"), format!("unknown talk '{talk_id}'"));
            continue;
        };
        match facts.availability.submitter(talk_id, session) {
            Availability::Unavailable => report.error(
                "unavailable_submitter",
                format!("{sid}/{talk_id}"),
                format!("submitter of '{talk_id}' is unavailable in '{session}'"),
            ),
            Availability::IfNeeded => report.warning(
                "if_needed",
                format!("{sid}/{talk_id}"),
                format!("submitter of '{talk_id}' is only available if needed"),
            ),
            Availability::Available => {}
        }

        let project = facts.project(&talk.project_id);
        let mut supervisors = talk.supervisor_ids.clone();
        if let Some(owner) = project.and_then(|p| p.owner_id.clone()) {
            supervisors.insert(owner);
        }
        for f in slot.assessors.intersection(&supervisors) {
            report.error(
                "own_student",
                format!("{sid}/{talk_id}/{f}"),
                format!("'{f}' assesses their own student in '{talk_id}'"),
            );
        }

        let Some(project) = project else { continue };
        if project.dont_clash_presentations {
            *clash_projects.entry(project.id.as_str()).or_insert(0) += 1;
        }

        if let Some(pool) = project.assessor_pool() {
            let in_pool = slot.assessors.iter().filter(|f| pool.contains(*f)).count();
            let outside = slot.assessors.len() - in_pool;
            let pool_key = format!("{sid}/{talk_id}");
            match config.pool_policy {
                AssessorPoolPolicy::AtLeastOneInPool if in_pool == 0 => {
                    report.error("pool", pool_key, format!("no assessor of '{talk_id}' is in the project's pool"))
                }
                AssessorPoolPolicy::AllInPool if outside > 0 => report.error(
                    "pool",
                    pool_key,
                    format!("{outside} assessor(s) of '{talk_id}' outside the project's pool"),
                ),
                _ if outside > 0 => report.warning(
                    "pool",
                    pool_key,
                    format!("{outside} assessor(s) of '{talk_id}' outside the project's pool"),
                ),
                _ => {}
            }
        }

        // research-group policies are advisory
        let groups: BTreeSet<&str> = supervisors
            .iter()
            .filter_map(|f| facts.faculty_member(f))
            .filter_map(|f| f.research_group.as_deref())
            .collect();
        if !groups.is_empty() {
            let sharing = slot
                .assessors
                .iter()
                .filter_map(|f| facts.faculty_member(f))
                .filter(|f| f.research_group.as_deref().map_or(false, |g| groups.contains(g)))
                .count();
            let missed = match config.pool_policy {
                AssessorPoolPolicy::AtLeastOneInResearchGroup => sharing == 0,
                AssessorPoolPolicy::AllInResearchGroup => sharing < slot.assessors.len(),
                _ => false,
            };
            if missed {
                report.warning(
                    "research_group",
                    format!("{sid}/{talk_id}"),
                    format!("panel of '{talk_id}' misses the supervisor's research group"),
                );
            }
        }
    }

    if !config.ignore_coscheduling {
        let clashing: Vec<&str> = clash_projects
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(p, _)| *p)
            .collect();
        if !clashing.is_empty() {
            report.error(
                "clash",
                sid,
                format!("talks of {} share a slot", clashing.join(", ")),
            );
        }
    }

    report
}

/// Checks that need the whole attempt.
pub fn validate_schedule_attempt_only(
    facts: &FactSnapshot,
    attempt: &ScheduleAttempt,
    included: &[&ScheduleAttempt],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    if !attempt.meta.finished {
        return report;
    }
    let config = &attempt.config;

    // talk uniqueness and completeness
    let mut placements: BTreeMap<&str, usize> = BTreeMap::new();
    for slot in &attempt.slots {
        for t in &slot.talks {
            *placements.entry(t.as_str()).or_insert(0) += 1;
        }
    }
    for (talk, n) in &placements {
        if *n > 1 {
            report.error("talk_duplicate", *talk, format!("'{talk}' is scheduled {n} times"));
        }
    }
    if let Some(assessment) = facts.assessment(&attempt.assessment_id) {
        for talk in &assessment.talk_ids {
            if !placements.contains_key(talk.as_str()) {
                report.error("unplaced", talk.as_str(), format!("'{talk}' is not scheduled"));
            }
        }
    }

    // assessor session multiplicity and assignment limit
    let mut per_session: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for slot in attempt.slots.iter().filter(|s| !s.is_empty()) {
        for f in &slot.assessors {
            *per_session.entry((f.as_str(), slot.session_id.as_str())).or_insert(0) += 1;
        }
    }
    for ((f, session), n) in &per_session {
        if *n > config.assessor_multiplicity_per_session as usize {
            report.error(
                "session_multiplicity",
                format!("{f}/{session}"),
                format!("'{f}' sits on {n} panels in '{session}'"),
            );
        }
    }
    let loads = attempt.assessor_loads();
    if let Some(limit) = config.assessor_assigned_limit {
        for (f, n) in &loads {
            if *n > limit as usize {
                report.error("assigned_limit", *f, format!("'{f}' sits on {n} panels, limit {limit}"));
            }
        }
    }

    // presentation CATS, this attempt plus the included ones
    let ledger = WorkloadLedger::new(facts)
        .with_schedule(attempt)
        .with_schedules(included.iter().copied());
    let attempt_limits = CatsLimits {
        presentation: config.assessor_cats_limit,
        ..CatsLimits::default()
    };
    let overrides = BTreeMap::new();
    for f in loads.keys() {
        let limits = effective_limits(facts, &attempt_limits, &overrides, f, None, false);
        let totals = ledger.totals(f, &WorkloadScope::All);
        for (category, total, limit) in totals.excess_over(&limits.hard) {
            report.error(
                "cats",
                format!("{f}/{}", category.as_str()),
                format!("'{f}' carries {total} {} CATS against a limit of {limit}", category.as_str()),
            );
        }
    }
    report
}

/// Full validation of a schedule attempt.
#[instrument(skip_all, fields(attempt = %attempt.id()))]
pub fn validate_schedule(
    facts: &FactSnapshot,
    attempt: &ScheduleAttempt,
    included: &[&ScheduleAttempt],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    if !attempt.meta.finished {
        return report;
    }
    for slot in &attempt.slots {
        report.merge(&validate_slot(facts, attempt, slot));
    }
    report.merge(&validate_schedule_attempt_only(facts, attempt, included));
    debug!(errors = report.errors.len(), warnings = report.warnings.len(), "schedule validated");
    report
}
