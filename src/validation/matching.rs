//! Matching record and attempt checks.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use super::ValidationReport;
use crate::models::{FactSnapshot, Hint, MatchingAttempt, MatchingRecord, RoleKind, WorkloadCategory};
use crate::workload::{effective_limits, WorkloadLedger, WorkloadScope};

/// Checks one record in isolation.
pub fn validate_record(facts: &FactSnapshot, record: &MatchingRecord) -> ValidationReport {
    let mut report = ValidationReport::new();
    let rid = record.id.as_str();

    let Some(period) = facts.period(&record.period_id) else {
        report.error("period", rid, format!("unknown submission period '{}'", record.period_id));
        return report;
    };
    let pclass = period.pclass_id.as_str();
    let selector = facts.selector(&record.selector_id);

    if let Some(s) = selector {
        if s.pclass_id != pclass {
            report.error(
                "pclass",
                format!("{rid}/selector"),
                format!("selector belongs to '{}' but the period to '{pclass}'", s.pclass_id),
            );
        }
    }

    match facts.project(&record.project_id) {
        None => report.error("project", rid, format!("unknown project '{}'", record.project_id)),
        Some(project) => {
            if !project.is_offered_in(pclass) {
                report.error("pclass", rid, format!("project '{}' is not offered in '{pclass}'", project.id));
            } else if !project.has_description_for(pclass) {
                report.error(
                    "description",
                    rid,
                    format!("project '{}' has no description for '{pclass}'", project.id),
                );
            }
            if let Some(owner) = &project.owner_id {
                if !record.supervisors().contains(&owner.as_str()) {
                    report.warning("owner", rid, format!("project owner '{owner}' is not a supervisor"));
                }
            }
        }
    }

    // role structure
    for user in record.staff() {
        let kinds = record.roles_of(user);
        if kinds.contains(&RoleKind::Supervisor) && kinds.contains(&RoleKind::ResponsibleSupervisor) {
            report.error(
                "duplicate_role",
                format!("{rid}/{user}"),
                format!("'{user}' is both supervisor and responsible supervisor"),
            );
        }
        let categories: BTreeSet<WorkloadCategory> = kinds.iter().map(|k| k.category()).collect();
        if categories.len() > 1 {
            report.error(
                "disjoint",
                format!("{rid}/{user}"),
                format!(
                    "'{user}' holds more than one role: {}",
                    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
                ),
            );
        }
        for kind in kinds {
            if !facts.is_enrolled(user, pclass, kind.category()) {
                report.error(
                    "enrollment",
                    format!("{rid}/{user}/{}", kind.as_str()),
                    format!("'{user}' is not enrolled for {} in '{pclass}'", kind.category().as_str()),
                );
            }
        }
    }

    if record.supervisors().is_empty() {
        report.error("supervisor", rid, "no supervisor assigned");
    }
    for (kind, expected, label) in [
        (RoleKind::Marker, period.number_markers, "markers"),
        (RoleKind::Moderator, period.number_moderators, "moderators"),
    ] {
        let found = record.holders(kind).len() as u32;
        if found < expected {
            report.error(label, rid, format!("{found} of {expected} {label} assigned"));
        } else if found > expected {
            report.warning(
                "multiplicity",
                format!("{rid}/{label}"),
                format!("{found} {label} assigned, {expected} expected"),
            );
        }
    }

    if let Some(s) = selector {
        if s.hint_for(&record.project_id) == Hint::Forbid {
            report.warning("hint", rid, format!("assigned to forbidden project '{}'", record.project_id));
        }
        for choice in s.choices.iter().filter(|c| c.hint == Hint::Require) {
            if choice.project_id != record.project_id {
                report.warning(
                    "hint",
                    format!("{rid}/{}", choice.project_id),
                    format!("required project '{}' not assigned", choice.project_id),
                );
            }
        }
        if s.has_submitted() && record.rank.is_none() {
            if record.alternative {
                report.warning(
                    "alternative",
                    rid,
                    format!("assigned alternative with priority {}", record.priority.unwrap_or(0)),
                );
            } else {
                report.warning("unranked", rid, format!("'{}' is not on the submitted list", record.project_id));
            }
        }
    }

    report
}

/// Checks that need the whole attempt: capacity and CATS ceilings.
pub fn validate_matching_attempt_only(
    facts: &FactSnapshot,
    attempt: &MatchingAttempt,
    included: &[&MatchingAttempt],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    if !attempt.meta.finished {
        return report;
    }

    // capacity: distinct selectors per (project, supervisor)
    let mut load: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
    for record in &attempt.records {
        for f in record.supervisors() {
            load.entry((record.project_id.as_str(), f))
                .or_default()
                .insert(record.selector_id.as_str());
        }
    }
    for ((project_id, f), selectors) in &load {
        let Some(project) = facts.project(project_id) else { continue };
        if project.enforce_capacity && selectors.len() > project.capacity as usize {
            report.error(
                "capacity",
                format!("{project_id}/{f}"),
                format!(
                    "'{f}' supervises {} students on '{project_id}' (capacity {})",
                    selectors.len(),
                    project.capacity
                ),
            );
        }
    }

    // CATS ceilings, this attempt plus the included ones
    let config = &attempt.config;
    let ledger = WorkloadLedger::new(facts)
        .with_matching(attempt)
        .with_matchings(included.iter().copied());
    let staff: BTreeSet<&str> = attempt.records.iter().flat_map(|r| r.staff()).collect();
    for f in staff {
        let scopes = std::iter::once(None).chain(attempt.pclass_ids.iter().map(|pc| Some(pc.as_str())));
        for pclass in scopes {
            let scope = match pclass {
                Some(pc) => WorkloadScope::ProjectClass(pc.to_string()),
                None => WorkloadScope::All,
            };
            let label = pclass.unwrap_or("*");
            let limits = effective_limits(
                facts,
                &config.attempt_limits,
                &config.limit_overrides,
                f,
                pclass,
                config.ignore_per_faculty_limits,
            );
            let totals = ledger.totals(f, &scope);
            for (category, total, limit) in totals.excess_over(&limits.hard) {
                report.error(
                    "cats",
                    format!("{f}/{label}/{}", category.as_str()),
                    format!("'{f}' carries {total} {} CATS against a limit of {limit}", category.as_str()),
                );
            }
            for (category, total, limit) in totals.excess_over(&limits.soft) {
                report.warning(
                    "cats",
                    format!("{f}/{label}/{}", category.as_str()),
                    format!("'{f}' carries {total} {} CATS above the soft limit of {limit}", category.as_str()),
                );
            }
        }
    }
    report
}

/// Full validation of a matching attempt.
#[instrument(skip_all, fields(attempt = %attempt.id()))]
pub fn validate_matching(
    facts: &FactSnapshot,
    attempt: &MatchingAttempt,
    included: &[&MatchingAttempt],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    if !attempt.meta.finished {
        return report;
    }
    for record in &attempt.records {
        report.merge(&validate_record(facts, record));
    }
    report.merge(&validate_matching_attempt_only(facts, attempt, included));
    debug!(errors = report.errors.len(), warnings = report.warnings.len(), "matching validated");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CatsLimits, CatsValues, EnrollmentRecord, EnrollmentState, Faculty, ProjectClass,
        ProjectFacts, Selector, SubmissionPeriod,
    };
    use crate::validation::IssueKey;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn facts() -> FactSnapshot {
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 1, 0)))
            .with_pclass(ProjectClass::new("PC2", CatsValues::new(10, 3, 1, 0)))
            .with_period(SubmissionPeriod::new("T1", "PC1"))
            .with_faculty(Faculty::new("F1"))
            .with_faculty(Faculty::new("F2"))
            .with_faculty(Faculty::new("F3"))
            .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
            .with_enrollment(EnrollmentRecord::new("F2", "PC1"))
            .with_enrollment(
                EnrollmentRecord::new("F3", "PC1").with_state(WorkloadCategory::Marking, EnrollmentState::Sabbatical),
            )
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1").with_capacity(1))
            .with_project(ProjectFacts::new("P2", "PC2").with_owner("F2"))
            .with_selector(Selector::new("S1", "PC1").with_choice("P1", 1))
            .with_selector(Selector::new("S2", "PC1").with_choice("P1", 1).with_hint("P1", Hint::Forbid))
    }

    fn good(selector: &str) -> MatchingRecord {
        MatchingRecord::new("A", selector, "T1", "P1")
            .with_rank(1)
            .with_role("F1", RoleKind::Supervisor)
            .with_role("F2", RoleKind::Marker)
    }

    fn finished(records: Vec<MatchingRecord>) -> MatchingAttempt {
        let mut attempt = MatchingAttempt::new("A", "a", 2025).with_pclass("PC1");
        attempt.meta.finished = true;
        attempt.records = records;
        attempt
    }

    #[test]
    fn test_clean_record() {
        assert!(validate_record(&facts(), &good("S1")).is_ok());
        assert!(validate_matching(&facts(), &finished(vec![good("S1")]), &[]).is_ok());
    }

    #[test]
    fn test_role_disjointness_and_enrollment() {
        let record = good("S1").with_role("F1", RoleKind::Marker).with_role("F3", RoleKind::Marker);
        let report = validate_record(&facts(), &record);

        assert!(report.errors.contains_key(&IssueKey::new("disjoint", "A/S1/T1/F1")));
        assert!(report.errors.contains_key(&IssueKey::new("enrollment", "A/S1/T1/F3/marker")));
        // three markers where one is expected
        assert!(report.warnings.contains_key(&IssueKey::new("multiplicity", "A/S1/T1/markers")));
    }

    #[test]
    fn test_wrong_class_and_missing_markers() {
        let record = MatchingRecord::new("A", "S1", "T1", "P2").with_role("F2", RoleKind::Supervisor);
        let report = validate_record(&facts(), &record);
        assert!(report.errors.contains_key(&IssueKey::new("pclass", "A/S1/T1")));
        assert!(report.errors.contains_key(&IssueKey::new("markers", "A/S1/T1")));
        assert!(report.warnings.contains_key(&IssueKey::new("unranked", "A/S1/T1")));
    }

    #[test]
    fn test_missing_description() {
        let facts = facts().with_project(ProjectFacts::new("P1", "PC1").with_owner("F1").without_description_for("PC1"));
        let report = validate_record(&facts, &good("S1"));
        assert!(report.errors.contains_key(&IssueKey::new("description", "A/S1/T1")));
    }

    #[test]
    fn test_forbid_hint_warns() {
        let report = validate_record(&facts(), &good("S2"));
        assert!(!report.has_errors());
        assert!(report.warnings.contains_key(&IssueKey::new("hint", "A/S2/T1")));
    }

    #[test]
    fn test_capacity_and_cats() {
        let mut attempt = finished(vec![good("S1"), good("S2")]);
        attempt.config = attempt
            .config
            .clone()
            .with_attempt_limits(CatsLimits::default().with_supervision(15));

        let report = validate_matching(&facts(), &attempt, &[]);
        assert!(report.errors.contains_key(&IssueKey::new("capacity", "P1/F1")));
        assert!(report.errors.contains_key(&IssueKey::new("cats", "F1/*/supervision")));
        assert!(report.errors.contains_key(&IssueKey::new("cats", "F1/PC1/supervision")));
    }

    #[test]
    fn test_included_attempt_counts_towards_ceiling() {
        let mut attempt = finished(vec![good("S1")]);
        attempt.config = attempt
            .config
            .clone()
            .with_attempt_limits(CatsLimits::default().with_marking(5));
        let mut other = finished(vec![MatchingRecord::new("B", "S2", "T1", "P1").with_role("F2", RoleKind::Marker)]);
        other.meta.id = "B".into();

        assert!(validate_matching(&facts(), &attempt, &[]).errors_in("cats").next().is_none());
        let report = validate_matching(&facts(), &attempt, &[&other]);
        assert!(report.errors.contains_key(&IssueKey::new("cats", "F2/*/marking")));
    }

    #[test]
    fn test_unfinished_is_vacuously_valid() {
        let mut attempt = finished(vec![good("S1").with_role("F1", RoleKind::Marker)]);
        attempt.meta.finished = false;
        assert!(validate_matching(&facts(), &attempt, &[]).is_ok());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut rng = SmallRng::seed_from_u64(3);
        let users = ["F1", "F2", "F3", "F9"];
        let kinds = [RoleKind::Supervisor, RoleKind::Marker, RoleKind::Moderator];
        let facts = facts();
        for _ in 0..100 {
            let mut records = Vec::new();
            for s in ["S1", "S2"] {
                let project = if rng.random_bool(0.5) { "P1" } else { "P2" };
                let mut record = MatchingRecord::new("A", s, "T1", project);
                for _ in 0..rng.random_range(0..4) {
                    let user = users[rng.random_range(0..users.len())];
                    let kind = kinds[rng.random_range(0..kinds.len())];
                    record = record.with_role(user, kind);
                }
                records.push(record);
            }
            let attempt = finished(records);
            let first = validate_matching(&facts, &attempt, &[]);
            let second = validate_matching(&facts, &attempt, &[]);
            assert_eq!(first, second);
        }
    }
}
