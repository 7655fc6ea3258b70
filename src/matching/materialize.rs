//! Commits a matching verdict to an attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::builder::MatchingModel;
use super::objective::attempt_score;
use crate::error::{EngineError, EngineResult};
use crate::models::{FactSnapshot, MatchingAttempt, MatchingRecord, RecordSnapshot};
use crate::solver::SolverVerdict;

/// Replaces the attempt's records with those decoded from `verdict`.
///
/// The new record set is decoded and checked before anything is touched;
/// on error the attempt is unchanged. Existing shadows are carried over by
/// (selector, period) so the first baseline survives re-solves.
///
/// An unusable verdict finishes the attempt with no records.
#[instrument(skip_all, fields(attempt = %attempt.id(), outcome = ?verdict.outcome))]
pub fn materialize(
    attempt: &mut MatchingAttempt,
    facts: &FactSnapshot,
    model: &MatchingModel,
    verdict: &SolverVerdict,
    construct_time: Duration,
) -> EngineResult<()> {
    if !verdict.outcome.is_usable() {
        warn!("solver returned no usable solution");
        attempt.records.clear();
        attempt.meta.record_verdict(verdict, construct_time);
        attempt.meta.score = None;
        return Ok(());
    }

    let mut records = model.decode(facts, verdict)?;
    check_structure(&records)?;

    let mut shadows: BTreeMap<(&str, &str), &RecordSnapshot> = BTreeMap::new();
    for old in &attempt.records {
        if let Some(orig) = &old.original {
            shadows.insert((old.selector_id.as_str(), old.period_id.as_str()), orig);
        }
    }
    for record in &mut records {
        match shadows.get(&(record.selector_id.as_str(), record.period_id.as_str())) {
            Some(orig) => record.original = Some((*orig).clone()),
            None => record.ensure_original(),
        }
    }

    let score = attempt_score(&attempt.config, facts, &records);
    attempt.records = records;
    attempt.meta.record_verdict(verdict, construct_time);
    attempt.meta.score = score;
    info!(records = attempt.records.len(), score = ?score, "matching committed");
    Ok(())
}

/// Rejects record sets with duplicate keys or a user holding two role
/// kinds on one record.
fn check_structure(records: &[MatchingRecord]) -> EngineResult<()> {
    let mut seen = BTreeSet::new();
    for record in records {
        if !seen.insert((record.selector_id.as_str(), record.period_id.as_str())) {
            return Err(EngineError::UnusableVerdict(format!(
                "duplicate record for selector '{}' in period '{}'",
                record.selector_id, record.period_id
            )));
        }
        for user in record.staff() {
            if record.roles_of(user).len() > 1 {
                return Err(EngineError::UnusableVerdict(format!(
                    "'{user}' holds more than one role on record '{}'",
                    record.id
                )));
            }
        }
    }
    Ok(())
}

/// Restores every record from its shadow. Returns how many changed.
pub fn revert(attempt: &mut MatchingAttempt, facts: &FactSnapshot) -> usize {
    let mut changed = 0;
    for record in &mut attempt.records {
        let before = record.snapshot();
        if record.revert() && record.snapshot() != before {
            changed += 1;
        }
    }
    if changed > 0 {
        attempt.meta.score = attempt_score(&attempt.config, facts, &attempt.records);
        attempt.meta.touch();
        info!(attempt = %attempt.id(), changed, "matching reverted");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::matching::MatchingProblemBuilder;
    use crate::models::{
        CatsValues, EnrollmentRecord, Faculty, ProjectClass, ProjectFacts, RoleKind, Selector,
        SubmissionPeriod,
    };
    use crate::solver::{run, PackagedMilp, SolverOutcome};

    fn facts() -> FactSnapshot {
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 0, 0)))
            .with_period(SubmissionPeriod::new("T1", "PC1"))
            .with_faculty(Faculty::new("F1"))
            .with_faculty(Faculty::new("F2"))
            .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
            .with_enrollment(EnrollmentRecord::new("F2", "PC1"))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1"))
            .with_project(ProjectFacts::new("P2", "PC1").with_owner("F2"))
            .with_selector(Selector::new("S1", "PC1").with_choice("P1", 1).with_choice("P2", 2))
    }

    fn attempt() -> MatchingAttempt {
        MatchingAttempt::new("A", "a", 2025)
            .with_pclass("PC1")
            .with_config(MatchingConfig {
                levelling_bias: 0.0,
                intra_group_tension: 0.0,
                no_assignment_penalty: 0.0,
                ..MatchingConfig::default()
            })
    }

    #[test]
    fn test_commit_sets_records_score_and_shadow() {
        let facts = facts();
        let mut attempt = attempt();
        let model = MatchingProblemBuilder::new(&facts, &attempt).build().unwrap();
        let verdict = run(&PackagedMilp, &model.problem);

        materialize(&mut attempt, &facts, &model, &verdict, Duration::from_millis(3)).unwrap();

        assert!(attempt.meta.finished);
        assert_eq!(attempt.meta.outcome, Some(SolverOutcome::Optimal));
        assert_eq!(attempt.records.len(), 1);
        assert!((attempt.meta.score.unwrap() - 1.0).abs() < 1e-10);
        let original = attempt.records[0].original.as_ref().unwrap();
        assert_eq!(original.project_id, "P1");
    }

    #[test]
    fn test_unusable_verdict_clears_records() {
        let facts = facts();
        let mut attempt = attempt();
        attempt.records = vec![MatchingRecord::new("A", "S1", "T1", "P2")];
        let model = MatchingProblemBuilder::new(&facts, &attempt).build().unwrap();
        let verdict = SolverVerdict::unusable(SolverOutcome::Infeasible, Duration::ZERO);

        materialize(&mut attempt, &facts, &model, &verdict, Duration::ZERO).unwrap();
        assert!(attempt.meta.finished);
        assert!(attempt.records.is_empty());
        assert_eq!(attempt.meta.score, None);
    }

    #[test]
    fn test_failed_decode_leaves_attempt_untouched() {
        let facts = facts();
        let mut attempt = attempt();
        let model = MatchingProblemBuilder::new(&facts, &attempt).build().unwrap();
        // claims optimal but selects nothing
        let verdict = SolverVerdict {
            outcome: SolverOutcome::Optimal,
            values: vec![0.0; model.problem.num_vars()],
            objective: Some(0.0),
            compute_time: Duration::ZERO,
        };
        let before = attempt.clone();
        assert!(materialize(&mut attempt, &facts, &model, &verdict, Duration::ZERO).is_err());
        assert_eq!(attempt, before);
    }

    #[test]
    fn test_resolve_keeps_first_baseline_and_revert_restores_it() {
        let facts = facts();
        let mut attempt = attempt();
        let model = MatchingProblemBuilder::new(&facts, &attempt).build().unwrap();
        let verdict = run(&PackagedMilp, &model.problem);
        materialize(&mut attempt, &facts, &model, &verdict, Duration::ZERO).unwrap();

        // manual edit, then a second materialization of the same verdict
        {
            let record = attempt.record_mut("S1", "T1").unwrap();
            record.project_id = "P2".into();
            record.rank = Some(2);
            record.roles.clear();
        }
        materialize(&mut attempt, &facts, &model, &verdict, Duration::ZERO).unwrap();
        assert_eq!(attempt.records[0].original.as_ref().unwrap().project_id, "P1");

        let record = attempt.record_mut("S1", "T1").unwrap();
        record.project_id = "P2".into();
        record.roles.clear();
        record.roles.insert(crate::models::Role::new("F2", RoleKind::Supervisor));

        assert_eq!(revert(&mut attempt, &facts), 1);
        let record = attempt.record("S1", "T1").unwrap();
        assert_eq!(record.project_id, "P1");
        assert!(record.has_role("F1", RoleKind::Supervisor));
        assert_eq!(revert(&mut attempt, &facts), 0);
    }
}
