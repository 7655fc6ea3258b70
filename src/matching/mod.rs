//! Student ↔ project ↔ staff-role matching.
//!
//! A solve runs in three steps:
//!
//! 1. [`MatchingProblemBuilder`] turns facts and the attempt's configuration
//!    into a [`LinearProblem`](crate::solver::LinearProblem)
//! 2. a [`SolverBackend`] produces a verdict
//! 3. [`materialize`] commits the verdict as records
//!
//! [`solve`] covers steps 1 and 2 and reports the construct time separately
//! from the solver's compute time.

mod builder;
mod materialize;
mod objective;
mod stats;

pub use builder::{MatchingModel, MatchingProblemBuilder};
pub use materialize::{materialize, revert};
pub use objective::{
    attempt_score, effective_rank, hint_multiplier, pairing_reward, pairing_weight,
    programme_matches, record_score,
};
pub use stats::{CatsRange, MatchingStats};

use std::time::{Duration, Instant};
use tracing::instrument;

use crate::error::EngineResult;
use crate::models::{FactSnapshot, MatchingAttempt};
use crate::solver::{run, SolverBackend, SolverVerdict};

/// A built model together with its verdict.
#[derive(Debug, Clone)]
pub struct MatchingSolve {
    pub model: MatchingModel,
    pub verdict: SolverVerdict,
    pub construct_time: Duration,
}

/// Builds the attempt's model and runs `backend` on it.
#[instrument(skip_all, fields(attempt = %attempt.id(), backend = ?backend.kind()))]
pub fn solve(
    facts: &FactSnapshot,
    attempt: &MatchingAttempt,
    base: Option<&MatchingAttempt>,
    included: &[&MatchingAttempt],
    backend: &dyn SolverBackend,
) -> EngineResult<MatchingSolve> {
    let started = Instant::now();
    let mut builder = MatchingProblemBuilder::new(facts, attempt).with_included(included.iter().copied());
    if let Some(base) = base {
        builder = builder.with_base(base);
    }
    let model = builder.build()?;
    let construct_time = started.elapsed();

    let verdict = run(backend, &model.problem);
    Ok(MatchingSolve {
        model,
        verdict,
        construct_time,
    })
}

/// Solves and commits in one step.
pub fn solve_and_commit(
    facts: &FactSnapshot,
    attempt: &mut MatchingAttempt,
    base: Option<&MatchingAttempt>,
    included: &[&MatchingAttempt],
    backend: &dyn SolverBackend,
) -> EngineResult<()> {
    let solved = solve(facts, attempt, base, included, backend)?;
    materialize(attempt, facts, &solved.model, &solved.verdict, solved.construct_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CatsLimits, CatsValues, EnrollmentRecord, Faculty, ProjectClass, ProjectFacts, Selector,
        SubmissionPeriod,
    };
    use crate::solver::{PackagedMilp, SolverOutcome};

    /// Two selectors rank P1 (capacity 1) above P2 (capacity 2).
    fn facts() -> FactSnapshot {
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 0, 0, 0)))
            .with_period(SubmissionPeriod::new("T1", "PC1").with_markers(0))
            .with_faculty(Faculty::new("F"))
            .with_faculty(Faculty::new("G"))
            .with_enrollment(EnrollmentRecord::new("F", "PC1"))
            .with_enrollment(EnrollmentRecord::new("G", "PC1"))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F").with_capacity(1))
            .with_project(ProjectFacts::new("P2", "PC1").with_owner("G").with_capacity(2))
            .with_selector(Selector::new("S", "PC1").with_choice("P1", 1).with_choice("P2", 2))
    }

    fn attempt() -> MatchingAttempt {
        let config = crate::config::MatchingConfig::default()
            .with_attempt_limits(CatsLimits::default().with_supervision(20));
        MatchingAttempt::new("A", "a", 2025)
            .with_pclass("PC1")
            .with_config(config)
    }

    #[test]
    fn test_single_selector_scenario() {
        let facts = facts();
        let mut attempt = attempt();
        solve_and_commit(&facts, &mut attempt, None, &[], &PackagedMilp).unwrap();

        assert_eq!(attempt.meta.outcome, Some(SolverOutcome::Optimal));
        assert_eq!(attempt.records.len(), 1);
        assert_eq!(attempt.records[0].project_id, "P1");
        assert!((attempt.meta.score.unwrap() - 1.0).abs() < 1e-10);
        assert!(attempt.meta.construct_time.is_some());
    }

    #[test]
    fn test_contended_first_choice_scenario() {
        let facts = facts()
            .with_selector(Selector::new("S2", "PC1").with_choice("P1", 1).with_choice("P2", 2));
        let mut attempt = attempt();
        solve_and_commit(&facts, &mut attempt, None, &[], &PackagedMilp).unwrap();

        assert_eq!(attempt.meta.outcome, Some(SolverOutcome::Optimal));
        let on_p1: Vec<_> = attempt.records.iter().filter(|r| r.project_id == "P1").collect();
        let on_p2: Vec<_> = attempt.records.iter().filter(|r| r.project_id == "P2").collect();
        assert_eq!(on_p1.len(), 1);
        assert_eq!(on_p2.len(), 1);
        assert_eq!(on_p2[0].rank, Some(2));
        assert!((attempt.meta.score.unwrap() - 1.5).abs() < 1e-10);
    }
}
