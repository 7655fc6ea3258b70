//! Presentation scheduling: talks into (session, room) slots with panels.

mod builder;
mod materialize;
mod stats;

pub use builder::{ScheduleModel, ScheduleProblemBuilder};
pub use materialize::{materialize, revert};
pub use stats::ScheduleStats;

use std::time::{Duration, Instant};
use tracing::instrument;

use crate::error::EngineResult;
use crate::models::{FactSnapshot, ScheduleAttempt};
use crate::solver::{run, SolverBackend, SolverVerdict};

/// A built model together with its verdict.
#[derive(Debug, Clone)]
pub struct ScheduleSolve {
    pub model: ScheduleModel,
    pub verdict: SolverVerdict,
    pub construct_time: Duration,
}

/// Builds the attempt's model and runs `backend` on it.
#[instrument(skip_all, fields(attempt = %attempt.id(), backend = ?backend.kind()))]
pub fn solve(
    facts: &FactSnapshot,
    attempt: &ScheduleAttempt,
    base: Option<&ScheduleAttempt>,
    included: &[&ScheduleAttempt],
    backend: &dyn SolverBackend,
) -> EngineResult<ScheduleSolve> {
    let started = Instant::now();
    let mut builder = ScheduleProblemBuilder::new(facts, attempt).with_included(included.iter().copied());
    if let Some(base) = base {
        builder = builder.with_base(base);
    }
    let model = builder.build()?;
    let construct_time = started.elapsed();

    let verdict = run(backend, &model.problem);
    Ok(ScheduleSolve {
        model,
        verdict,
        construct_time,
    })
}

/// Solves and commits in one step.
pub fn solve_and_commit(
    facts: &FactSnapshot,
    attempt: &mut ScheduleAttempt,
    base: Option<&ScheduleAttempt>,
    included: &[&ScheduleAttempt],
    backend: &dyn SolverBackend,
) -> EngineResult<()> {
    let solved = solve(facts, attempt, base, included, backend)?;
    materialize(attempt, &solved.model, &solved.verdict, solved.construct_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Assessment, CatsValues, EnrollmentRecord, Faculty, PresentationSession, ProjectClass,
        ProjectFacts, Room, SubmissionPeriod, Talk,
    };
    use crate::solver::PackagedMilp;
    use chrono::NaiveDate;

    #[test]
    fn test_base_placement_is_kept() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 12).unwrap();
        let facts = FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 0, 1)))
            .with_period(SubmissionPeriod::new("T1", "PC1").with_assessors(1))
            .with_faculty(Faculty::new("F1"))
            .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F9"))
            .with_room(Room::new("R1", 3))
            .with_session(PresentationSession::new("D1", day).with_room("R1"))
            .with_session(PresentationSession::new("D2", day).with_room("R1"))
            .with_talk(Talk::new("K1", "S1", "P1", "T1"))
            .with_assessment(
                Assessment::new("AS")
                    .with_period("T1")
                    .with_session("D1")
                    .with_session("D2")
                    .with_assessor("F1")
                    .with_talk("K1"),
            );

        let mut base = ScheduleAttempt::new("B", "base", "AS");
        base.slots.push(crate::models::ScheduleSlot::new("B", "D2", "R1").with_talk("K1"));

        let mut attempt = ScheduleAttempt::new("A", "a", "AS").with_base("B");
        solve_and_commit(&facts, &mut attempt, Some(&base), &[], &PackagedMilp).unwrap();
        assert_eq!(attempt.slot_of_talk("K1").unwrap().session_id, "D2");
        assert!(attempt.meta.is_solved());
    }
}
