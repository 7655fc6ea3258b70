//! Commits a schedule verdict to an attempt.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::builder::ScheduleModel;
use crate::error::EngineResult;
use crate::models::{ScheduleAttempt, ScheduleSlot, SlotSnapshot};
use crate::solver::SolverVerdict;

/// Replaces the attempt's slots with those decoded from `verdict`.
///
/// Slot shadows are carried over by slot id. A slot that held a shadow but
/// is vacated by the new verdict is kept empty so that it can be reverted.
#[instrument(skip_all, fields(attempt = %attempt.id(), outcome = ?verdict.outcome))]
pub fn materialize(
    attempt: &mut ScheduleAttempt,
    model: &ScheduleModel,
    verdict: &SolverVerdict,
    construct_time: Duration,
) -> EngineResult<()> {
    if !verdict.outcome.is_usable() {
        warn!("solver returned no usable schedule");
        attempt.slots.clear();
        attempt.meta.record_verdict(verdict, construct_time);
        attempt.meta.score = None;
        return Ok(());
    }

    let mut slots = model.decode(verdict)?;

    let mut shadows: BTreeMap<String, (String, String, SlotSnapshot)> = attempt
        .slots
        .iter()
        .filter_map(|s| {
            s.original
                .clone()
                .map(|o| (s.id.clone(), (s.session_id.clone(), s.room_id.clone(), o)))
        })
        .collect();
    for slot in &mut slots {
        match shadows.remove(&slot.id) {
            Some((_, _, orig)) => slot.original = Some(orig),
            None => slot.ensure_original(),
        }
    }
    for (_, (session_id, room_id, orig)) in shadows {
        let mut vacated = ScheduleSlot::new(attempt.id(), session_id, room_id);
        vacated.original = Some(orig);
        slots.push(vacated);
    }

    attempt.slots = slots;
    attempt.meta.record_verdict(verdict, construct_time);
    attempt.meta.score = verdict.objective;
    info!(
        occupied = attempt.occupied_slots(),
        score = ?attempt.meta.score,
        "schedule committed"
    );
    Ok(())
}

/// Restores every slot from its shadow. Returns how many changed.
pub fn revert(attempt: &mut ScheduleAttempt) -> usize {
    let mut changed = 0;
    for slot in &mut attempt.slots {
        let before = slot.snapshot();
        if slot.revert() && slot.snapshot() != before {
            changed += 1;
        }
    }
    if changed > 0 {
        attempt.meta.touch();
        info!(attempt = %attempt.id(), changed, "schedule reverted");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Assessment, CatsValues, EnrollmentRecord, Faculty, FactSnapshot, PresentationSession,
        ProjectClass, ProjectFacts, Room, SubmissionPeriod, Talk,
    };
    use crate::scheduling::ScheduleProblemBuilder;
    use crate::solver::{run, PackagedMilp, SolverOutcome};
    use chrono::NaiveDate;

    fn facts() -> FactSnapshot {
        let day = NaiveDate::from_ymd_opt(2025, 5, 12).unwrap();
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 0, 1)))
            .with_period(SubmissionPeriod::new("T1", "PC1").with_assessors(1))
            .with_faculty(Faculty::new("F1"))
            .with_faculty(Faculty::new("F2"))
            .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
            .with_enrollment(EnrollmentRecord::new("F2", "PC1"))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1"))
            .with_room(Room::new("R1", 3))
            .with_session(PresentationSession::new("D1", day).with_room("R1"))
            .with_talk(Talk::new("K1", "S1", "P1", "T1").with_supervisor("F1"))
            .with_assessment(
                Assessment::new("AS")
                    .with_period("T1")
                    .with_session("D1")
                    .with_assessor("F1")
                    .with_assessor("F2")
                    .with_talk("K1"),
            )
    }

    #[test]
    fn test_commit_and_revert() {
        let facts = facts();
        let mut attempt = ScheduleAttempt::new("A", "a", "AS");
        let model = ScheduleProblemBuilder::new(&facts, &attempt).build().unwrap();
        let verdict = run(&PackagedMilp, &model.problem);
        materialize(&mut attempt, &model, &verdict, Duration::from_millis(1)).unwrap();

        assert_eq!(attempt.meta.outcome, Some(SolverOutcome::Optimal));
        assert_eq!(attempt.slots.len(), 1);
        let slot = &attempt.slots[0];
        assert!(slot.talks.contains("K1"));
        assert!(slot.assessors.contains("F2"));
        assert_eq!(slot.original, Some(slot.snapshot()));

        attempt.slots[0].assessors.clear();
        attempt.slots[0].talks.clear();
        assert_eq!(revert(&mut attempt), 1);
        assert!(attempt.slots[0].talks.contains("K1"));
    }

    #[test]
    fn test_vacated_slot_keeps_its_shadow() {
        let facts = facts();
        let mut attempt = ScheduleAttempt::new("A", "a", "AS");
        let mut old = ScheduleSlot::new("A", "D0", "R9").with_talk("K1");
        old.ensure_original();
        attempt.slots.push(old);

        let model = ScheduleProblemBuilder::new(&facts, &attempt).build().unwrap();
        let verdict = run(&PackagedMilp, &model.problem);
        materialize(&mut attempt, &model, &verdict, Duration::ZERO).unwrap();

        assert_eq!(attempt.slots.len(), 2);
        assert_eq!(attempt.occupied_slots(), 1);
        let vacated = attempt.slot("D0", "R9").unwrap();
        assert!(vacated.is_empty());
        assert!(vacated.original.as_ref().unwrap().talks.contains("K1"));
    }

    #[test]
    fn test_unusable_verdict_clears_slots() {
        let facts = facts();
        let mut attempt = ScheduleAttempt::new("A", "a", "AS");
        attempt.slots.push(ScheduleSlot::new("A", "D1", "R1").with_talk("K1"));
        let model = ScheduleProblemBuilder::new(&facts, &attempt).build().unwrap();
        let verdict = SolverVerdict::unusable(SolverOutcome::Infeasible, Duration::ZERO);

        materialize(&mut attempt, &model, &verdict, Duration::ZERO).unwrap();
        assert!(attempt.meta.finished);
        assert!(attempt.slots.is_empty());
    }
}
