//! Presentation schedule formulation.
//!
//! Slots are the (session, room) pairs of an assessment. Variables:
//!
//! - `a[t,s]`: talk `t` is given in slot `s`
//! - `b[f,s]`: faculty `f` sits on the panel of slot `s`
//! - `u[s]`: slot `s` is used
//!
//! Unavailable (talk, session) and (assessor, session) pairs get no
//! variable at all. The objective is minimised.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Assessment, AssessorPoolPolicy, Availability, CatsLimits, FactSnapshot, ScheduleAttempt,
    ScheduleSlot, Talk, WorkloadCategory,
};
use crate::solver::{Comparison, LinearProblem, Sense, SolverVerdict, VarId};
use crate::workload::{effective_limits, WorkloadLedger, WorkloadScope};

const BIG: f64 = 1.0e6;

#[derive(Debug, Clone)]
struct SlotPlan {
    session_id: String,
    room_id: String,
    talks: Vec<(String, VarId)>,
    assessors: Vec<(String, VarId)>,
}

/// A built schedule problem plus what is needed to decode its solution.
#[derive(Debug, Clone)]
pub struct ScheduleModel {
    pub problem: LinearProblem,
    attempt_id: String,
    talk_ids: Vec<String>,
    slots: Vec<SlotPlan>,
}

impl ScheduleModel {
    /// Number of candidate slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Variable `a[t,s]`, if the talk may go in that slot.
    pub fn placement_var(&self, talk_id: &str, session_id: &str, room_id: &str) -> Option<VarId> {
        self.slots
            .iter()
            .find(|s| s.session_id == session_id && s.room_id == room_id)?
            .talks
            .iter()
            .find(|(t, _)| t == talk_id)
            .map(|(_, v)| *v)
    }

    /// Turns a usable verdict into occupied slots.
    pub fn decode(&self, verdict: &SolverVerdict) -> EngineResult<Vec<ScheduleSlot>> {
        if !verdict.outcome.is_usable() {
            return Err(EngineError::UnusableVerdict(format!(
                "outcome {:?} has no solution",
                verdict.outcome
            )));
        }

        let mut placed: BTreeMap<&str, usize> = BTreeMap::new();
        let mut slots = Vec::new();
        for plan in &self.slots {
            let mut slot = ScheduleSlot::new(&self.attempt_id, &plan.session_id, &plan.room_id);
            for (talk, var) in &plan.talks {
                if verdict.is_set(*var) {
                    slot.talks.insert(talk.clone());
                    *placed.entry(talk.as_str()).or_insert(0) += 1;
                }
            }
            if slot.talks.is_empty() {
                continue;
            }
            for (f, var) in &plan.assessors {
                if verdict.is_set(*var) {
                    slot.assessors.insert(f.clone());
                }
            }
            slots.push(slot);
        }

        for talk in &self.talk_ids {
            let n = placed.get(talk.as_str()).copied().unwrap_or(0);
            if n != 1 {
                return Err(EngineError::UnusableVerdict(format!(
                    "talk '{talk}' placed in {n} slots"
                )));
            }
        }
        Ok(slots)
    }
}

/// Builds a [`ScheduleModel`] for one assessment.
pub struct ScheduleProblemBuilder<'a> {
    facts: &'a FactSnapshot,
    attempt: &'a ScheduleAttempt,
    base: Option<&'a ScheduleAttempt>,
    included: Vec<&'a ScheduleAttempt>,
}

impl<'a> ScheduleProblemBuilder<'a> {
    pub fn new(facts: &'a FactSnapshot, attempt: &'a ScheduleAttempt) -> Self {
        Self {
            facts,
            attempt,
            base: None,
            included: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: &'a ScheduleAttempt) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_included(mut self, included: impl IntoIterator<Item = &'a ScheduleAttempt>) -> Self {
        self.included.extend(included);
        self
    }

    /// Panel members enrolled for presentations in one of the assessment's classes.
    fn eligible_assessors(&self, assessment: &'a Assessment) -> Vec<&'a str> {
        let pclasses: BTreeSet<&str> = assessment
            .period_ids
            .iter()
            .filter_map(|p| self.facts.period(p))
            .map(|p| p.pclass_id.as_str())
            .collect();
        assessment
            .assessor_ids
            .iter()
            .map(String::as_str)
            .filter(|f| {
                pclasses
                    .iter()
                    .any(|pc| self.facts.is_enrolled(f, pc, WorkloadCategory::Presentation))
            })
            .collect()
    }

    /// Faculty who may not assess `talk`: its supervisors and the project owner.
    fn conflicted(&self, talk: &Talk) -> BTreeSet<String> {
        let mut out = talk.supervisor_ids.clone();
        if let Some(owner) = self.facts.project(&talk.project_id).and_then(|p| p.owner_id.clone()) {
            out.insert(owner);
        }
        out
    }

    #[instrument(skip_all, fields(attempt = %self.attempt.id(), assessment = %self.attempt.assessment_id))]
    pub fn build(&self) -> EngineResult<ScheduleModel> {
        let config = &self.attempt.config;
        config.validate()?;
        let assessment = self.facts.require_assessment(&self.attempt.assessment_id)?;
        let panel = self.facts.required_assessors(&assessment.id);
        let availability = &self.facts.availability;
        let assessors = self.eligible_assessors(assessment);

        let talks: Vec<&Talk> = assessment
            .talk_ids
            .iter()
            .filter_map(|id| {
                let talk = self.facts.talk(id);
                if talk.is_none() {
                    warn!(talk = %id, "talk listed by assessment is unknown");
                }
                talk
            })
            .collect();

        let mut problem = LinearProblem::new(format!("schedule-{}", self.attempt.id()), Sense::Minimize);

        // base placements as (session, room, talk)
        let mut base_talks: BTreeSet<(&str, &str, &str)> = BTreeSet::new();
        if let Some(base) = self.base {
            for slot in &base.slots {
                for t in &slot.talks {
                    base_talks.insert((slot.session_id.as_str(), slot.room_id.as_str(), t.as_str()));
                }
            }
        }

        let mut plans = Vec::new();
        for session_id in &assessment.session_ids {
            let Some(session) = self.facts.session(session_id) else {
                warn!(session = %session_id, "session listed by assessment is unknown");
                continue;
            };
            for room_id in &session.room_ids {
                let Some(room) = self.facts.room(room_id) else { continue };
                let seats = room.capacity.saturating_sub(panel).min(config.max_group_size);
                if seats == 0 {
                    debug!(session = %session_id, room = %room_id, "room too small for a panel");
                    continue;
                }

                let used = problem.add_binary(format!("u[{session_id},{room_id}]"));
                problem.add_objective(used, config.slot_cost);
                let mut plan = SlotPlan {
                    session_id: session_id.clone(),
                    room_id: room_id.clone(),
                    talks: Vec::new(),
                    assessors: Vec::new(),
                };

                for talk in &talks {
                    let avail = availability.submitter(&talk.id, session_id);
                    if avail == Availability::Unavailable {
                        continue;
                    }
                    let a = problem.add_binary(format!("a[{},{session_id},{room_id}]", talk.id));
                    if avail == Availability::IfNeeded {
                        problem.add_objective(a, config.if_needed_cost);
                    }
                    if base_talks.contains(&(session_id.as_str(), room_id.as_str(), talk.id.as_str())) {
                        problem.add_objective(a, -config.base_bias);
                    }
                    plan.talks.push((talk.id.clone(), a));
                }
                for f in &assessors {
                    let avail = availability.faculty(f, session_id);
                    if avail == Availability::Unavailable {
                        continue;
                    }
                    let b = problem.add_binary(format!("b[{f},{session_id},{room_id}]"));
                    if avail == Availability::IfNeeded {
                        problem.add_objective(b, config.if_needed_cost);
                    }
                    plan.assessors.push((f.to_string(), b));
                }

                let slot = format!("{session_id},{room_id}");
                problem.add_constraint(
                    format!("seats[{slot}]"),
                    plan.talks.iter().map(|(_, v)| (*v, 1.0)).chain([(used, -(seats as f64))]),
                    Comparison::Le,
                    0.0,
                );
                problem.add_constraint(
                    format!("occupied[{slot}]"),
                    plan.talks.iter().map(|(_, v)| (*v, 1.0)).chain([(used, -1.0)]),
                    Comparison::Ge,
                    0.0,
                );
                problem.add_constraint(
                    format!("panel[{slot}]"),
                    plan.assessors
                        .iter()
                        .map(|(_, v)| (*v, 1.0))
                        .chain([(used, -(panel as f64))]),
                    Comparison::Eq,
                    0.0,
                );

                self.add_talk_panel_rules(&mut problem, &plan, &talks, config.pool_policy);
                plans.push(plan);
            }
        }

        for talk in &talks {
            let options: Vec<(VarId, f64)> = plans
                .iter()
                .flat_map(|p| p.talks.iter().filter(|(t, _)| *t == talk.id).map(|(_, v)| (*v, 1.0)))
                .collect();
            if options.is_empty() {
                return Err(EngineError::InvalidConfiguration(format!(
                    "talk '{}' has no available slot",
                    talk.id
                )));
            }
            problem.add_constraint(format!("place[{}]", talk.id), options, Comparison::Eq, 1.0);
        }

        if !config.ignore_coscheduling {
            add_clash_rules(&mut problem, self.facts, &plans, &talks);
        }

        self.add_assessor_rules(&mut problem, &plans, &assessors, assessment);

        debug!(
            slots = plans.len(),
            vars = problem.num_vars(),
            constraints = problem.num_constraints(),
            "schedule model built"
        );
        Ok(ScheduleModel {
            problem,
            attempt_id: self.attempt.id().to_string(),
            talk_ids: talks.iter().map(|t| t.id.clone()).collect(),
            slots: plans,
        })
    }

    /// Supervisor exclusion and hard pool policies within one slot.
    fn add_talk_panel_rules(
        &self,
        problem: &mut LinearProblem,
        plan: &SlotPlan,
        talks: &[&Talk],
        policy: AssessorPoolPolicy,
    ) {
        let slot = format!("{},{}", plan.session_id, plan.room_id);
        for (talk_id, a) in &plan.talks {
            let Some(talk) = talks.iter().find(|t| &t.id == talk_id) else { continue };
            let conflicted = self.conflicted(talk);
            for (f, b) in plan.assessors.iter().filter(|(f, _)| conflicted.contains(f)) {
                problem.add_constraint(
                    format!("own-student[{talk_id},{f},{slot}]"),
                    [(*a, 1.0), (*b, 1.0)],
                    Comparison::Le,
                    1.0,
                );
            }

            let Some(pool) = self.facts.project(&talk.project_id).and_then(|p| p.assessor_pool()) else {
                continue;
            };
            match policy {
                AssessorPoolPolicy::AtLeastOneInPool => {
                    problem.add_constraint(
                        format!("pool-one[{talk_id},{slot}]"),
                        plan.assessors
                            .iter()
                            .filter(|(f, _)| pool.contains(f))
                            .map(|(_, b)| (*b, -1.0))
                            .chain([(*a, 1.0)]),
                        Comparison::Le,
                        0.0,
                    );
                }
                AssessorPoolPolicy::AllInPool => {
                    for (f, b) in plan.assessors.iter().filter(|(f, _)| !pool.contains(f)) {
                        problem.add_constraint(
                            format!("pool-all[{talk_id},{f},{slot}]"),
                            [(*a, 1.0), (*b, 1.0)],
                            Comparison::Le,
                            1.0,
                        );
                    }
                }
                AssessorPoolPolicy::AtLeastOneInResearchGroup | AssessorPoolPolicy::AllInResearchGroup => {}
            }
        }
    }

    /// Session multiplicity, assignment and CATS limits, levelling.
    fn add_assessor_rules(
        &self,
        problem: &mut LinearProblem,
        plans: &[SlotPlan],
        assessors: &[&str],
        assessment: &Assessment,
    ) {
        let config = &self.attempt.config;
        let ledger = WorkloadLedger::new(self.facts).with_schedules(self.included.iter().copied());
        let attempt_limits = CatsLimits {
            presentation: config.assessor_cats_limit,
            ..CatsLimits::default()
        };
        let overrides = BTreeMap::new();

        let mut loads: Vec<(&str, Vec<(VarId, f64)>)> = Vec::new();
        for f in assessors {
            let mine: Vec<(&SlotPlan, VarId)> = plans
                .iter()
                .filter_map(|p| p.assessors.iter().find(|(g, _)| g.as_str() == *f).map(|(_, b)| (p, *b)))
                .collect();
            if mine.is_empty() {
                continue;
            }

            let mut by_session: BTreeMap<&str, Vec<VarId>> = BTreeMap::new();
            for (plan, b) in &mine {
                by_session.entry(plan.session_id.as_str()).or_default().push(*b);
            }
            for (session_id, vars) in by_session {
                if vars.len() > config.assessor_multiplicity_per_session as usize {
                    problem.add_constraint(
                        format!("multiplicity[{f},{session_id}]"),
                        vars.into_iter().map(|v| (v, 1.0)),
                        Comparison::Le,
                        config.assessor_multiplicity_per_session as f64,
                    );
                }
            }

            let count: Vec<(VarId, f64)> = mine.iter().map(|(_, b)| (*b, 1.0)).collect();
            if let Some(limit) = config.assessor_assigned_limit {
                problem.add_constraint(format!("assigned[{f}]"), count.iter().copied(), Comparison::Le, limit as f64);
            }

            let limits = effective_limits(self.facts, &attempt_limits, &overrides, f, None, false);
            if let Some(limit) = limits.hard.presentation {
                let used = ledger.totals(f, &WorkloadScope::All).presentation;
                problem.add_constraint(
                    format!("cats[{f}]"),
                    mine.iter().map(|(_, b)| (*b, assessment.cats_per_slot as f64)),
                    Comparison::Le,
                    limit.saturating_sub(used) as f64,
                );
            }
            loads.push((*f, count));
        }

        if config.levelling_tension > 0.0 && loads.len() >= 2 {
            let hi = problem.add_continuous("max[panel]", 0.0, BIG);
            let lo = problem.add_continuous("min[panel]", 0.0, BIG);
            problem.add_objective(hi, config.levelling_tension);
            problem.add_objective(lo, -config.levelling_tension);
            for (f, row) in &loads {
                problem.add_constraint(
                    format!("max[panel,{f}]"),
                    row.iter().copied().chain([(hi, -1.0)]),
                    Comparison::Le,
                    0.0,
                );
                problem.add_constraint(
                    format!("min[panel,{f}]"),
                    row.iter().copied().chain([(lo, -1.0)]),
                    Comparison::Ge,
                    0.0,
                );
            }
        }
    }
}

/// Talks of a `dont_clash_presentations` project never share a slot.
fn add_clash_rules(problem: &mut LinearProblem, facts: &FactSnapshot, plans: &[SlotPlan], talks: &[&Talk]) {
    let mut by_project: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for talk in talks {
        let clashes = facts
            .project(&talk.project_id)
            .map(|p| p.dont_clash_presentations)
            .unwrap_or(false);
        if clashes {
            by_project.entry(talk.project_id.as_str()).or_default().push(talk.id.as_str());
        }
    }
    for (project_id, group) in by_project {
        if group.len() < 2 {
            continue;
        }
        for plan in plans {
            let vars: Vec<(VarId, f64)> = plan
                .talks
                .iter()
                .filter(|(t, _)| group.contains(&t.as_str()))
                .map(|(_, v)| (*v, 1.0))
                .collect();
            if vars.len() > 1 {
                problem.add_constraint(
                    format!("clash[{project_id},{},{}]", plan.session_id, plan.room_id),
                    vars,
                    Comparison::Le,
                    1.0,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::models::{
        CatsValues, EnrollmentRecord, Faculty, PresentationSession, ProjectClass, ProjectFacts,
        Room, SubmissionPeriod,
    };
    use crate::solver::{run, PackagedMilp, SolverOutcome};
    use chrono::NaiveDate;

    /// One assessment, two sessions with one room each, three faculty.
    fn sample_facts() -> FactSnapshot {
        let day = NaiveDate::from_ymd_opt(2025, 5, 12).unwrap();
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 0, 1)))
            .with_period(SubmissionPeriod::new("T1", "PC1").with_assessors(1))
            .with_faculty(Faculty::new("F1"))
            .with_faculty(Faculty::new("F2"))
            .with_faculty(Faculty::new("F3"))
            .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
            .with_enrollment(EnrollmentRecord::new("F2", "PC1"))
            .with_enrollment(EnrollmentRecord::new("F3", "PC1"))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1"))
            .with_project(ProjectFacts::new("P2", "PC1").with_owner("F2"))
            .with_room(Room::new("R1", 4))
            .with_session(PresentationSession::new("D1", day).with_room("R1"))
            .with_session(PresentationSession::new("D2", day.succ_opt().unwrap()).with_room("R1"))
            .with_talk(Talk::new("K1", "S1", "P1", "T1").with_supervisor("F1"))
            .with_talk(Talk::new("K2", "S2", "P1", "T1").with_supervisor("F1"))
            .with_talk(Talk::new("K3", "S3", "P2", "T1").with_supervisor("F2"))
            .with_assessment(
                Assessment::new("AS")
                    .with_period("T1")
                    .with_session("D1")
                    .with_session("D2")
                    .with_assessor("F1")
                    .with_assessor("F2")
                    .with_assessor("F3"),
            )
    }

    fn with_all_talks(facts: FactSnapshot) -> FactSnapshot {
        let assessment = facts
            .assessment("AS")
            .unwrap()
            .clone()
            .with_talk("K1")
            .with_talk("K2")
            .with_talk("K3");
        facts.with_assessment(assessment)
    }

    fn solve(facts: &FactSnapshot, attempt: &ScheduleAttempt) -> Vec<ScheduleSlot> {
        let model = ScheduleProblemBuilder::new(facts, attempt).build().unwrap();
        let verdict = run(&PackagedMilp, &model.problem);
        assert_eq!(verdict.outcome, SolverOutcome::Optimal);
        model.decode(&verdict).unwrap()
    }

    #[test]
    fn test_every_talk_placed_once_with_full_panel() {
        let facts = with_all_talks(sample_facts());
        let attempt = ScheduleAttempt::new("A", "a", "AS");
        let slots = solve(&facts, &attempt);

        let placed: Vec<&String> = slots.iter().flat_map(|s| s.talks.iter()).collect();
        assert_eq!(placed.len(), 3);
        for slot in &slots {
            assert_eq!(slot.assessors.len(), 1);
            assert!(slot.talks.len() <= 3);
        }
    }

    #[test]
    fn test_supervisor_never_assesses_own_talk() {
        let facts = with_all_talks(sample_facts());
        let attempt = ScheduleAttempt::new("A", "a", "AS");
        for slot in solve(&facts, &attempt) {
            for talk_id in &slot.talks {
                let talk = facts.talk(talk_id).unwrap();
                assert!(talk.supervisor_ids.is_disjoint(&slot.assessors));
            }
        }
    }

    #[test]
    fn test_clash_projects_split_unless_ignored() {
        let facts = with_all_talks(sample_facts())
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1").with_dont_clash());
        let attempt = ScheduleAttempt::new("A", "a", "AS");
        let slots = solve(&facts, &attempt);
        for slot in &slots {
            assert!(!(slot.talks.contains("K1") && slot.talks.contains("K2")));
        }

        let relaxed = ScheduleAttempt::new("B", "b", "AS").with_config(ScheduleConfig {
            ignore_coscheduling: true,
            levelling_tension: 0.0,
            ..ScheduleConfig::default()
        });
        let model = ScheduleProblemBuilder::new(&facts, &relaxed).build().unwrap();
        assert!(model.problem.lookup("clash[P1,D1,R1]").is_none());
        assert!(model.problem.constraints.iter().all(|c| !c.name.starts_with("clash")));
    }

    #[test]
    fn test_unavailable_submitter_excluded() {
        let facts = with_all_talks(sample_facts()).with_submitter_availability("K1", "D1", Availability::Unavailable);
        let attempt = ScheduleAttempt::new("A", "a", "AS");
        let model = ScheduleProblemBuilder::new(&facts, &attempt).build().unwrap();
        assert!(model.placement_var("K1", "D1", "R1").is_none());
        assert!(model.placement_var("K1", "D2", "R1").is_some());

        let verdict = run(&PackagedMilp, &model.problem);
        let slots = model.decode(&verdict).unwrap();
        let slot = slots.iter().find(|s| s.talks.contains("K1")).unwrap();
        assert_eq!(slot.session_id, "D2");
    }

    #[test]
    fn test_talk_without_slot_fails_fast() {
        let facts = with_all_talks(sample_facts())
            .with_submitter_availability("K3", "D1", Availability::Unavailable)
            .with_submitter_availability("K3", "D2", Availability::Unavailable);
        let attempt = ScheduleAttempt::new("A", "a", "AS");
        let err = ScheduleProblemBuilder::new(&facts, &attempt).build().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_room_without_seats_leaves_talks_unplaceable() {
        let facts = with_all_talks(sample_facts()).with_room(Room::new("R1", 1));
        let attempt = ScheduleAttempt::new("A", "a", "AS");
        let err = ScheduleProblemBuilder::new(&facts, &attempt).build().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_assigned_limit_spreads_panels() {
        let facts = with_all_talks(sample_facts());
        let attempt = ScheduleAttempt::new("A", "a", "AS").with_config(ScheduleConfig {
            max_group_size: 2,
            assessor_assigned_limit: Some(1),
            ..ScheduleConfig::default()
        });
        let slots = solve(&facts, &attempt);
        assert_eq!(slots.len(), 2);
        let panel: BTreeSet<&String> = slots.iter().flat_map(|s| s.assessors.iter()).collect();
        assert_eq!(panel.len(), 2);
    }
}
