//! Workload (CATS) accounting.
//!
//! One set of functions computes per-faculty CATS totals from committed
//! records and slots. The matching and scheduling builders use them for the
//! baseline workload of included attempts and the validators use them for
//! audits, so both sides always agree on what a faculty member carries.
//!
//! Missing data never fails: unknown projects, periods or attempts simply
//! contribute nothing.
//!
//! # Limit tiers
//! 1. attempt-wide ceiling (configuration)
//! 2. personal ceiling ([`Faculty::cats_limits`](crate::models::Faculty))
//! 3. per-class enrollment ceiling
//! 4. per-faculty override in the attempt configuration
//!
//! The effective ceiling is the tightest applicable tier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    CatsLimits, FactSnapshot, MatchingAttempt, MatchingRecord, RoleKind, ScheduleAttempt,
    ScheduleSlot, WorkloadCategory,
};

/// CATS carried by one faculty member, per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatsTotals {
    pub supervising: u32,
    pub marking: u32,
    pub moderating: u32,
    pub presentation: u32,
}

impl CatsTotals {
    pub fn get(&self, category: WorkloadCategory) -> u32 {
        match category {
            WorkloadCategory::Supervision => self.supervising,
            WorkloadCategory::Marking => self.marking,
            WorkloadCategory::Moderation => self.moderating,
            WorkloadCategory::Presentation => self.presentation,
        }
    }

    pub fn add_to(&mut self, category: WorkloadCategory, value: u32) {
        match category {
            WorkloadCategory::Supervision => self.supervising += value,
            WorkloadCategory::Marking => self.marking += value,
            WorkloadCategory::Moderation => self.moderating += value,
            WorkloadCategory::Presentation => self.presentation += value,
        }
    }

    pub fn total(&self) -> u32 {
        self.supervising + self.marking + self.moderating + self.presentation
    }

    /// Categories whose total exceeds `limits`, with (total, limit).
    pub fn excess_over(&self, limits: &CatsLimits) -> Vec<(WorkloadCategory, u32, u32)> {
        WorkloadCategory::ALL
            .iter()
            .filter_map(|&c| {
                let limit = limits.get(c)?;
                let total = self.get(c);
                (total > limit).then_some((c, total, limit))
            })
            .collect()
    }
}

impl Add for CatsTotals {
    type Output = CatsTotals;

    fn add(self, rhs: CatsTotals) -> CatsTotals {
        CatsTotals {
            supervising: self.supervising + rhs.supervising,
            marking: self.marking + rhs.marking,
            moderating: self.moderating + rhs.moderating,
            presentation: self.presentation + rhs.presentation,
        }
    }
}

impl AddAssign for CatsTotals {
    fn add_assign(&mut self, rhs: CatsTotals) {
        *self = *self + rhs;
    }
}

/// Which records a total covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadScope {
    All,
    ProjectClass(String),
    Period(String),
    Assessment(String),
}

impl WorkloadScope {
    /// Builds a scope from mutually exclusive parameters.
    ///
    /// Exactly one of the four must be given.
    pub fn from_parts(
        pclass_id: Option<&str>,
        period_id: Option<&str>,
        assessment_id: Option<&str>,
        all: bool,
    ) -> EngineResult<Self> {
        let given = [pclass_id.is_some(), period_id.is_some(), assessment_id.is_some(), all]
            .iter()
            .filter(|b| **b)
            .count();
        if given != 1 {
            return Err(EngineError::InvalidConfiguration(format!(
                "workload scope needs exactly one of pclass, period, assessment or all; got {given}"
            )));
        }
        Ok(match (pclass_id, period_id, assessment_id) {
            (Some(p), _, _) => WorkloadScope::ProjectClass(p.to_string()),
            (_, Some(p), _) => WorkloadScope::Period(p.to_string()),
            (_, _, Some(a)) => WorkloadScope::Assessment(a.to_string()),
            _ => WorkloadScope::All,
        })
    }

    /// Whether a record of `period_id` falls inside the scope.
    pub fn admits_period(&self, facts: &FactSnapshot, period_id: &str) -> bool {
        match self {
            WorkloadScope::All => true,
            WorkloadScope::ProjectClass(pclass) => facts
                .period(period_id)
                .map(|p| &p.pclass_id == pclass)
                .unwrap_or(false),
            WorkloadScope::Period(p) => p == period_id,
            WorkloadScope::Assessment(a) => facts
                .assessment(a)
                .map(|a| a.period_ids.contains(period_id))
                .unwrap_or(false),
        }
    }
}

/// CATS a single record gives `faculty_id`.
pub fn record_contribution(facts: &FactSnapshot, record: &MatchingRecord, faculty_id: &str) -> CatsTotals {
    let mut totals = CatsTotals::default();
    let kinds = record.roles_of(faculty_id);
    if kinds.is_empty() {
        return totals;
    }
    let Some(period) = facts.period(&record.period_id) else {
        return totals;
    };
    let cats = facts.project_cats(&record.project_id, &period.pclass_id);

    // both supervising roles on one record count once
    let mut supervising = false;
    for kind in kinds {
        match kind {
            RoleKind::Supervisor | RoleKind::ResponsibleSupervisor => supervising = true,
            RoleKind::Marker => totals.marking += cats.marking,
            RoleKind::Moderator => totals.moderating += cats.moderation,
        }
    }
    if supervising {
        totals.supervising += cats.supervision;
    }
    totals
}

/// Totals over `records` within `scope`.
pub fn matching_totals<'a>(
    facts: &FactSnapshot,
    records: impl IntoIterator<Item = &'a MatchingRecord>,
    faculty_id: &str,
    scope: &WorkloadScope,
) -> CatsTotals {
    records
        .into_iter()
        .filter(|r| scope.admits_period(facts, &r.period_id))
        .fold(CatsTotals::default(), |acc, r| {
            acc + record_contribution(facts, r, faculty_id)
        })
}

/// Presentation totals of one schedule attempt within `scope`.
pub fn schedule_totals(
    facts: &FactSnapshot,
    attempt: &ScheduleAttempt,
    faculty_id: &str,
    scope: &WorkloadScope,
) -> CatsTotals {
    let Some(assessment) = facts.assessment(&attempt.assessment_id) else {
        return CatsTotals::default();
    };
    let in_scope = |slot: &ScheduleSlot| match scope {
        WorkloadScope::All => true,
        WorkloadScope::Assessment(a) => a == &attempt.assessment_id,
        _ => slot.talks.iter().any(|t| {
            facts
                .talk(t)
                .map(|talk| scope.admits_period(facts, &talk.period_id))
                .unwrap_or(false)
        }),
    };
    let slots = attempt
        .slots
        .iter()
        .filter(|s| !s.is_empty() && s.assessors.contains(faculty_id))
        .filter(|s| in_scope(*s))
        .count() as u32;

    CatsTotals {
        presentation: slots * assessment.cats_per_slot,
        ..CatsTotals::default()
    }
}

/// Aggregates workload over a set of committed attempts.
///
/// Built per audited attempt from the attempt itself plus the attempts it
/// includes, or from the included attempts alone to get a solve baseline.
#[derive(Debug, Clone)]
pub struct WorkloadLedger<'a> {
    facts: &'a FactSnapshot,
    matchings: Vec<&'a MatchingAttempt>,
    schedules: Vec<&'a ScheduleAttempt>,
}

impl<'a> WorkloadLedger<'a> {
    pub fn new(facts: &'a FactSnapshot) -> Self {
        Self {
            facts,
            matchings: Vec::new(),
            schedules: Vec::new(),
        }
    }

    pub fn with_matching(mut self, attempt: &'a MatchingAttempt) -> Self {
        self.matchings.push(attempt);
        self
    }

    pub fn with_matchings(mut self, attempts: impl IntoIterator<Item = &'a MatchingAttempt>) -> Self {
        self.matchings.extend(attempts);
        self
    }

    pub fn with_schedule(mut self, attempt: &'a ScheduleAttempt) -> Self {
        self.schedules.push(attempt);
        self
    }

    pub fn with_schedules(mut self, attempts: impl IntoIterator<Item = &'a ScheduleAttempt>) -> Self {
        self.schedules.extend(attempts);
        self
    }

    /// Totals for `faculty_id` across every attempt in the ledger.
    ///
    /// Unfinished attempts contribute nothing.
    pub fn totals(&self, faculty_id: &str, scope: &WorkloadScope) -> CatsTotals {
        let matching = self
            .matchings
            .iter()
            .filter(|a| a.meta.finished)
            .fold(CatsTotals::default(), |acc, a| {
                acc + matching_totals(self.facts, &a.records, faculty_id, scope)
            });
        let presentation = self
            .schedules
            .iter()
            .filter(|a| a.meta.finished)
            .fold(CatsTotals::default(), |acc, a| {
                acc + schedule_totals(self.facts, a, faculty_id, scope)
            });
        matching + presentation
    }
}

/// Hard and soft ceilings for one faculty member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectiveLimits {
    /// Must not be exceeded.
    pub hard: CatsLimits,
    /// May be exceeded at a penalty.
    pub soft: CatsLimits,
}

/// Effective ceilings for `faculty_id`, optionally within one class.
///
/// Without a class, the enrollment tier does not apply. With
/// `relax_per_faculty`, tiers 2 and 3 move from `hard` to `soft`.
pub fn effective_limits(
    facts: &FactSnapshot,
    attempt_limits: &CatsLimits,
    overrides: &BTreeMap<String, CatsLimits>,
    faculty_id: &str,
    pclass_id: Option<&str>,
    relax_per_faculty: bool,
) -> EffectiveLimits {
    let personal = facts
        .faculty_member(faculty_id)
        .map(|f| f.cats_limits)
        .unwrap_or_default();
    let enrollment = pclass_id
        .and_then(|pc| facts.enrollment(faculty_id, pc))
        .map(|e| e.custom_limits)
        .unwrap_or_default();
    let override_limits = overrides.get(faculty_id).copied().unwrap_or_default();

    let attempt_tier = attempt_limits.tightest(&override_limits);
    let faculty_tier = personal.tightest(&enrollment);

    if relax_per_faculty {
        EffectiveLimits {
            hard: attempt_tier,
            soft: faculty_tier,
        }
    } else {
        EffectiveLimits {
            hard: attempt_tier.tightest(&faculty_tier),
            soft: CatsLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Assessment, CatsValues, EnrollmentRecord, Faculty, ProjectClass, ProjectFacts,
        SubmissionPeriod, Talk,
    };

    fn facts() -> FactSnapshot {
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 1, 0)))
            .with_pclass(ProjectClass::new("PC2", CatsValues::new(6, 2, 1, 0)))
            .with_period(SubmissionPeriod::new("T1", "PC1"))
            .with_period(SubmissionPeriod::new("U1", "PC2"))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1"))
            .with_project(
                ProjectFacts::new("P2", "PC2")
                    .with_owner("F1")
                    .with_cats(CatsValues::new(20, 4, 2, 0)),
            )
            .with_faculty(Faculty::new("F1").with_limits(CatsLimits::default().with_supervision(30)))
            .with_enrollment(
                EnrollmentRecord::new("F1", "PC1")
                    .with_custom_limits(CatsLimits::default().with_supervision(15)),
            )
            .with_talk(Talk::new("TK1", "S1", "P1", "T1"))
            .with_talk(Talk::new("TK2", "S2", "P2", "U1"))
            .with_assessment(
                Assessment::new("AS1")
                    .with_period("T1")
                    .with_period("U1")
                    .with_cats_per_slot(2),
            )
    }

    fn attempt() -> MatchingAttempt {
        let mut a = MatchingAttempt::new("A", "a", 2025);
        a.meta.finished = true;
        a.records = vec![
            MatchingRecord::new("A", "S1", "T1", "P1")
                .with_role("F1", RoleKind::Supervisor)
                .with_role("F2", RoleKind::Marker),
            MatchingRecord::new("A", "S2", "U1", "P2")
                .with_role("F1", RoleKind::Supervisor)
                .with_role("F1", RoleKind::ResponsibleSupervisor)
                .with_role("F2", RoleKind::Moderator),
        ];
        a
    }

    #[test]
    fn test_scope_from_parts() {
        assert_eq!(
            WorkloadScope::from_parts(Some("PC1"), None, None, false).unwrap(),
            WorkloadScope::ProjectClass("PC1".into())
        );
        assert_eq!(
            WorkloadScope::from_parts(None, None, None, true).unwrap(),
            WorkloadScope::All
        );
        assert!(matches!(
            WorkloadScope::from_parts(None, None, None, false),
            Err(EngineError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            WorkloadScope::from_parts(Some("PC1"), Some("T1"), None, false),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_matching_totals_by_scope() {
        let facts = facts();
        let a = attempt();

        let all = matching_totals(&facts, &a.records, "F1", &WorkloadScope::All);
        // P1 class default 10, P2 override 20; double supervising role counted once
        assert_eq!(all.supervising, 30);

        let pc1 = matching_totals(&facts, &a.records, "F1", &WorkloadScope::ProjectClass("PC1".into()));
        assert_eq!(pc1.supervising, 10);

        let f2 = matching_totals(&facts, &a.records, "F2", &WorkloadScope::All);
        assert_eq!(f2.marking, 3);
        assert_eq!(f2.moderating, 2);
        assert_eq!(f2.total(), 5);
    }

    #[test]
    fn test_missing_data_is_zero() {
        let facts = FactSnapshot::new();
        let a = attempt();
        assert_eq!(
            matching_totals(&facts, &a.records, "F1", &WorkloadScope::All),
            CatsTotals::default()
        );
    }

    #[test]
    fn test_ledger_includes_attempts_and_skips_unfinished() {
        let facts = facts();
        let a = attempt();
        let mut b = attempt();
        b.meta.id = "B".into();
        let mut unfinished = attempt();
        unfinished.meta.finished = false;

        let ledger = WorkloadLedger::new(&facts)
            .with_matching(&a)
            .with_matchings([&b, &unfinished]);
        assert_eq!(ledger.totals("F1", &WorkloadScope::All).supervising, 60);
    }

    #[test]
    fn test_schedule_totals() {
        let facts = facts();
        let mut s = ScheduleAttempt::new("SA", "s", "AS1");
        s.meta.finished = true;
        s.slots = vec![
            ScheduleSlot::new("SA", "X", "R1").with_assessor("F1").with_talk("TK1"),
            ScheduleSlot::new("SA", "Y", "R1").with_assessor("F1").with_talk("TK2"),
            // empty slots earn nothing
            ScheduleSlot::new("SA", "Z", "R1").with_assessor("F1"),
        ];

        let all = schedule_totals(&facts, &s, "F1", &WorkloadScope::All);
        assert_eq!(all.presentation, 4);
        let pc1 = schedule_totals(&facts, &s, "F1", &WorkloadScope::ProjectClass("PC1".into()));
        assert_eq!(pc1.presentation, 2);
        let other = schedule_totals(&facts, &s, "F1", &WorkloadScope::Assessment("AS9".into()));
        assert_eq!(other.presentation, 0);
    }

    #[test]
    fn test_effective_limits_tiers() {
        let facts = facts();
        let attempt_limits = CatsLimits::default().with_supervision(40).with_marking(12);
        let mut overrides = BTreeMap::new();
        overrides.insert("F1".to_string(), CatsLimits::default().with_marking(8));

        let global = effective_limits(&facts, &attempt_limits, &overrides, "F1", None, false);
        assert_eq!(global.hard.supervision, Some(30));
        assert_eq!(global.hard.marking, Some(8));
        assert!(global.soft.is_unbounded());

        let in_class = effective_limits(&facts, &attempt_limits, &overrides, "F1", Some("PC1"), false);
        assert_eq!(in_class.hard.supervision, Some(15));

        let relaxed = effective_limits(&facts, &attempt_limits, &overrides, "F1", Some("PC1"), true);
        assert_eq!(relaxed.hard.supervision, Some(40));
        assert_eq!(relaxed.soft.supervision, Some(15));
    }

    #[test]
    fn test_excess_over() {
        let totals = CatsTotals {
            supervising: 25,
            marking: 5,
            ..CatsTotals::default()
        };
        let limits = CatsLimits::default().with_supervision(20).with_marking(5);
        assert_eq!(
            totals.excess_over(&limits),
            vec![(WorkloadCategory::Supervision, 25, 20)]
        );
    }
}
