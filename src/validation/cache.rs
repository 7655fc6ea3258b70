//! Memoized validation with explicit dependency edges.
//!
//! Every cached report is keyed by an [`EntityKey`]. When a report is
//! computed, the cache records which catalog entities and attempts it read
//! from; [`ValidationCache::invalidate`] walks those edges in reverse so that
//! editing one entity drops exactly the reports that depended on it.
//!
//! | Edited entity | Invalidates |
//! |---------------|-------------|
//! | enrollment `f/pc` | faculty `f` |
//! | faculty | its cached totals, records and slots naming it |
//! | selector | records using it |
//! | project, project class, period | records, slots and totals reading its CATS or staffing |
//! | assessment | slots and schedule attempts of it |
//! | talk, session, room | slots using it |
//! | record, slot | the owning attempt, totals summing the record |
//! | attempt | attempts that include it, its totals |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use super::{
    validate_matching_attempt_only, validate_record, validate_schedule_attempt_only,
    validate_slot, ValidationReport, ValidationState,
};
use crate::models::{FactSnapshot, MatchingAttempt, ScheduleAttempt};
use crate::workload::{CatsTotals, WorkloadLedger, WorkloadScope};

/// Kind of entity a cached report or dependency refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Faculty,
    /// Id is `"{faculty}/{pclass}"`.
    Enrollment,
    Project,
    ProjectClass,
    SubmissionPeriod,
    Assessment,
    Selector,
    Record,
    Slot,
    Talk,
    Session,
    Room,
    MatchingAttempt,
    ScheduleAttempt,
    /// Cached CATS totals. Id is `"{attempt}/{faculty}"`.
    Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn enrollment(faculty_id: &str, pclass_id: &str) -> Self {
        Self::new(EntityKind::Enrollment, format!("{faculty_id}/{pclass_id}"))
    }
}

fn totals_key(attempt_id: &str, faculty_id: &str) -> EntityKey {
    EntityKey::new(EntityKind::Totals, format!("{attempt_id}/{faculty_id}"))
}

/// Validation results memoized per entity.
#[derive(Debug, Clone, Default)]
pub struct ValidationCache {
    reports: BTreeMap<EntityKey, ValidationReport>,
    /// dependency → entities whose cached state read it
    dependents: BTreeMap<EntityKey, BTreeSet<EntityKey>>,
    totals: BTreeMap<EntityKey, CatsTotals>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: EntityKind, id: &str) -> ValidationState {
        self.reports
            .get(&EntityKey::new(kind, id))
            .map_or(ValidationState::Unvalidated, |r| ValidationState::Validated(r.status()))
    }

    pub fn report(&self, kind: EntityKind, id: &str) -> Option<&ValidationReport> {
        self.reports.get(&EntityKey::new(kind, id))
    }

    /// Number of cached reports.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Records that `dependent` must be dropped whenever `dependency` changes.
    pub fn depend(&mut self, dependent: EntityKey, dependency: EntityKey) {
        self.dependents.entry(dependency).or_default().insert(dependent);
    }

    /// Drops the cached state of `(kind, id)` and of everything that depends
    /// on it, transitively. Returns the number of reports dropped.
    pub fn invalidate(&mut self, kind: EntityKind, id: &str) -> usize {
        let mut queue = VecDeque::from([EntityKey::new(kind, id)]);
        let mut seen = BTreeSet::new();
        let mut dropped = 0;

        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }
            if self.reports.remove(&key).is_some() {
                dropped += 1;
            }
            self.totals.remove(&key);
            if let Some(next) = self.dependents.get(&key) {
                queue.extend(next.iter().cloned());
            }
        }
        debug!(?kind, id, dropped, "validation cache invalidated");
        dropped
    }

    /// Invalidates an attempt together with every record or slot it owns.
    ///
    /// Used after a re-solve, where record and slot ids are reused with new
    /// content.
    pub fn invalidate_attempt(&mut self, kind: EntityKind, attempt_id: &str) -> usize {
        let prefix = format!("{attempt_id}/");
        let owned: Vec<EntityKey> = self
            .reports
            .keys()
            .filter(|k| matches!(k.kind, EntityKind::Record | EntityKind::Slot) && k.id.starts_with(&prefix))
            .cloned()
            .collect();
        let mut dropped = 0;
        for key in owned {
            dropped += self.invalidate(key.kind, &key.id);
        }
        dropped + self.invalidate(kind, attempt_id)
    }

    /// Whether totals for `faculty_id` under `attempt_id` are cached.
    pub fn has_totals(&self, attempt_id: &str, faculty_id: &str) -> bool {
        self.totals.contains_key(&totals_key(attempt_id, faculty_id))
    }

    /// Cached CATS totals of one faculty member for a matching attempt plus
    /// its included attempts.
    pub fn matching_totals(
        &mut self,
        facts: &FactSnapshot,
        attempt: &MatchingAttempt,
        included: &[&MatchingAttempt],
        faculty_id: &str,
    ) -> CatsTotals {
        let key = totals_key(attempt.id(), faculty_id);
        if let Some(t) = self.totals.get(&key) {
            return *t;
        }
        let totals = WorkloadLedger::new(facts)
            .with_matching(attempt)
            .with_matchings(included.iter().copied())
            .totals(faculty_id, &WorkloadScope::All);

        self.depend(key.clone(), EntityKey::new(EntityKind::Faculty, faculty_id));
        for source in std::iter::once(attempt).chain(included.iter().copied()) {
            self.depend(key.clone(), EntityKey::new(EntityKind::MatchingAttempt, source.id()));
            for record in source.records.iter().filter(|r| !r.roles_of(faculty_id).is_empty()) {
                self.depend(key.clone(), EntityKey::new(EntityKind::Record, record.id.as_str()));
                self.depend_on_record_facts(&key, facts, &record.project_id, &record.period_id);
            }
        }
        self.totals.insert(key, totals);
        totals
    }

    /// Edges from `dependent` to the project, period and project class whose
    /// CATS and staffing numbers a record or talk reads.
    fn depend_on_record_facts(
        &mut self,
        dependent: &EntityKey,
        facts: &FactSnapshot,
        project_id: &str,
        period_id: &str,
    ) {
        self.depend(dependent.clone(), EntityKey::new(EntityKind::Project, project_id));
        self.depend(dependent.clone(), EntityKey::new(EntityKind::SubmissionPeriod, period_id));
        if let Some(period) = facts.period(period_id) {
            self.depend(dependent.clone(), EntityKey::new(EntityKind::ProjectClass, period.pclass_id.as_str()));
        }
    }

    /// Memoized [`validate_matching`](super::validate_matching).
    pub fn validate_matching(
        &mut self,
        facts: &FactSnapshot,
        attempt: &MatchingAttempt,
        included: &[&MatchingAttempt],
    ) -> ValidationReport {
        let attempt_key = EntityKey::new(EntityKind::MatchingAttempt, attempt.id());
        if let Some(cached) = self.reports.get(&attempt_key) {
            return cached.clone();
        }
        if !attempt.meta.finished {
            self.reports.insert(attempt_key, ValidationReport::new());
            return ValidationReport::new();
        }

        let mut report = ValidationReport::new();
        for record in &attempt.records {
            let key = EntityKey::new(EntityKind::Record, record.id.as_str());
            let record_report = match self.reports.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let fresh = validate_record(facts, record);
                    self.depend(key.clone(), EntityKey::new(EntityKind::Selector, record.selector_id.as_str()));
                    self.depend_on_record_facts(&key, facts, &record.project_id, &record.period_id);
                    let pclass = facts.period(&record.period_id).map(|p| p.pclass_id.as_str());
                    for user in record.staff() {
                        let faculty = EntityKey::new(EntityKind::Faculty, user);
                        self.depend(key.clone(), faculty.clone());
                        if let Some(pc) = pclass {
                            self.depend(faculty, EntityKey::enrollment(user, pc));
                        }
                    }
                    self.depend(attempt_key.clone(), key.clone());
                    self.reports.insert(key, fresh.clone());
                    fresh
                }
            };
            report.merge(&record_report);
        }
        report.merge(&validate_matching_attempt_only(facts, attempt, included));
        for pc in &attempt.pclass_ids {
            self.depend(attempt_key.clone(), EntityKey::new(EntityKind::ProjectClass, pc.as_str()));
        }
        for other in included {
            self.depend(attempt_key.clone(), EntityKey::new(EntityKind::MatchingAttempt, other.id()));
        }
        self.reports.insert(attempt_key, report.clone());
        report
    }

    /// Memoized [`validate_schedule`](super::validate_schedule).
    pub fn validate_schedule(
        &mut self,
        facts: &FactSnapshot,
        attempt: &ScheduleAttempt,
        included: &[&ScheduleAttempt],
    ) -> ValidationReport {
        let attempt_key = EntityKey::new(EntityKind::ScheduleAttempt, attempt.id());
        if let Some(cached) = self.reports.get(&attempt_key) {
            return cached.clone();
        }
        if !attempt.meta.finished {
            self.reports.insert(attempt_key, ValidationReport::new());
            return ValidationReport::new();
        }

        let mut report = ValidationReport::new();
        for slot in &attempt.slots {
            let key = EntityKey::new(EntityKind::Slot, slot.id.as_str());
            let slot_report = match self.reports.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let fresh = validate_slot(facts, attempt, slot);
                    self.depend(key.clone(), EntityKey::new(EntityKind::Assessment, attempt.assessment_id.as_str()));
                    if let Some(assessment) = facts.assessment(&attempt.assessment_id) {
                        for period in &assessment.period_ids {
                            self.depend(key.clone(), EntityKey::new(EntityKind::SubmissionPeriod, period.as_str()));
                        }
                    }
                    self.depend(key.clone(), EntityKey::new(EntityKind::Session, slot.session_id.as_str()));
                    self.depend(key.clone(), EntityKey::new(EntityKind::Room, slot.room_id.as_str()));
                    let mut pclasses = BTreeSet::new();
                    for t in &slot.talks {
                        self.depend(key.clone(), EntityKey::new(EntityKind::Talk, t.as_str()));
                        if let Some(talk) = facts.talk(t) {
                            self.depend_on_record_facts(&key, facts, &talk.project_id, &talk.period_id);
                            if let Some(period) = facts.period(&talk.period_id) {
                                pclasses.insert(period.pclass_id.as_str());
                            }
                        }
                    }
                    for f in &slot.assessors {
                        let faculty = EntityKey::new(EntityKind::Faculty, f.as_str());
                        self.depend(key.clone(), faculty.clone());
                        for pc in &pclasses {
                            self.depend(faculty.clone(), EntityKey::enrollment(f, pc));
                        }
                    }
                    self.depend(attempt_key.clone(), key.clone());
                    self.reports.insert(key, fresh.clone());
                    fresh
                }
            };
            report.merge(&slot_report);
        }
        report.merge(&validate_schedule_attempt_only(facts, attempt, included));
        self.depend(attempt_key.clone(), EntityKey::new(EntityKind::Assessment, attempt.assessment_id.as_str()));
        for other in included {
            self.depend(attempt_key.clone(), EntityKey::new(EntityKind::ScheduleAttempt, other.id()));
        }
        self.reports.insert(attempt_key, report.clone());
        report
    }
}
