//! Fact snapshot: the read-only catalog view one solve or audit works from.
//!
//! The snapshot is assembled by the embedding application (builders or
//! serde JSON) and shared immutably between concurrent solves. Lookups
//! return `Option`; callers that need a hard failure map `None` to
//! [`EngineError::UnknownEntity`](crate::error::EngineError).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{
    Assessment, Availability, AvailabilityTable, CatsValues, EnrollmentRecord, Faculty,
    PresentationSession, ProjectClass, ProjectFacts, Room, Selector, SubmissionPeriod, Talk,
    WorkloadCategory,
};
use crate::error::{EngineError, EngineResult};

/// Immutable catalog facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FactSnapshot {
    pub pclasses: BTreeMap<String, ProjectClass>,
    pub periods: BTreeMap<String, SubmissionPeriod>,
    pub projects: BTreeMap<String, ProjectFacts>,
    pub faculty: BTreeMap<String, Faculty>,
    pub enrollments: Vec<EnrollmentRecord>,
    pub selectors: BTreeMap<String, Selector>,
    pub rooms: BTreeMap<String, Room>,
    pub sessions: BTreeMap<String, PresentationSession>,
    pub assessments: BTreeMap<String, Assessment>,
    pub talks: BTreeMap<String, Talk>,
    pub availability: AvailabilityTable,
}

impl FactSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a snapshot from JSON.
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads a snapshot from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    // ======================== Builders ========================

    pub fn with_pclass(mut self, pclass: ProjectClass) -> Self {
        self.pclasses.insert(pclass.id.clone(), pclass);
        self
    }

    pub fn with_period(mut self, period: SubmissionPeriod) -> Self {
        self.periods.insert(period.id.clone(), period);
        self
    }

    pub fn with_project(mut self, project: ProjectFacts) -> Self {
        self.projects.insert(project.id.clone(), project);
        self
    }

    pub fn with_faculty(mut self, faculty: Faculty) -> Self {
        self.faculty.insert(faculty.id.clone(), faculty);
        self
    }

    /// Adds or replaces the enrollment for (faculty, pclass).
    pub fn with_enrollment(mut self, enrollment: EnrollmentRecord) -> Self {
        self.enrollments.retain(|e| {
            !(e.faculty_id == enrollment.faculty_id && e.pclass_id == enrollment.pclass_id)
        });
        self.enrollments.push(enrollment);
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selectors.insert(selector.id.clone(), selector);
        self
    }

    pub fn with_room(mut self, room: Room) -> Self {
        self.rooms.insert(room.id.clone(), room);
        self
    }

    pub fn with_session(mut self, session: PresentationSession) -> Self {
        self.sessions.insert(session.id.clone(), session);
        self
    }

    pub fn with_assessment(mut self, assessment: Assessment) -> Self {
        self.assessments.insert(assessment.id.clone(), assessment);
        self
    }

    pub fn with_talk(mut self, talk: Talk) -> Self {
        self.talks.insert(talk.id.clone(), talk);
        self
    }

    pub fn with_faculty_availability(
        mut self,
        faculty_id: &str,
        session_id: &str,
        value: Availability,
    ) -> Self {
        self.availability.set_faculty(faculty_id, session_id, value);
        self
    }

    pub fn with_submitter_availability(
        mut self,
        talk_id: &str,
        session_id: &str,
        value: Availability,
    ) -> Self {
        self.availability.set_submitter(talk_id, session_id, value);
        self
    }

    // ======================== Lookups ========================

    pub fn pclass(&self, id: &str) -> Option<&ProjectClass> {
        self.pclasses.get(id)
    }

    pub fn period(&self, id: &str) -> Option<&SubmissionPeriod> {
        self.periods.get(id)
    }

    pub fn project(&self, id: &str) -> Option<&ProjectFacts> {
        self.projects.get(id)
    }

    pub fn faculty_member(&self, id: &str) -> Option<&Faculty> {
        self.faculty.get(id)
    }

    pub fn selector(&self, id: &str) -> Option<&Selector> {
        self.selectors.get(id)
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn session(&self, id: &str) -> Option<&PresentationSession> {
        self.sessions.get(id)
    }

    pub fn assessment(&self, id: &str) -> Option<&Assessment> {
        self.assessments.get(id)
    }

    pub fn talk(&self, id: &str) -> Option<&Talk> {
        self.talks.get(id)
    }

    pub fn require_project(&self, id: &str) -> EngineResult<&ProjectFacts> {
        self.project(id)
            .ok_or_else(|| EngineError::unknown("project", id))
    }

    pub fn require_pclass(&self, id: &str) -> EngineResult<&ProjectClass> {
        self.pclass(id)
            .ok_or_else(|| EngineError::unknown("project class", id))
    }

    pub fn require_assessment(&self, id: &str) -> EngineResult<&Assessment> {
        self.assessment(id)
            .ok_or_else(|| EngineError::unknown("assessment", id))
    }

    pub fn enrollment(&self, faculty_id: &str, pclass_id: &str) -> Option<&EnrollmentRecord> {
        self.enrollments
            .iter()
            .find(|e| e.faculty_id == faculty_id && e.pclass_id == pclass_id)
    }

    /// Whether the faculty member may take roles of `category` in `pclass_id`.
    ///
    /// Faculty without an enrollment record in the class are not enrolled.
    pub fn is_enrolled(&self, faculty_id: &str, pclass_id: &str, category: WorkloadCategory) -> bool {
        self.enrollment(faculty_id, pclass_id)
            .map(|e| e.is_enrolled_for(category))
            .unwrap_or(false)
    }

    /// Faculty enrolled for `category` in a class, in id order.
    pub fn enrolled_faculty(&self, pclass_id: &str, category: WorkloadCategory) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .enrollments
            .iter()
            .filter(|e| e.pclass_id == pclass_id && e.is_enrolled_for(category))
            .map(|e| e.faculty_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Submission periods of a class, in id order.
    pub fn periods_of(&self, pclass_id: &str) -> Vec<&SubmissionPeriod> {
        self.periods
            .values()
            .filter(|p| p.pclass_id == pclass_id)
            .collect()
    }

    /// Selectors of a class, in id order.
    pub fn selectors_of(&self, pclass_id: &str) -> Vec<&Selector> {
        self.selectors
            .values()
            .filter(|s| s.pclass_id == pclass_id)
            .collect()
    }

    /// Projects offered in a class, in id order.
    pub fn projects_in(&self, pclass_id: &str) -> Vec<&ProjectFacts> {
        self.projects
            .values()
            .filter(|p| p.is_offered_in(pclass_id))
            .collect()
    }

    /// CATS per record for `project_id` in `pclass_id`.
    ///
    /// Unknown projects or classes yield zero values.
    pub fn project_cats(&self, project_id: &str, pclass_id: &str) -> CatsValues {
        match (self.project(project_id), self.pclass(pclass_id)) {
            (Some(project), Some(pclass)) => project.cats(pclass),
            (Some(project), None) => project.cats_override.unwrap_or_default(),
            _ => CatsValues::default(),
        }
    }

    /// Assessors required per slot: the largest requirement among the
    /// assessment's periods.
    pub fn required_assessors(&self, assessment_id: &str) -> u32 {
        self.assessment(assessment_id)
            .map(|a| {
                a.period_ids
                    .iter()
                    .filter_map(|id| self.period(id))
                    .map(|p| p.number_assessors)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentState, ProjectClass};

    fn snapshot() -> FactSnapshot {
        FactSnapshot::new()
            .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 1, 2)))
            .with_period(SubmissionPeriod::new("PC1-T1", "PC1"))
            .with_period(SubmissionPeriod::new("PC1-T2", "PC1").with_markers(2))
            .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1"))
            .with_faculty(Faculty::new("F1"))
            .with_faculty(Faculty::new("F2"))
            .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
            .with_enrollment(
                EnrollmentRecord::new("F2", "PC1")
                    .with_state(WorkloadCategory::Supervision, EnrollmentState::Exempt),
            )
    }

    #[test]
    fn test_lookups() {
        let facts = snapshot();
        assert!(facts.project("P1").is_some());
        assert!(facts.require_project("P9").is_err());
        assert_eq!(facts.periods_of("PC1").len(), 2);
        assert_eq!(facts.projects_in("PC1").len(), 1);
        assert_eq!(facts.project_cats("P1", "PC1").supervision, 10);
        assert_eq!(facts.project_cats("P9", "PC1"), CatsValues::default());
    }

    #[test]
    fn test_enrollment_queries() {
        let facts = snapshot();
        assert_eq!(
            facts.enrolled_faculty("PC1", WorkloadCategory::Supervision),
            vec!["F1"]
        );
        assert_eq!(
            facts.enrolled_faculty("PC1", WorkloadCategory::Marking),
            vec!["F1", "F2"]
        );
        assert!(!facts.is_enrolled("F3", "PC1", WorkloadCategory::Marking));
    }

    #[test]
    fn test_enrollment_replaced() {
        let facts = snapshot().with_enrollment(
            EnrollmentRecord::new("F1", "PC1")
                .with_state(WorkloadCategory::Marking, EnrollmentState::Sabbatical),
        );
        assert_eq!(facts.enrollments.len(), 2);
        assert!(!facts.is_enrolled("F1", "PC1", WorkloadCategory::Marking));
    }

    #[test]
    fn test_json_round_trip() {
        let facts = snapshot();
        let raw = serde_json::to_string(&facts).unwrap();
        let back = FactSnapshot::from_json_str(&raw).unwrap();
        assert_eq!(back.projects.len(), 1);
        assert_eq!(back.enrollments.len(), 2);
    }
}
