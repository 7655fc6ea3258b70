//! Presentation schedule (solution) model.
//!
//! A schedule attempt places every talk of an assessment into one slot,
//! a (session, room) pair, and gives each occupied slot an assessor panel.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{AttemptMeta, FactSnapshot};
use crate::config::ScheduleConfig;

/// Reversion baseline of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub assessors: BTreeSet<String>,
    pub talks: BTreeSet<String>,
}

/// A (session, room) pair with its panel and talks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: String,
    pub session_id: String,
    pub room_id: String,
    pub assessors: BTreeSet<String>,
    pub talks: BTreeSet<String>,
    pub original: Option<SlotSnapshot>,
}

impl ScheduleSlot {
    pub fn new(attempt_id: &str, session_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let room_id = room_id.into();
        Self {
            id: format!("{attempt_id}/{session_id}/{room_id}"),
            session_id,
            room_id,
            assessors: BTreeSet::new(),
            talks: BTreeSet::new(),
            original: None,
        }
    }

    pub fn with_assessor(mut self, faculty_id: impl Into<String>) -> Self {
        self.assessors.insert(faculty_id.into());
        self
    }

    pub fn with_talk(mut self, talk_id: impl Into<String>) -> Self {
        self.talks.insert(talk_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.talks.is_empty()
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            assessors: self.assessors.clone(),
            talks: self.talks.clone(),
        }
    }

    /// Records the current state as the baseline unless one exists.
    pub fn ensure_original(&mut self) {
        if self.original.is_none() {
            self.original = Some(self.snapshot());
        }
    }

    /// Restores the baseline. Returns `false` if there is none.
    pub fn revert(&mut self) -> bool {
        match self.original.clone() {
            Some(orig) => {
                self.assessors = orig.assessors;
                self.talks = orig.talks;
                true
            }
            None => false,
        }
    }
}

/// A scheduling attempt for one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAttempt {
    pub meta: AttemptMeta,
    pub assessment_id: String,
    pub config: ScheduleConfig,
    pub deployed: bool,
    pub slots: Vec<ScheduleSlot>,
}

impl ScheduleAttempt {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        assessment_id: impl Into<String>,
    ) -> Self {
        Self {
            meta: AttemptMeta::new(id, name),
            assessment_id: assessment_id.into(),
            config: ScheduleConfig::default(),
            deployed: false,
            slots: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ScheduleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_base(mut self, base_id: impl Into<String>) -> Self {
        self.meta.base_id = Some(base_id.into());
        self
    }

    pub fn with_include(mut self, attempt_id: impl Into<String>) -> Self {
        self.meta.include_ids.insert(attempt_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn slot(&self, session_id: &str, room_id: &str) -> Option<&ScheduleSlot> {
        self.slots
            .iter()
            .find(|s| s.session_id == session_id && s.room_id == room_id)
    }

    pub fn slot_by_id(&self, slot_id: &str) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    /// Slot holding `talk_id`, if any.
    pub fn slot_of_talk(&self, talk_id: &str) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.talks.contains(talk_id))
    }

    /// Slots an assessor sits in.
    pub fn slots_for_assessor(&self, faculty_id: &str) -> Vec<&ScheduleSlot> {
        self.slots
            .iter()
            .filter(|s| s.assessors.contains(faculty_id))
            .collect()
    }

    /// Number of slots with at least one talk.
    pub fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// Occupied slots per assessor.
    pub fn assessor_loads(&self) -> BTreeMap<&str, usize> {
        let mut loads = BTreeMap::new();
        for slot in self.slots.iter().filter(|s| !s.is_empty()) {
            for a in &slot.assessors {
                *loads.entry(a.as_str()).or_insert(0) += 1;
            }
        }
        loads
    }

    /// Deployed, and no session of the assessment lies before `today`.
    pub fn is_revokable(&self, facts: &FactSnapshot, today: NaiveDate) -> bool {
        if !self.deployed {
            return false;
        }
        facts
            .assessment(&self.assessment_id)
            .map(|a| {
                a.session_ids
                    .iter()
                    .filter_map(|id| facts.session(id))
                    .all(|s| s.date >= today)
            })
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assessment, PresentationSession};

    fn sample_attempt() -> ScheduleAttempt {
        let mut a = ScheduleAttempt::new("A1", "draft", "AS1");
        a.slots.push(
            ScheduleSlot::new("A1", "S1", "R1")
                .with_assessor("F1")
                .with_assessor("F2")
                .with_talk("T1")
                .with_talk("T2"),
        );
        a.slots.push(
            ScheduleSlot::new("A1", "S2", "R1")
                .with_assessor("F1")
                .with_assessor("F3")
                .with_talk("T3"),
        );
        a.slots.push(ScheduleSlot::new("A1", "S2", "R2"));
        a
    }

    #[test]
    fn test_slot_queries() {
        let a = sample_attempt();
        assert_eq!(a.slot_of_talk("T3").unwrap().session_id, "S2");
        assert!(a.slot_of_talk("T9").is_none());
        assert_eq!(a.slots_for_assessor("F1").len(), 2);
        assert_eq!(a.occupied_slots(), 2);
        assert_eq!(a.slot("S1", "R1").unwrap().id, "A1/S1/R1");
    }

    #[test]
    fn test_assessor_loads() {
        let a = sample_attempt();
        let loads = a.assessor_loads();
        assert_eq!(loads["F1"], 2);
        assert_eq!(loads["F2"], 1);
        assert_eq!(loads.get("F9"), None);
    }

    #[test]
    fn test_slot_revert() {
        let mut slot = ScheduleSlot::new("A1", "S1", "R1").with_talk("T1");
        assert!(!slot.revert());

        slot.ensure_original();
        slot.talks.insert("T2".into());
        slot.ensure_original();
        assert!(slot.revert());
        assert_eq!(slot.talks.len(), 1);
    }

    #[test]
    fn test_revokable_window() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 5, day).unwrap();
        let facts = FactSnapshot::new()
            .with_session(PresentationSession::new("S1", d(12)))
            .with_session(PresentationSession::new("S2", d(13)))
            .with_assessment(Assessment::new("AS1").with_session("S1").with_session("S2"));

        let mut a = sample_attempt();
        assert!(!a.is_revokable(&facts, d(1)));

        a.deployed = true;
        assert!(a.is_revokable(&facts, d(12)));
        assert!(!a.is_revokable(&facts, d(13)));
    }
}
