//! Presentation assessment model: rooms, sessions, talks and availability.
//!
//! An [`Assessment`] groups the talks of one or more submission periods and
//! the sessions they may be scheduled into. A slot is a (session, room)
//! pair; see [`crate::models::ScheduleSlot`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A presentation room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Seats, shared by the assessor panel and the presenting students.
    pub capacity: u32,
}

impl Room {
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            capacity,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A dated session (e.g. a morning block) with the rooms booked for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationSession {
    pub id: String,
    pub date: NaiveDate,
    pub name: String,
    pub room_ids: Vec<String>,
}

impl PresentationSession {
    pub fn new(id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            date,
            name: String::new(),
            room_ids: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_ids.push(room_id.into());
        self
    }
}

/// A student's talk, derived from a submission record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Talk {
    pub id: String,
    pub selector_id: String,
    pub project_id: String,
    pub period_id: String,
    /// Faculty holding a supervising role on the underlying record.
    pub supervisor_ids: BTreeSet<String>,
}

impl Talk {
    pub fn new(
        id: impl Into<String>,
        selector_id: impl Into<String>,
        project_id: impl Into<String>,
        period_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            selector_id: selector_id.into(),
            project_id: project_id.into(),
            period_id: period_id.into(),
            supervisor_ids: BTreeSet::new(),
        }
    }

    pub fn with_supervisor(mut self, faculty_id: impl Into<String>) -> Self {
        self.supervisor_ids.insert(faculty_id.into());
        self
    }
}

/// A presentation assessment event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    pub name: String,
    pub period_ids: BTreeSet<String>,
    pub session_ids: Vec<String>,
    /// Faculty available to sit on panels.
    pub assessor_ids: BTreeSet<String>,
    pub talk_ids: Vec<String>,
    /// Presentation CATS earned per slot sat in.
    pub cats_per_slot: u32,
}

impl Assessment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            period_ids: BTreeSet::new(),
            session_ids: Vec::new(),
            assessor_ids: BTreeSet::new(),
            talk_ids: Vec::new(),
            cats_per_slot: 1,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_period(mut self, period_id: impl Into<String>) -> Self {
        self.period_ids.insert(period_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_ids.push(session_id.into());
        self
    }

    pub fn with_assessor(mut self, faculty_id: impl Into<String>) -> Self {
        self.assessor_ids.insert(faculty_id.into());
        self
    }

    pub fn with_talk(mut self, talk_id: impl Into<String>) -> Self {
        self.talk_ids.push(talk_id.into());
        self
    }

    pub fn with_cats_per_slot(mut self, cats: u32) -> Self {
        self.cats_per_slot = cats;
        self
    }
}

/// Per-session availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    #[default]
    Available,
    Unavailable,
    /// Usable, but at a cost.
    IfNeeded,
}

/// Availability of faculty and submitters per session.
///
/// Entries absent from the table are [`Availability::Available`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityTable {
    /// faculty id → session id → availability
    pub faculty: BTreeMap<String, BTreeMap<String, Availability>>,
    /// talk id → session id → availability
    pub submitters: BTreeMap<String, BTreeMap<String, Availability>>,
}

impl AvailabilityTable {
    pub fn set_faculty(&mut self, faculty_id: &str, session_id: &str, value: Availability) {
        self.faculty
            .entry(faculty_id.to_string())
            .or_default()
            .insert(session_id.to_string(), value);
    }

    pub fn set_submitter(&mut self, talk_id: &str, session_id: &str, value: Availability) {
        self.submitters
            .entry(talk_id.to_string())
            .or_default()
            .insert(session_id.to_string(), value);
    }

    pub fn faculty(&self, faculty_id: &str, session_id: &str) -> Availability {
        self.faculty
            .get(faculty_id)
            .and_then(|m| m.get(session_id))
            .copied()
            .unwrap_or_default()
    }

    pub fn submitter(&self, talk_id: &str, session_id: &str) -> Availability {
        self.submitters
            .get(talk_id)
            .and_then(|m| m.get(session_id))
            .copied()
            .unwrap_or_default()
    }
}

/// Rule an assessor panel must satisfy relative to a project's assessor pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessorPoolPolicy {
    /// At least one panel member per talk comes from the project's pool.
    #[default]
    AtLeastOneInPool,
    /// Every panel member comes from the pool of every talk in the slot.
    AllInPool,
    /// At least one panel member shares the supervisor's research group (advisory).
    AtLeastOneInResearchGroup,
    /// Every panel member shares the supervisor's research group (advisory).
    AllInResearchGroup,
}

impl AssessorPoolPolicy {
    /// Whether the policy is enforced as a hard constraint.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            AssessorPoolPolicy::AtLeastOneInPool | AssessorPoolPolicy::AllInPool
        )
    }
}
