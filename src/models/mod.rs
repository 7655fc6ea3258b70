//! Domain models.
//!
//! Catalog facts (read-only, owned by the embedding application) and the
//! attempt state the engine owns.
//!
//! # Domain Mappings
//!
//! | Model | Role |
//! |-------|------|
//! | `FactSnapshot` | catalog view shared by solves and audits |
//! | `Selector` | student with a ranked project list |
//! | `ProjectFacts` | project plus optional capabilities |
//! | `Faculty`, `EnrollmentRecord` | staff and their per-class availability |
//! | `MatchingAttempt`, `MatchingRecord` | student ↔ project ↔ staff roles |
//! | `ScheduleAttempt`, `ScheduleSlot` | talks and panels in (session, room) slots |

mod attempt;
mod catalog;
mod faculty;
mod matching;
mod presentation;
mod project;
mod schedule;
mod selector;
mod viewer;

pub use attempt::AttemptMeta;
pub use catalog::FactSnapshot;
pub use faculty::{CatsLimits, EnrollmentRecord, EnrollmentState, Faculty, WorkloadCategory};
pub use matching::{MatchingAttempt, MatchingRecord, RecordSnapshot, Role, RoleKind};
pub use presentation::{
    Assessment, AssessorPoolPolicy, Availability, AvailabilityTable, PresentationSession, Room,
    Talk,
};
pub use project::{
    CatsValues, ProjectAlternative, ProjectCapability, ProjectClass, ProjectFacts,
    SubmissionPeriod,
};
pub use schedule::{ScheduleAttempt, ScheduleSlot, SlotSnapshot};
pub use selector::{Hint, SelectionChoice, Selector};
pub use viewer::{describe_record, Viewer};
