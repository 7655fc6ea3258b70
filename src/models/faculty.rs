//! Faculty and enrollment model.
//!
//! Faculty members are the staff resources the engine distributes work to:
//! supervision, marking, moderation and presentation assessment. Each
//! member carries personal CATS ceilings and, per project class, an
//! enrollment record describing which roles they are available for and
//! any class-specific ceilings.

use serde::{Deserialize, Serialize};

/// A workload category, one per role family that earns CATS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkloadCategory {
    /// Supervising students (supervisor or responsible supervisor roles).
    Supervision,
    /// Marking reports.
    Marking,
    /// Moderating marks.
    Moderation,
    /// Sitting on presentation assessment panels.
    Presentation,
}

impl WorkloadCategory {
    /// All categories in reporting order.
    pub const ALL: [WorkloadCategory; 4] = [
        WorkloadCategory::Supervision,
        WorkloadCategory::Marking,
        WorkloadCategory::Moderation,
        WorkloadCategory::Presentation,
    ];

    /// Short lowercase label used in issue keys and variable names.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadCategory::Supervision => "supervision",
            WorkloadCategory::Marking => "marking",
            WorkloadCategory::Moderation => "moderation",
            WorkloadCategory::Presentation => "presentation",
        }
    }
}

/// Optional CATS ceilings per workload category.
///
/// `None` means "no ceiling at this tier".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatsLimits {
    pub supervision: Option<u32>,
    pub marking: Option<u32>,
    pub moderation: Option<u32>,
    pub presentation: Option<u32>,
}

impl CatsLimits {
    /// Sets the supervision ceiling.
    pub fn with_supervision(mut self, limit: u32) -> Self {
        self.supervision = Some(limit);
        self
    }

    /// Sets the marking ceiling.
    pub fn with_marking(mut self, limit: u32) -> Self {
        self.marking = Some(limit);
        self
    }

    /// Sets the moderation ceiling.
    pub fn with_moderation(mut self, limit: u32) -> Self {
        self.moderation = Some(limit);
        self
    }

    /// Sets the presentation ceiling.
    pub fn with_presentation(mut self, limit: u32) -> Self {
        self.presentation = Some(limit);
        self
    }

    /// Ceiling for a category.
    pub fn get(&self, category: WorkloadCategory) -> Option<u32> {
        match category {
            WorkloadCategory::Supervision => self.supervision,
            WorkloadCategory::Marking => self.marking,
            WorkloadCategory::Moderation => self.moderation,
            WorkloadCategory::Presentation => self.presentation,
        }
    }

    /// Component-wise tightest ceiling of `self` and `other`.
    pub fn tightest(&self, other: &CatsLimits) -> CatsLimits {
        fn min_opt(a: Option<u32>, b: Option<u32>) -> Option<u32> {
            match (a, b) {
                (Some(x), Some(y)) => Some(x.min(y)),
                (x, None) => x,
                (None, y) => y,
            }
        }
        CatsLimits {
            supervision: min_opt(self.supervision, other.supervision),
            marking: min_opt(self.marking, other.marking),
            moderation: min_opt(self.moderation, other.moderation),
            presentation: min_opt(self.presentation, other.presentation),
        }
    }

    /// Whether no category has a ceiling.
    pub fn is_unbounded(&self) -> bool {
        WorkloadCategory::ALL.iter().all(|c| self.get(*c).is_none())
    }
}

/// A faculty member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faculty {
    /// Unique faculty identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Research group affiliation, used by research-group pool policies.
    pub research_group: Option<String>,
    /// Personal ceilings across all project classes (tier 2).
    pub cats_limits: CatsLimits,
}

impl Faculty {
    /// Creates a faculty member with no personal ceilings.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            research_group: None,
            cats_limits: CatsLimits::default(),
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the research group.
    pub fn with_research_group(mut self, group: impl Into<String>) -> Self {
        self.research_group = Some(group.into());
        self
    }

    /// Sets personal ceilings.
    pub fn with_limits(mut self, limits: CatsLimits) -> Self {
        self.cats_limits = limits;
        self
    }
}

/// Availability of a faculty member for a role in one project class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentState {
    #[default]
    Enrolled,
    /// On leave; must not be given this role.
    Sabbatical,
    /// Excused from this role.
    Exempt,
}

/// Per-project-class enrollment of a faculty member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub faculty_id: String,
    pub pclass_id: String,
    pub supervisor_state: EnrollmentState,
    pub marker_state: EnrollmentState,
    pub moderator_state: EnrollmentState,
    pub presentations_state: EnrollmentState,
    /// Class-specific ceilings (tier 3).
    pub custom_limits: CatsLimits,
}

impl EnrollmentRecord {
    /// Creates an enrollment with every role enrolled and no custom ceilings.
    pub fn new(faculty_id: impl Into<String>, pclass_id: impl Into<String>) -> Self {
        Self {
            faculty_id: faculty_id.into(),
            pclass_id: pclass_id.into(),
            supervisor_state: EnrollmentState::Enrolled,
            marker_state: EnrollmentState::Enrolled,
            moderator_state: EnrollmentState::Enrolled,
            presentations_state: EnrollmentState::Enrolled,
            custom_limits: CatsLimits::default(),
        }
    }

    /// Sets the state for one category.
    pub fn with_state(mut self, category: WorkloadCategory, state: EnrollmentState) -> Self {
        match category {
            WorkloadCategory::Supervision => self.supervisor_state = state,
            WorkloadCategory::Marking => self.marker_state = state,
            WorkloadCategory::Moderation => self.moderator_state = state,
            WorkloadCategory::Presentation => self.presentations_state = state,
        }
        self
    }

    /// Sets class-specific ceilings.
    pub fn with_custom_limits(mut self, limits: CatsLimits) -> Self {
        self.custom_limits = limits;
        self
    }

    /// State for one category.
    pub fn state(&self, category: WorkloadCategory) -> EnrollmentState {
        match category {
            WorkloadCategory::Supervision => self.supervisor_state,
            WorkloadCategory::Marking => self.marker_state,
            WorkloadCategory::Moderation => self.moderator_state,
            WorkloadCategory::Presentation => self.presentations_state,
        }
    }

    /// Whether the member may take roles of this category.
    pub fn is_enrolled_for(&self, category: WorkloadCategory) -> bool {
        self.state(category) == EnrollmentState::Enrolled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faculty_builder() {
        let f = Faculty::new("F1")
            .with_name("Dr Who")
            .with_research_group("TPP")
            .with_limits(CatsLimits::default().with_supervision(40));

        assert_eq!(f.id, "F1");
        assert_eq!(f.name, "Dr Who");
        assert_eq!(f.research_group.as_deref(), Some("TPP"));
        assert_eq!(f.cats_limits.supervision, Some(40));
        assert_eq!(f.cats_limits.marking, None);
    }

    #[test]
    fn test_tightest_limits() {
        let a = CatsLimits::default().with_supervision(40).with_marking(20);
        let b = CatsLimits::default().with_supervision(30).with_moderation(5);
        let t = a.tightest(&b);

        assert_eq!(t.supervision, Some(30));
        assert_eq!(t.marking, Some(20));
        assert_eq!(t.moderation, Some(5));
        assert_eq!(t.presentation, None);
        assert!(!t.is_unbounded());
        assert!(CatsLimits::default().is_unbounded());
    }

    #[test]
    fn test_enrollment_states() {
        let e = EnrollmentRecord::new("F1", "PC1")
            .with_state(WorkloadCategory::Marking, EnrollmentState::Sabbatical);

        assert!(e.is_enrolled_for(WorkloadCategory::Supervision));
        assert!(!e.is_enrolled_for(WorkloadCategory::Marking));
        assert_eq!(e.state(WorkloadCategory::Marking), EnrollmentState::Sabbatical);
    }
}
