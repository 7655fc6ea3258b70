//! Project, project class and submission period models.
//!
//! A project is described by a base [`ProjectFacts`] record plus a list of
//! optional capabilities. Which capabilities are present depends on how the
//! owning project class is configured: classes that restrict marking to an
//! assessor pool attach an [`ProjectCapability::AssessorPool`], generic
//! (unowned) projects attach a supervisor pool, and so on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::WorkloadCategory;

/// CATS earned per student for each role family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatsValues {
    pub supervision: u32,
    pub marking: u32,
    pub moderation: u32,
    pub presentation: u32,
}

impl CatsValues {
    /// Creates a value set.
    pub fn new(supervision: u32, marking: u32, moderation: u32, presentation: u32) -> Self {
        Self {
            supervision,
            marking,
            moderation,
            presentation,
        }
    }

    /// Value for a category.
    pub fn get(&self, category: WorkloadCategory) -> u32 {
        match category {
            WorkloadCategory::Supervision => self.supervision,
            WorkloadCategory::Marking => self.marking,
            WorkloadCategory::Moderation => self.moderation,
            WorkloadCategory::Presentation => self.presentation,
        }
    }
}

/// A project class (e.g. "MSc dissertation", "BSc final-year project").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectClass {
    pub id: String,
    pub name: String,
    /// Default CATS per student.
    pub cats: CatsValues,
}

impl ProjectClass {
    pub fn new(id: impl Into<String>, cats: CatsValues) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            cats,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A submission period of a project class, with its role multiplicities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPeriod {
    pub id: String,
    pub pclass_id: String,
    pub name: String,
    /// Markers required per record.
    pub number_markers: u32,
    /// Moderators required per record.
    pub number_moderators: u32,
    /// Assessors required per presentation slot.
    pub number_assessors: u32,
}

impl SubmissionPeriod {
    /// Creates a period with one marker, no moderators and two assessors.
    pub fn new(id: impl Into<String>, pclass_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pclass_id: pclass_id.into(),
            name: String::new(),
            number_markers: 1,
            number_moderators: 0,
            number_assessors: 2,
        }
    }

    pub fn with_markers(mut self, n: u32) -> Self {
        self.number_markers = n;
        self
    }

    pub fn with_moderators(mut self, n: u32) -> Self {
        self.number_moderators = n;
        self
    }

    pub fn with_assessors(mut self, n: u32) -> Self {
        self.number_assessors = n;
        self
    }
}

/// An alternative project offered when the ranked one is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAlternative {
    pub project_id: String,
    /// Lower = preferred.
    pub priority: u32,
}

/// Optional project capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectCapability {
    /// Degree programmes this project prefers to recruit from.
    Programmes(BTreeSet<String>),
    /// Faculty eligible to mark, moderate and assess this project.
    AssessorPool(BTreeSet<String>),
    /// Faculty eligible to supervise a generic project.
    SupervisorPool(BTreeSet<String>),
    /// Alternatives offered in place of this project.
    Alternatives(Vec<ProjectAlternative>),
}

/// Base facts about a live project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFacts {
    pub id: String,
    pub name: String,
    /// Owning supervisor. `None` for generic projects supervised from a pool.
    pub owner_id: Option<String>,
    /// Project classes the project is offered in.
    pub pclass_ids: BTreeSet<String>,
    /// Students per (project, supervisor).
    pub capacity: u32,
    /// Whether `capacity` is a hard limit.
    pub enforce_capacity: bool,
    /// Talks of this project must not share a presentation slot.
    pub dont_clash_presentations: bool,
    /// Project-specific CATS replacing the class defaults.
    pub cats_override: Option<CatsValues>,
    /// Classes for which a description has been written.
    pub described_pclasses: BTreeSet<String>,
    pub capabilities: Vec<ProjectCapability>,
}

impl ProjectFacts {
    /// Creates an owned project offered (and described) in one class.
    pub fn new(id: impl Into<String>, pclass_id: impl Into<String>) -> Self {
        let pclass_id = pclass_id.into();
        Self {
            id: id.into(),
            name: String::new(),
            owner_id: None,
            pclass_ids: BTreeSet::from([pclass_id.clone()]),
            capacity: 1,
            enforce_capacity: true,
            dont_clash_presentations: false,
            cats_override: None,
            described_pclasses: BTreeSet::from([pclass_id]),
            capabilities: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_owner(mut self, faculty_id: impl Into<String>) -> Self {
        self.owner_id = Some(faculty_id.into());
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Makes `capacity` advisory only.
    pub fn with_unenforced_capacity(mut self) -> Self {
        self.enforce_capacity = false;
        self
    }

    pub fn with_dont_clash(mut self) -> Self {
        self.dont_clash_presentations = true;
        self
    }

    pub fn with_cats(mut self, cats: CatsValues) -> Self {
        self.cats_override = Some(cats);
        self
    }

    /// Offers the project in another class (with a description).
    pub fn with_pclass(mut self, pclass_id: impl Into<String>) -> Self {
        let pclass_id = pclass_id.into();
        self.described_pclasses.insert(pclass_id.clone());
        self.pclass_ids.insert(pclass_id);
        self
    }

    /// Drops the description for a class while keeping the offer.
    pub fn without_description_for(mut self, pclass_id: &str) -> Self {
        self.described_pclasses.remove(pclass_id);
        self
    }

    pub fn with_capability(mut self, capability: ProjectCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_programmes<I, S>(self, programmes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_capability(ProjectCapability::Programmes(
            programmes.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_assessors<I, S>(self, assessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_capability(ProjectCapability::AssessorPool(
            assessors.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_supervisor_pool<I, S>(self, supervisors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_capability(ProjectCapability::SupervisorPool(
            supervisors.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_alternative(mut self, project_id: impl Into<String>, priority: u32) -> Self {
        let alt = ProjectAlternative {
            project_id: project_id.into(),
            priority,
        };
        if let Some(ProjectCapability::Alternatives(list)) = self
            .capabilities
            .iter_mut()
            .find(|c| matches!(c, ProjectCapability::Alternatives(_)))
        {
            list.push(alt);
            return self;
        }
        self.with_capability(ProjectCapability::Alternatives(vec![alt]))
    }

    /// Whether the project has no owner and draws supervisors from a pool.
    pub fn is_generic(&self) -> bool {
        self.owner_id.is_none()
    }

    pub fn is_offered_in(&self, pclass_id: &str) -> bool {
        self.pclass_ids.contains(pclass_id)
    }

    pub fn has_description_for(&self, pclass_id: &str) -> bool {
        self.described_pclasses.contains(pclass_id)
    }

    pub fn preferred_programmes(&self) -> Option<&BTreeSet<String>> {
        self.capabilities.iter().find_map(|c| match c {
            ProjectCapability::Programmes(p) => Some(p),
            _ => None,
        })
    }

    pub fn assessor_pool(&self) -> Option<&BTreeSet<String>> {
        self.capabilities.iter().find_map(|c| match c {
            ProjectCapability::AssessorPool(p) => Some(p),
            _ => None,
        })
    }

    pub fn supervisor_pool(&self) -> Option<&BTreeSet<String>> {
        self.capabilities.iter().find_map(|c| match c {
            ProjectCapability::SupervisorPool(p) => Some(p),
            _ => None,
        })
    }

    pub fn alternatives(&self) -> &[ProjectAlternative] {
        self.capabilities
            .iter()
            .find_map(|c| match c {
                ProjectCapability::Alternatives(a) => Some(a.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Whether `faculty_id` may assess this project.
    ///
    /// Projects without an assessor pool accept anyone.
    pub fn in_assessor_pool(&self, faculty_id: &str) -> bool {
        self.assessor_pool()
            .map(|pool| pool.contains(faculty_id))
            .unwrap_or(true)
    }

    /// Faculty who may supervise: the owner, or the supervisor pool.
    pub fn supervisor_candidates(&self) -> Vec<&str> {
        match &self.owner_id {
            Some(owner) => vec![owner.as_str()],
            None => self
                .supervisor_pool()
                .map(|pool| pool.iter().map(|s| s.as_str()).collect())
                .unwrap_or_default(),
        }
    }

    /// Effective CATS values under the given class defaults.
    pub fn cats(&self, pclass: &ProjectClass) -> CatsValues {
        self.cats_override.unwrap_or(pclass.cats)
    }
}
