//! Matching attempts and their records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{AttemptMeta, WorkloadCategory};
use crate::config::MatchingConfig;

/// Staff role on a matching record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    Supervisor,
    /// Accountable supervisor when day-to-day supervision is delegated.
    ResponsibleSupervisor,
    Marker,
    Moderator,
}

impl RoleKind {
    /// Workload category the role earns CATS in.
    pub fn category(&self) -> WorkloadCategory {
        match self {
            RoleKind::Supervisor | RoleKind::ResponsibleSupervisor => WorkloadCategory::Supervision,
            RoleKind::Marker => WorkloadCategory::Marking,
            RoleKind::Moderator => WorkloadCategory::Moderation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Supervisor => "supervisor",
            RoleKind::ResponsibleSupervisor => "responsible-supervisor",
            RoleKind::Marker => "marker",
            RoleKind::Moderator => "moderator",
        }
    }
}

/// A (user, role) binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Role {
    pub user_id: String,
    pub kind: RoleKind,
}

impl Role {
    pub fn new(user_id: impl Into<String>, kind: RoleKind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
        }
    }
}

/// Reversion baseline of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub project_id: String,
    pub rank: Option<u32>,
    pub alternative: bool,
    pub priority: Option<u32>,
    pub roles: BTreeSet<Role>,
}

/// Assignment of one selector, for one submission period, to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRecord {
    pub id: String,
    pub selector_id: String,
    pub period_id: String,
    pub project_id: String,
    /// Rank of the project in the selector's list, if it was ranked.
    pub rank: Option<u32>,
    /// Assigned through a project's alternatives list.
    pub alternative: bool,
    pub priority: Option<u32>,
    pub roles: BTreeSet<Role>,
    pub original: Option<RecordSnapshot>,
}

impl MatchingRecord {
    pub fn new(
        attempt_id: &str,
        selector_id: impl Into<String>,
        period_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        let selector_id = selector_id.into();
        let period_id = period_id.into();
        Self {
            id: format!("{attempt_id}/{selector_id}/{period_id}"),
            selector_id,
            period_id,
            project_id: project_id.into(),
            rank: None,
            alternative: false,
            priority: None,
            roles: BTreeSet::new(),
            original: None,
        }
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_role(mut self, user_id: impl Into<String>, kind: RoleKind) -> Self {
        self.roles.insert(Role::new(user_id, kind));
        self
    }

    /// Users holding `kind`, in id order.
    pub fn holders(&self, kind: RoleKind) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.user_id.as_str())
            .collect()
    }

    /// Users holding either supervising role.
    pub fn supervisors(&self) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|r| r.kind.category() == WorkloadCategory::Supervision)
            .map(|r| r.user_id.as_str())
            .collect()
    }

    pub fn markers(&self) -> Vec<&str> {
        self.holders(RoleKind::Marker)
    }

    pub fn moderators(&self) -> Vec<&str> {
        self.holders(RoleKind::Moderator)
    }

    pub fn roles_of(&self, user_id: &str) -> Vec<RoleKind> {
        self.roles
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.kind)
            .collect()
    }

    pub fn has_role(&self, user_id: &str, kind: RoleKind) -> bool {
        self.roles.contains(&Role::new(user_id, kind))
    }

    /// Users holding any role.
    pub fn staff(&self) -> BTreeSet<&str> {
        self.roles.iter().map(|r| r.user_id.as_str()).collect()
    }

    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            project_id: self.project_id.clone(),
            rank: self.rank,
            alternative: self.alternative,
            priority: self.priority,
            roles: self.roles.clone(),
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
                self.project_id = orig.project_id;
                self.rank = orig.rank;
                self.alternative = orig.alternative;
                self.priority = orig.priority;
                self.roles = orig.roles;
                true
            }
            None => false,
        }
    }
}

/// A matching attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingAttempt {
    pub meta: AttemptMeta,
    pub year: u32,
    pub pclass_ids: BTreeSet<String>,
    pub config: MatchingConfig,
    pub selected: bool,
    pub records: Vec<MatchingRecord>,
}

impl MatchingAttempt {
    pub fn new(id: impl Into<String>, name: impl Into<String>, year: u32) -> Self {
        Self {
            meta: AttemptMeta::new(id, name),
            year,
            pclass_ids: BTreeSet::new(),
            config: MatchingConfig::default(),
            selected: false,
            records: Vec::new(),
        }
    }

    pub fn with_pclass(mut self, pclass_id: impl Into<String>) -> Self {
        self.pclass_ids.insert(pclass_id.into());
        self
    }

    pub fn with_config(mut self, config: MatchingConfig) -> Self {
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

    pub fn record(&self, selector_id: &str, period_id: &str) -> Option<&MatchingRecord> {
        self.records
            .iter()
            .find(|r| r.selector_id == selector_id && r.period_id == period_id)
    }

    pub fn record_mut(&mut self, selector_id: &str, period_id: &str) -> Option<&mut MatchingRecord> {
        self.records
            .iter_mut()
            .find(|r| r.selector_id == selector_id && r.period_id == period_id)
    }

    pub fn records_of_selector<'a>(
        &'a self,
        selector_id: &'a str,
    ) -> impl Iterator<Item = &'a MatchingRecord> + 'a {
        self.records.iter().filter(move |r| r.selector_id == selector_id)
    }

    /// Whether both attempts compete for the same selected slot.
    pub fn shares_scope(&self, other: &MatchingAttempt) -> bool {
        self.year == other.year && !self.pclass_ids.is_disjoint(&other.pclass_ids)
    }

    pub fn is_revokable(&self) -> bool {
        self.selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roles() {
        let r = MatchingRecord::new("A1", "S1", "T1", "P1")
            .with_rank(1)
            .with_role("F1", RoleKind::Supervisor)
            .with_role("F2", RoleKind::Marker)
            .with_role("F3", RoleKind::Moderator)
            .with_role("F4", RoleKind::ResponsibleSupervisor);

        assert_eq!(r.id, "A1/S1/T1");
        assert_eq!(r.supervisors(), vec!["F1", "F4"]);
        assert_eq!(r.markers(), vec!["F2"]);
        assert_eq!(r.moderators(), vec!["F3"]);
        assert!(r.has_role("F2", RoleKind::Marker));
        assert_eq!(r.roles_of("F3"), vec![RoleKind::Moderator]);
        assert_eq!(r.staff().len(), 4);
    }

    #[test]
    fn test_original_kept_and_reverted() {
        let mut r = MatchingRecord::new("A1", "S1", "T1", "P1")
            .with_rank(1)
            .with_role("F1", RoleKind::Supervisor);
        r.ensure_original();

        r.project_id = "P2".into();
        r.rank = Some(2);
        r.roles.clear();
        // a second baseline request keeps the first
        r.ensure_original();
        assert_eq!(r.original.as_ref().unwrap().project_id, "P1");

        assert!(r.revert());
        assert_eq!(r.project_id, "P1");
        assert_eq!(r.rank, Some(1));
        assert!(r.has_role("F1", RoleKind::Supervisor));
    }

    #[test]
    fn test_attempt_scope() {
        let a = MatchingAttempt::new("A", "a", 2025).with_pclass("PC1").with_pclass("PC2");
        let b = MatchingAttempt::new("B", "b", 2025).with_pclass("PC2");
        let c = MatchingAttempt::new("C", "c", 2025).with_pclass("PC3");
        let d = MatchingAttempt::new("D", "d", 2024).with_pclass("PC1");

        assert!(a.shares_scope(&b));
        assert!(!a.shares_scope(&c));
        assert!(!a.shares_scope(&d));
    }
}
