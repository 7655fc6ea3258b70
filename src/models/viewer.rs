//! Viewer context for read APIs that may expose student identities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{FactSnapshot, MatchingRecord};

/// Who is looking at a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: String,
    pub is_admin: bool,
    /// Project classes the viewer convenes.
    pub convenor_of: BTreeSet<String>,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
            ..Self::default()
        }
    }

    pub fn with_convenor_of(mut self, pclass_id: impl Into<String>) -> Self {
        self.convenor_of.insert(pclass_id.into());
        self
    }

    /// Admins, convenors of the class, and staff on the record see names.
    pub fn can_see_student(&self, record: &MatchingRecord, pclass_id: &str) -> bool {
        self.is_admin
            || self.convenor_of.contains(pclass_id)
            || record.roles.iter().any(|r| r.user_id == self.user_id)
    }
}

/// One-line description of a record, with the student hidden when the
/// viewer may not see it.
pub fn describe_record(record: &MatchingRecord, facts: &FactSnapshot, viewer: &Viewer) -> String {
    let selector = facts.selector(&record.selector_id);
    let pclass_id = selector.map(|s| s.pclass_id.as_str()).unwrap_or("");

    let student = match selector {
        Some(s) if viewer.can_see_student(record, pclass_id) => {
            if s.student_name.is_empty() {
                s.id.clone()
            } else {
                s.student_name.clone()
            }
        }
        _ => "(hidden)".to_string(),
    };
    let project = facts
        .project(&record.project_id)
        .map(|p| if p.name.is_empty() { p.id.as_str() } else { p.name.as_str() })
        .unwrap_or(record.project_id.as_str());
    let rank = match (record.rank, record.alternative) {
        (Some(r), _) => format!("rank {r}"),
        (None, true) => format!("alternative (priority {})", record.priority.unwrap_or(0)),
        (None, false) => "unranked".to_string(),
    };
    let roles = record
        .roles
        .iter()
        .map(|r| format!("{} {}", r.kind.as_str(), r.user_id))
        .collect::<Vec<_>>()
        .join(", ");

    format!("{student} → {project} [{rank}] {roles}")
}
