//! Independent constraint validation.
//!
//! Re-derives from the committed state, not from the solver's model,
//! whether records and slots still satisfy every hard rule. Runs on demand
//! and after manual edits.
//!
//! Checks compose bottom-up: records/slots are validated on their own, and
//! the attempt adds checks that need the whole picture (CATS ceilings
//! across roles and included attempts, talk uniqueness, session
//! multiplicity). An unfinished attempt is vacuously valid.
//!
//! Validation never fails: missing catalog data is reported as an issue or
//! treated as zero, never raised.

mod cache;
mod catalog;
mod matching;
mod schedule;

pub use cache::{EntityKey, EntityKind, ValidationCache};
pub use catalog::validate_catalog;
pub use matching::{validate_matching, validate_matching_attempt_only, validate_record};
pub use schedule::{validate_schedule, validate_schedule_attempt_only, validate_slot};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one issue: a category plus the entity it concerns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueKey {
    pub category: String,
    pub sub_id: String,
}

impl IssueKey {
    pub fn new(category: impl Into<String>, sub_id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            sub_id: sub_id.into(),
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Ok,
    HasWarnings,
    HasErrors,
}

/// Whether an entity has been validated since it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Unvalidated,
    Validated(ValidationStatus),
}

/// Errors (fatal) and warnings (advisory), each keyed by [`IssueKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: BTreeMap<IssueKey, String>,
    pub warnings: BTreeMap<IssueKey, String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, category: &str, sub_id: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(IssueKey::new(category, sub_id), message.into());
    }

    pub fn warning(&mut self, category: &str, sub_id: impl Into<String>, message: impl Into<String>) {
        self.warnings.insert(IssueKey::new(category, sub_id), message.into());
    }

    /// Adds all issues of `other`.
    pub fn merge(&mut self, other: &ValidationReport) {
        self.errors
            .extend(other.errors.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.warnings
            .extend(other.warnings.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_ok(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }

    pub fn status(&self) -> ValidationStatus {
        if self.has_errors() {
            ValidationStatus::HasErrors
        } else if self.has_warnings() {
            ValidationStatus::HasWarnings
        } else {
            ValidationStatus::Ok
        }
    }

    /// Errors in one category.
    pub fn errors_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = (&'a IssueKey, &'a String)> + 'a {
        self.errors.iter().filter(move |(k, _)| k.category == category)
    }

    /// Warnings in one category.
    pub fn warnings_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = (&'a IssueKey, &'a String)> + 'a {
        self.warnings.iter().filter(move |(k, _)| k.category == category)
    }
}
