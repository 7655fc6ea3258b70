//! Attempt metadata shared by matching and scheduling attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use crate::solver::{SolverOutcome, SolverVerdict};

/// Identity, lifecycle flags and solve bookkeeping of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptMeta {
    pub id: String,
    pub name: String,

    /// Set once a solver verdict (usable or not) has been recorded.
    pub finished: bool,
    /// The problem was exported for offline solving.
    pub awaiting_upload: bool,
    pub published: bool,

    pub outcome: Option<SolverOutcome>,
    pub score: Option<f64>,
    pub construct_time: Option<Duration>,
    pub compute_time: Option<Duration>,

    /// Background job running the solve.
    pub task_id: Option<Uuid>,
    pub job_finished: bool,

    pub created_at: DateTime<Utc>,
    pub last_edited_at: Option<DateTime<Utc>>,

    /// Attempt this one was derived from.
    pub base_id: Option<String>,
    /// Attempts whose workload is counted against this one.
    pub include_ids: BTreeSet<String>,
}

impl AttemptMeta {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            finished: false,
            awaiting_upload: false,
            published: false,
            outcome: None,
            score: None,
            construct_time: None,
            compute_time: None,
            task_id: None,
            job_finished: false,
            created_at: Utc::now(),
            last_edited_at: None,
            base_id: None,
            include_ids: BTreeSet::new(),
        }
    }

    /// Whether the attempt finished with a usable outcome.
    pub fn is_solved(&self) -> bool {
        self.finished && self.outcome.map(|o| o.is_usable()).unwrap_or(false)
    }

    /// Clears all solve results, returning to the freshly created state.
    pub fn reset_solve(&mut self) {
        self.finished = false;
        self.awaiting_upload = false;
        self.outcome = None;
        self.score = None;
        self.construct_time = None;
        self.compute_time = None;
        self.task_id = None;
        self.job_finished = false;
    }

    /// Records a verdict and marks the attempt finished.
    pub fn record_verdict(&mut self, verdict: &SolverVerdict, construct_time: Duration) {
        self.finished = true;
        self.awaiting_upload = false;
        self.outcome = Some(verdict.outcome);
        self.construct_time = Some(construct_time);
        self.compute_time = Some(verdict.compute_time);
    }

    pub fn touch(&mut self) {
        self.last_edited_at = Some(Utc::now());
    }
}
