//! Matching quality statistics.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Rank histogram | selectors per satisfied rank |
//! | Delta | Σ (rank − 1) over ranked selectors |
//! | Hints | honoured / violated convenor hints |
//! | Programme matches | pairings on a programme-preferred project |
//! | CATS spread | min/max supervising and marking CATS per faculty group |
//!
//! Counts are per selector; a selector's records across periods share one
//! project and are counted once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::objective::programme_matches;
use crate::models::{FactSnapshot, Hint, MatchingAttempt, MatchingRecord, RoleKind};
use crate::workload::{matching_totals, WorkloadScope};

/// Smallest and largest value in a group, `None` for an empty group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatsRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl CatsRange {
    pub fn observe(&mut self, value: u32) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn spread(&self) -> u32 {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0,
        }
    }
}

/// Summary of a matching attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingStats {
    pub selectors: usize,
    pub records: usize,
    pub rank_histogram: BTreeMap<u32, usize>,
    /// Σ (rank − 1).
    pub delta: u32,
    pub unranked: usize,
    pub alternatives: usize,
    pub hints_satisfied: usize,
    pub hints_violated: usize,
    pub programme_matches: usize,
    pub score: Option<f64>,
    /// Supervising CATS over faculty holding a supervising role.
    pub supervising: CatsRange,
    /// Marking plus moderating CATS over faculty holding an assessing role.
    pub marking: CatsRange,
}

impl MatchingStats {
    /// Computes statistics from the attempt's committed records.
    pub fn calculate(attempt: &MatchingAttempt, facts: &FactSnapshot) -> Self {
        let mut stats = Self {
            records: attempt.records.len(),
            score: attempt.meta.score,
            ..Self::default()
        };

        // first record per selector
        let mut per_selector: BTreeMap<&str, &MatchingRecord> = BTreeMap::new();
        for record in &attempt.records {
            per_selector.entry(record.selector_id.as_str()).or_insert(record);
        }
        stats.selectors = per_selector.len();

        for (selector_id, record) in &per_selector {
            match (record.rank, record.alternative) {
                (Some(rank), _) => {
                    *stats.rank_histogram.entry(rank).or_insert(0) += 1;
                    stats.delta += rank.saturating_sub(1);
                }
                (None, true) => stats.alternatives += 1,
                (None, false) => stats.unranked += 1,
            }

            let Some(selector) = facts.selector(selector_id) else { continue };
            if let Some(project) = facts.project(&record.project_id) {
                if programme_matches(selector, project) {
                    stats.programme_matches += 1;
                }
            }
            for choice in &selector.choices {
                let assigned = choice.project_id == record.project_id;
                match (choice.hint, assigned) {
                    (Hint::Neutral, _) => {}
                    (Hint::Require, true) | (Hint::Forbid, false) => stats.hints_satisfied += 1,
                    (Hint::Require, false) | (Hint::Forbid, true) => stats.hints_violated += 1,
                    (Hint::Encourage | Hint::StronglyEncourage, true) => stats.hints_satisfied += 1,
                    (Hint::Discourage | Hint::StronglyDiscourage, true) => stats.hints_violated += 1,
                    _ => {}
                }
            }
        }

        let mut supervisors = BTreeSet::new();
        let mut assessors = BTreeSet::new();
        for record in &attempt.records {
            for role in &record.roles {
                match role.kind {
                    RoleKind::Supervisor | RoleKind::ResponsibleSupervisor => {
                        supervisors.insert(role.user_id.as_str());
                    }
                    RoleKind::Marker | RoleKind::Moderator => {
                        assessors.insert(role.user_id.as_str());
                    }
                }
            }
        }
        for f in &supervisors {
            let totals = matching_totals(facts, &attempt.records, f, &WorkloadScope::All);
            stats.supervising.observe(totals.supervising);
        }
        for f in &assessors {
            let totals = matching_totals(facts, &attempt.records, f, &WorkloadScope::All);
            stats.marking.observe(totals.marking + totals.moderating);
        }

        stats
    }

    /// Mean satisfied rank over ranked selectors.
    pub fn mean_rank(&self) -> Option<f64> {
        let ranked: usize = self.rank_histogram.values().sum();
        if ranked == 0 {
            return None;
        }
        let total: u64 = self
            .rank_histogram
            .iter()
            .map(|(rank, n)| *rank as u64 * *n as u64)
            .sum();
        Some(total as f64 / ranked as f64)
    }
}
