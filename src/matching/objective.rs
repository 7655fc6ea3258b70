//! Preference weighting.
//!
//! A (selector, project) pairing is worth `weight / rank`, where `weight`
//! starts at 1 and picks up the bookmark, hint, programme and base
//! multipliers that apply. `Forbid` pairings are worth exactly zero.
//!
//! Selectors that never submitted a list are scored as if every project
//! were their first choice (rank 1): there is no preference to honour, and
//! the forced assignment should not drag the score down.

use crate::config::MatchingConfig;
use crate::models::{FactSnapshot, Hint, MatchingRecord, ProjectFacts, Selector};

/// Multiplier for a hint.
pub fn hint_multiplier(config: &MatchingConfig, hint: Hint) -> f64 {
    match hint {
        Hint::Neutral | Hint::Require => 1.0,
        Hint::Forbid => 0.0,
        Hint::Encourage => config.encourage_bias,
        Hint::Discourage => config.discourage_bias,
        Hint::StronglyEncourage => config.strong_encourage_bias,
        Hint::StronglyDiscourage => config.strong_discourage_bias,
    }
}

/// Whether the project prefers the selector's programme.
pub fn programme_matches(selector: &Selector, project: &ProjectFacts) -> bool {
    match (&selector.programme, project.preferred_programmes()) {
        (Some(programme), Some(preferred)) => preferred.contains(programme),
        _ => false,
    }
}

/// Multiplicative weight of a pairing, before dividing by rank.
pub fn pairing_weight(
    config: &MatchingConfig,
    selector: &Selector,
    project: &ProjectFacts,
    repeats_base: bool,
) -> f64 {
    let choice = selector.choice_for(&project.id);
    let hint = choice.map(|c| c.hint).unwrap_or_default();
    if hint == Hint::Forbid {
        return 0.0;
    }

    let mut weight = 1.0;
    if choice.map(|c| c.converted_from_bookmark).unwrap_or(false) {
        weight *= config.bookmark_bias;
    }
    weight *= hint_multiplier(config, hint);
    if !config.ignore_programme_prefs && programme_matches(selector, project) {
        weight *= config.programme_bias;
    }
    if repeats_base {
        weight *= config.base_bias;
    }
    weight
}

/// Rank used for scoring, or `None` if the pairing has none.
pub fn effective_rank(selector: &Selector, project_id: &str) -> Option<u32> {
    if !selector.has_submitted() {
        return Some(1);
    }
    selector.rank_of(project_id).filter(|r| *r > 0)
}

/// Solver reward of a candidate pairing.
///
/// Pairings without a rank (not reachable through the builder) get zero.
pub fn pairing_reward(
    config: &MatchingConfig,
    selector: &Selector,
    project: &ProjectFacts,
    repeats_base: bool,
) -> f64 {
    match effective_rank(selector, &project.id) {
        Some(rank) => pairing_weight(config, selector, project, repeats_base) / rank as f64,
        None => 0.0,
    }
}

/// Score of a committed record.
///
/// `None` when the rank cannot be determined: the record's project is not
/// in the submitted list (e.g. an alternative or a manual reassignment),
/// or the selector or project is unknown.
pub fn record_score(config: &MatchingConfig, facts: &FactSnapshot, record: &MatchingRecord) -> Option<f64> {
    let selector = facts.selector(&record.selector_id)?;
    let project = facts.project(&record.project_id)?;
    if selector.hint_for(&project.id) == Hint::Forbid {
        return Some(0.0);
    }
    let rank = if selector.has_submitted() {
        record.rank.or_else(|| selector.rank_of(&project.id))?
    } else {
        1
    };
    if rank == 0 {
        return None;
    }
    Some(pairing_weight(config, selector, project, false) / rank as f64)
}

/// Attempt score: the sum of the scorable records.
///
/// Records without a score are skipped, not counted as zero. `None` when no
/// record is scorable.
pub fn attempt_score<'a>(
    config: &MatchingConfig,
    facts: &FactSnapshot,
    records: impl IntoIterator<Item = &'a MatchingRecord>,
) -> Option<f64> {
    records
        .into_iter()
        .filter_map(|r| record_score(config, facts, r))
        .fold(None, |acc, s| Some(acc.unwrap_or(0.0) + s))
}
