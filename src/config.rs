//! Attempt configuration.
//!
//! Every optimization run carries its own copy of the tuning parameters so
//! that a finished attempt can always be explained after the fact. Both
//! configurations deserialize from JSON; missing fields take the defaults
//! documented on each field.
//!
//! # Bias conventions
//! Biases are multiplicative on a pairing's weight (`> 1` favours,
//! `< 1` penalizes). Penalties, pressures and tensions are subtracted from
//! the objective and must be non-negative.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::models::{AssessorPoolPolicy, CatsLimits};
use crate::solver::SolverKind;

/// Parameters of a matching attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Solver backend (default: packaged MILP).
    pub solver: SolverKind,

    /// Multiplier when the selector's programme is preferred by the project (default 1.5).
    pub programme_bias: f64,
    /// Multiplier for choices auto-converted from bookmarks (default 0.333).
    pub bookmark_bias: f64,
    /// Hint multiplier for `Encourage` (default 2.0).
    pub encourage_bias: f64,
    /// Hint multiplier for `Discourage` (default 0.5).
    pub discourage_bias: f64,
    /// Hint multiplier for `StronglyEncourage` (default 5.0).
    pub strong_encourage_bias: f64,
    /// Hint multiplier for `StronglyDiscourage` (default 0.2).
    pub strong_discourage_bias: f64,
    /// Multiplier for pairings that repeat the base attempt (default 10.0).
    pub base_bias: f64,

    /// Weight of the per-group max-min CATS spread (default 1.0).
    pub levelling_bias: f64,
    /// Weight of the cross-group max-min CATS spread (default 2.0).
    pub intra_group_tension: f64,
    /// Penalty on the largest supervision load (default 1.0).
    pub supervising_pressure: f64,
    /// Penalty on the largest marking load (default 1.0).
    pub marking_pressure: f64,
    /// Penalty per CATS unit above a soft ceiling (default 5.0).
    pub cats_violation_penalty: f64,
    /// Penalty per enrolled supervisor left without students (default 5.0).
    pub no_assignment_penalty: f64,

    /// Attempt-wide CATS ceilings (tier 1).
    pub attempt_limits: CatsLimits,
    /// Per-faculty overrides of the attempt ceilings (tier 4).
    pub limit_overrides: BTreeMap<String, CatsLimits>,
    /// Treat faculty and enrollment ceilings as soft.
    pub ignore_per_faculty_limits: bool,
    /// Disable the programme bonus.
    pub ignore_programme_prefs: bool,

    /// Maximum distinct projects per supervisor within one project class.
    pub max_different_group_projects: Option<u32>,
    /// Maximum distinct projects per supervisor across the attempt.
    pub max_different_all_projects: Option<u32>,
    /// Maximum students of one project marked by the same marker.
    pub max_marking_multiplicity: Option<u32>,

    /// Skip selectors that did not submit a ranked list.
    pub include_only_submitted: bool,
    /// Pin every pairing of the base attempt.
    pub force_base: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::PackagedMilp,
            programme_bias: 1.5,
            bookmark_bias: 0.333,
            encourage_bias: 2.0,
            discourage_bias: 0.5,
            strong_encourage_bias: 5.0,
            strong_discourage_bias: 0.2,
            base_bias: 10.0,
            levelling_bias: 1.0,
            intra_group_tension: 2.0,
            supervising_pressure: 1.0,
            marking_pressure: 1.0,
            cats_violation_penalty: 5.0,
            no_assignment_penalty: 5.0,
            attempt_limits: CatsLimits::default(),
            limit_overrides: BTreeMap::new(),
            ignore_per_faculty_limits: false,
            ignore_programme_prefs: false,
            max_different_group_projects: None,
            max_different_all_projects: None,
            max_marking_multiplicity: None,
            include_only_submitted: false,
            force_base: false,
        }
    }
}

impl MatchingConfig {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file (JSON) and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Sets the solver backend.
    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Sets the attempt-wide ceilings.
    pub fn with_attempt_limits(mut self, limits: CatsLimits) -> Self {
        self.attempt_limits = limits;
        self
    }

    /// Adds a per-faculty override.
    pub fn with_limit_override(mut self, faculty_id: impl Into<String>, limits: CatsLimits) -> Self {
        self.limit_overrides.insert(faculty_id.into(), limits);
        self
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> EngineResult<()> {
        let multipliers = [
            ("programme_bias", self.programme_bias),
            ("bookmark_bias", self.bookmark_bias),
            ("encourage_bias", self.encourage_bias),
            ("discourage_bias", self.discourage_bias),
            ("strong_encourage_bias", self.strong_encourage_bias),
            ("strong_discourage_bias", self.strong_discourage_bias),
            ("base_bias", self.base_bias),
        ];
        for (name, value) in multipliers {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidConfiguration(format!(
                    "{name} must be a positive finite multiplier, got {value}"
                )));
            }
        }
        if self.bookmark_bias > 1.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "bookmark_bias must not exceed 1, got {}",
                self.bookmark_bias
            )));
        }
        if self.programme_bias < 1.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "programme_bias must be at least 1, got {}",
                self.programme_bias
            )));
        }

        let penalties = [
            ("levelling_bias", self.levelling_bias),
            ("intra_group_tension", self.intra_group_tension),
            ("supervising_pressure", self.supervising_pressure),
            ("marking_pressure", self.marking_pressure),
            ("cats_violation_penalty", self.cats_violation_penalty),
            ("no_assignment_penalty", self.no_assignment_penalty),
        ];
        for (name, value) in penalties {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfiguration(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("max_different_group_projects", self.max_different_group_projects),
            ("max_different_all_projects", self.max_different_all_projects),
            ("max_marking_multiplicity", self.max_marking_multiplicity),
        ] {
            if value == Some(0) {
                return Err(EngineError::InvalidConfiguration(format!(
                    "{name} must be at least 1 when set"
                )));
            }
        }

        Ok(())
    }
}

/// Parameters of a scheduling attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Solver backend (default: packaged MILP).
    pub solver: SolverKind,
    /// Maximum talks per slot (default 5).
    pub max_group_size: u32,
    /// Maximum slots per assessor within one session (default 1).
    pub assessor_multiplicity_per_session: u32,
    /// Maximum slots per assessor across the whole attempt.
    pub assessor_assigned_limit: Option<u32>,
    /// Presentation CATS ceiling per assessor, including included attempts.
    pub assessor_cats_limit: Option<u32>,
    /// Which pool rule panels must satisfy (default: at least one in pool).
    pub pool_policy: AssessorPoolPolicy,
    /// Allow talks of a no-clash project to share a slot.
    pub ignore_coscheduling: bool,
    /// Cost per occupied slot (default 1.0).
    pub slot_cost: f64,
    /// Cost per use of an if-needed availability (default 1.0).
    pub if_needed_cost: f64,
    /// Weight of the max-min spread of assessor loads (default 1.0).
    pub levelling_tension: f64,
    /// Reward for keeping a base attempt placement (default 1.0).
    pub base_bias: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::PackagedMilp,
            max_group_size: 5,
            assessor_multiplicity_per_session: 1,
            assessor_assigned_limit: None,
            assessor_cats_limit: None,
            pool_policy: AssessorPoolPolicy::AtLeastOneInPool,
            ignore_coscheduling: false,
            slot_cost: 1.0,
            if_needed_cost: 1.0,
            levelling_tension: 1.0,
            base_bias: 1.0,
        }
    }
}

impl ScheduleConfig {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file (JSON) and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Sets the pool policy.
    pub fn with_pool_policy(mut self, policy: AssessorPoolPolicy) -> Self {
        self.pool_policy = policy;
        self
    }

    /// Sets the maximum group size.
    pub fn with_max_group_size(mut self, size: u32) -> Self {
        self.max_group_size = size;
        self
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_group_size == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max_group_size must be at least 1".into(),
            ));
        }
        if self.assessor_multiplicity_per_session == 0 {
            return Err(EngineError::InvalidConfiguration(
                "assessor_multiplicity_per_session must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("slot_cost", self.slot_cost),
            ("if_needed_cost", self.if_needed_cost),
            ("levelling_tension", self.levelling_tension),
            ("base_bias", self.base_bias),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfiguration(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
