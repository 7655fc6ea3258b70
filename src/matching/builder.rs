//! Matching problem formulation.
//!
//! Translates a matching attempt and the catalog facts into a
//! [`LinearProblem`]:
//!
//! - `x[s,p]`: selector `s` takes project `p` (one per selector)
//! - `z[s,p,f]`: `f` supervises `s` on generic project `p`
//! - `m[s,t,p,f]` / `d[s,t,p,f]`: `f` marks / moderates `s` in period `t`
//!
//! Hard constraints cover assignment, capacity, role multiplicity,
//! distinctness, hints and CATS ceilings. The objective adds preference
//! rewards and subtracts levelling tension, pressure and soft-limit
//! penalties. Workload tension terms are scaled by the largest per-record
//! CATS value so they stay commensurate with the preference rewards.
//!
//! # Reference
//! - Abraham, Irving, Manlove (2007), "Two algorithms for the
//!   Student-Project Allocation problem"

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument, warn};

use super::objective::pairing_reward;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    FactSnapshot, Hint, MatchingAttempt, MatchingRecord, ProjectFacts, RoleKind, Selector,
    SubmissionPeriod, WorkloadCategory,
};
use crate::solver::{Comparison, LinearProblem, Sense, SolverVerdict, VarId};
use crate::workload::{effective_limits, WorkloadLedger, WorkloadScope};

/// Upper bound for continuous helper variables.
const BIG: f64 = 1.0e6;

/// Categories decided by a matching solve.
const MATCHING_CATEGORIES: [WorkloadCategory; 3] = [
    WorkloadCategory::Supervision,
    WorkloadCategory::Marking,
    WorkloadCategory::Moderation,
];

/// Decision variables of one candidate project for one selector.
#[derive(Debug, Clone)]
struct CandidatePlan {
    project_id: String,
    x: VarId,
    /// (faculty, indicator); `None` means the owner, bound to `x`.
    supervisors: Vec<(String, Option<VarId>)>,
    /// period → (faculty, variable)
    markers: BTreeMap<String, Vec<(String, VarId)>>,
    moderators: BTreeMap<String, Vec<(String, VarId)>>,
}

#[derive(Debug, Clone)]
struct SelectorPlan {
    selector_id: String,
    periods: Vec<String>,
    candidates: Vec<CandidatePlan>,
}

/// A built matching problem plus what is needed to decode its solution.
#[derive(Debug, Clone)]
pub struct MatchingModel {
    pub problem: LinearProblem,
    attempt_id: String,
    plans: Vec<SelectorPlan>,
}

impl MatchingModel {
    /// Number of selectors in the model.
    pub fn num_selectors(&self) -> usize {
        self.plans.len()
    }

    /// Variable `x[s,p]`, if the pairing is a candidate.
    pub fn assignment_var(&self, selector_id: &str, project_id: &str) -> Option<VarId> {
        self.plans
            .iter()
            .find(|p| p.selector_id == selector_id)?
            .candidates
            .iter()
            .find(|c| c.project_id == project_id)
            .map(|c| c.x)
    }

    /// Turns a usable verdict into records, one per (selector, period).
    pub fn decode(&self, facts: &FactSnapshot, verdict: &SolverVerdict) -> EngineResult<Vec<MatchingRecord>> {
        if !verdict.outcome.is_usable() {
            return Err(EngineError::UnusableVerdict(format!(
                "outcome {:?} has no solution",
                verdict.outcome
            )));
        }

        let mut records = Vec::new();
        for plan in &self.plans {
            let chosen: Vec<&CandidatePlan> =
                plan.candidates.iter().filter(|c| verdict.is_set(c.x)).collect();
            let [candidate] = chosen.as_slice() else {
                return Err(EngineError::UnusableVerdict(format!(
                    "selector '{}' assigned {} projects",
                    plan.selector_id,
                    chosen.len()
                )));
            };
            let rank = facts
                .selector(&plan.selector_id)
                .filter(|s| s.has_submitted())
                .and_then(|s| s.rank_of(&candidate.project_id));

            for period in &plan.periods {
                let mut record = MatchingRecord::new(
                    &self.attempt_id,
                    &plan.selector_id,
                    period,
                    &candidate.project_id,
                );
                record.rank = rank;
                for (f, var) in &candidate.supervisors {
                    if var.map_or(true, |v| verdict.is_set(v)) {
                        record = record.with_role(f, RoleKind::Supervisor);
                    }
                }
                for (f, var) in candidate.markers.get(period).into_iter().flatten() {
                    if verdict.is_set(*var) {
                        record = record.with_role(f, RoleKind::Marker);
                    }
                }
                for (f, var) in candidate.moderators.get(period).into_iter().flatten() {
                    if verdict.is_set(*var) {
                        record = record.with_role(f, RoleKind::Moderator);
                    }
                }
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Linear expressions accumulated per faculty member while building.
#[derive(Default)]
struct FacultyTerms {
    /// (pclass, category) → CATS terms
    cats: BTreeMap<(String, WorkloadCategory), Vec<(VarId, f64)>>,
    /// supervision indicators, one per selector
    supervising: Vec<VarId>,
    /// marker/moderator variables, one per record
    marking: Vec<VarId>,
    /// (pclass, project) → supervision indicators
    projects: BTreeMap<(String, String), Vec<VarId>>,
}

/// Builds a [`MatchingModel`] from catalog facts.
///
/// # Example
/// ```no_run
/// use project_allocation::matching::MatchingProblemBuilder;
/// use project_allocation::models::{FactSnapshot, MatchingAttempt};
///
/// let facts = FactSnapshot::new();
/// let attempt = MatchingAttempt::new("A1", "draft", 2025).with_pclass("PC1");
/// let model = MatchingProblemBuilder::new(&facts, &attempt).build();
/// ```
pub struct MatchingProblemBuilder<'a> {
    facts: &'a FactSnapshot,
    attempt: &'a MatchingAttempt,
    base: Option<&'a MatchingAttempt>,
    included: Vec<&'a MatchingAttempt>,
}

impl<'a> MatchingProblemBuilder<'a> {
    pub fn new(facts: &'a FactSnapshot, attempt: &'a MatchingAttempt) -> Self {
        Self {
            facts,
            attempt,
            base: None,
            included: Vec::new(),
        }
    }

    /// Sets the base attempt whose pairings are rewarded (or pinned).
    pub fn with_base(mut self, base: &'a MatchingAttempt) -> Self {
        self.base = Some(base);
        self
    }

    /// Adds attempts whose committed workload counts against the ceilings.
    pub fn with_included(mut self, included: impl IntoIterator<Item = &'a MatchingAttempt>) -> Self {
        self.included.extend(included);
        self
    }

    /// Faculty who may mark or moderate `project` in a class.
    fn eligible_assessors(
        &self,
        project: &ProjectFacts,
        pclass_id: &str,
        category: WorkloadCategory,
    ) -> Vec<String> {
        self.facts
            .enrolled_faculty(pclass_id, category)
            .into_iter()
            .filter(|f| project.in_assessor_pool(f))
            .filter(|f| project.owner_id.as_deref() != Some(*f))
            .map(String::from)
            .collect()
    }

    /// Faculty who may supervise `project` in a class.
    fn eligible_supervisors(&self, project: &ProjectFacts, pclass_id: &str) -> Vec<String> {
        project
            .supervisor_candidates()
            .into_iter()
            .filter(|f| self.facts.is_enrolled(f, pclass_id, WorkloadCategory::Supervision))
            .map(String::from)
            .collect()
    }

    /// Whether `project` can be staffed for every period of the class.
    fn is_staffable(&self, project: &ProjectFacts, pclass_id: &str, periods: &[&SubmissionPeriod]) -> bool {
        if !project.is_offered_in(pclass_id) || !project.has_description_for(pclass_id) {
            return false;
        }
        if self.eligible_supervisors(project, pclass_id).is_empty() {
            return false;
        }
        let markers = self.eligible_assessors(project, pclass_id, WorkloadCategory::Marking).len();
        let moderators = self
            .eligible_assessors(project, pclass_id, WorkloadCategory::Moderation)
            .len();
        periods.iter().all(|p| {
            markers >= p.number_markers as usize && moderators >= p.number_moderators as usize
        })
    }

    /// Projects the selector may be assigned to. A required project that
    /// cannot be staffed is a configuration error.
    fn candidates(&self, selector: &Selector, periods: &[&SubmissionPeriod]) -> EngineResult<Vec<&'a ProjectFacts>> {
        let pclass_id = &selector.pclass_id;
        let pool: Vec<&'a ProjectFacts> = if selector.has_submitted() {
            selector
                .choices
                .iter()
                .filter_map(|c| self.facts.project(&c.project_id))
                .collect()
        } else {
            self.facts.projects_in(pclass_id)
        };
        let mut candidates = Vec::with_capacity(pool.len());
        for project in pool {
            if self.is_staffable(project, pclass_id, periods) {
                candidates.push(project);
                continue;
            }
            if selector.hint_for(&project.id) == Hint::Require {
                return Err(EngineError::InvalidConfiguration(format!(
                    "selector '{}' requires project '{}', which cannot be staffed",
                    selector.id, project.id
                )));
            }
            debug!(selector = %selector.id, project = %project.id, "candidate dropped: cannot be staffed");
        }
        Ok(candidates)
    }

    /// Builds the model.
    #[instrument(skip_all, fields(attempt = %self.attempt.id()))]
    pub fn build(&self) -> EngineResult<MatchingModel> {
        let config = &self.attempt.config;
        config.validate()?;

        let mut problem = LinearProblem::new(format!("matching-{}", self.attempt.id()), Sense::Maximize);
        let base_pairs: BTreeSet<(&str, &str)> = self
            .base
            .map(|b| {
                b.records
                    .iter()
                    .map(|r| (r.selector_id.as_str(), r.project_id.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let mut plans = Vec::new();
        let mut faculty: BTreeMap<String, FacultyTerms> = BTreeMap::new();
        // (project, supervisor) → supervision indicators, for capacity
        let mut capacity: BTreeMap<(String, String), Vec<VarId>> = BTreeMap::new();
        // (faculty, project, period) → marker variables
        let mut marker_multiplicity: BTreeMap<(String, String, String), Vec<VarId>> = BTreeMap::new();
        let mut cats_unit: f64 = 1.0;

        for pclass_id in &self.attempt.pclass_ids {
            self.facts.require_pclass(pclass_id)?;
            let periods = self.facts.periods_of(pclass_id);
            if periods.is_empty() {
                warn!(pclass = %pclass_id, "project class has no submission periods");
                continue;
            }

            for selector in self.facts.selectors_of(pclass_id) {
                if config.include_only_submitted && !selector.has_submitted() {
                    continue;
                }
                let candidates = self.candidates(selector, &periods)?;
                if candidates.is_empty() {
                    return Err(EngineError::InvalidConfiguration(format!(
                        "selector '{}' has no feasible project",
                        selector.id
                    )));
                }

                let mut plan = SelectorPlan {
                    selector_id: selector.id.clone(),
                    periods: periods.iter().map(|p| p.id.clone()).collect(),
                    candidates: Vec::new(),
                };
                let mut one_project = Vec::new();

                for project in candidates {
                    let repeats_base = base_pairs.contains(&(selector.id.as_str(), project.id.as_str()));
                    let cats = self.facts.project_cats(&project.id, pclass_id);
                    cats_unit = cats_unit
                        .max(cats.supervision as f64)
                        .max(cats.marking as f64)
                        .max(cats.moderation as f64);

                    let x = problem.add_binary(format!("x[{},{}]", selector.id, project.id));
                    problem.add_objective(x, pairing_reward(config, selector, project, repeats_base));
                    one_project.push((x, 1.0));

                    match selector.hint_for(&project.id) {
                        Hint::Require => problem.fix(format!("require[{},{}]", selector.id, project.id), x, 1.0),
                        Hint::Forbid => problem.fix(format!("forbid[{},{}]", selector.id, project.id), x, 0.0),
                        _ => {}
                    }
                    if config.force_base && repeats_base {
                        problem.fix(format!("base[{},{}]", selector.id, project.id), x, 1.0);
                    }

                    let mut candidate = CandidatePlan {
                        project_id: project.id.clone(),
                        x,
                        supervisors: Vec::new(),
                        markers: BTreeMap::new(),
                        moderators: BTreeMap::new(),
                    };

                    // supervision
                    let supervision_cats = (cats.supervision as usize * periods.len()) as f64;
                    let mut supervisor_vars: BTreeMap<String, VarId> = BTreeMap::new();
                    match &project.owner_id {
                        Some(owner) => {
                            candidate.supervisors.push((owner.clone(), None));
                            supervisor_vars.insert(owner.clone(), x);
                        }
                        None => {
                            let mut pick = vec![(x, -1.0)];
                            for f in self.eligible_supervisors(project, pclass_id) {
                                let z = problem.add_binary(format!("z[{},{},{}]", selector.id, project.id, f));
                                pick.push((z, 1.0));
                                candidate.supervisors.push((f.clone(), Some(z)));
                                supervisor_vars.insert(f, z);
                            }
                            problem.add_constraint(
                                format!("supervise[{},{}]", selector.id, project.id),
                                pick,
                                Comparison::Eq,
                                0.0,
                            );
                        }
                    }
                    for (f, var) in &supervisor_vars {
                        let terms = faculty.entry(f.clone()).or_default();
                        terms
                            .cats
                            .entry((pclass_id.clone(), WorkloadCategory::Supervision))
                            .or_default()
                            .push((*var, supervision_cats));
                        terms.supervising.push(*var);
                        terms
                            .projects
                            .entry((pclass_id.clone(), project.id.clone()))
                            .or_default()
                            .push(*var);
                        capacity
                            .entry((project.id.clone(), f.clone()))
                            .or_default()
                            .push(*var);
                    }

                    // marking and moderation, per period
                    let marker_pool = self.eligible_assessors(project, pclass_id, WorkloadCategory::Marking);
                    let moderator_pool =
                        self.eligible_assessors(project, pclass_id, WorkloadCategory::Moderation);
                    for period in &periods {
                        let mut roles: BTreeMap<String, Vec<VarId>> = BTreeMap::new();
                        for (kind, count, pool, prefix, unit) in [
                            (RoleKind::Marker, period.number_markers, &marker_pool, "m", cats.marking),
                            (RoleKind::Moderator, period.number_moderators, &moderator_pool, "d", cats.moderation),
                        ] {
                            if count == 0 {
                                continue;
                            }
                            let mut row = vec![(x, -(count as f64))];
                            let mut vars = Vec::new();
                            for f in pool {
                                let v = problem.add_binary(format!(
                                    "{prefix}[{},{},{},{}]",
                                    selector.id, period.id, project.id, f
                                ));
                                problem.add_constraint(
                                    format!("{prefix}-link[{},{},{},{}]", selector.id, period.id, project.id, f),
                                    [(v, 1.0), (x, -1.0)],
                                    Comparison::Le,
                                    0.0,
                                );
                                row.push((v, 1.0));
                                vars.push((f.clone(), v));
                                roles.entry(f.clone()).or_default().push(v);

                                let terms = faculty.entry(f.clone()).or_default();
                                terms
                                    .cats
                                    .entry((pclass_id.clone(), kind.category()))
                                    .or_default()
                                    .push((v, unit as f64));
                                terms.marking.push(v);
                                if kind == RoleKind::Marker {
                                    marker_multiplicity
                                        .entry((f.clone(), project.id.clone(), period.id.clone()))
                                        .or_default()
                                        .push(v);
                                }
                            }
                            problem.add_constraint(
                                format!("{prefix}-count[{},{},{}]", selector.id, period.id, project.id),
                                row,
                                Comparison::Eq,
                                0.0,
                            );
                            match kind {
                                RoleKind::Marker => candidate.markers.insert(period.id.clone(), vars),
                                _ => candidate.moderators.insert(period.id.clone(), vars),
                            };
                        }

                        // one role per faculty member per record
                        for (f, mut vars) in roles {
                            if let Some(z) = supervisor_vars.get(&f) {
                                vars.push(*z);
                            }
                            if vars.len() > 1 {
                                problem.add_constraint(
                                    format!("distinct[{},{},{},{}]", selector.id, period.id, project.id, f),
                                    vars.into_iter().map(|v| (v, 1.0)),
                                    Comparison::Le,
                                    1.0,
                                );
                            }
                        }
                    }

                    plan.candidates.push(candidate);
                }

                problem.add_constraint(
                    format!("assign[{}]", selector.id),
                    one_project,
                    Comparison::Eq,
                    1.0,
                );
                plans.push(plan);
            }
        }

        // project capacity per supervisor
        for ((project_id, f), vars) in &capacity {
            let Some(project) = self.facts.project(project_id) else { continue };
            if project.enforce_capacity {
                problem.add_constraint(
                    format!("capacity[{project_id},{f}]"),
                    vars.iter().map(|v| (*v, 1.0)),
                    Comparison::Le,
                    project.capacity as f64,
                );
            }
        }

        if let Some(limit) = config.max_marking_multiplicity {
            for ((f, project_id, period_id), vars) in &marker_multiplicity {
                if vars.len() > limit as usize {
                    problem.add_constraint(
                        format!("marking-multiplicity[{f},{project_id},{period_id}]"),
                        vars.iter().map(|v| (*v, 1.0)),
                        Comparison::Le,
                        limit as f64,
                    );
                }
            }
        }

        self.add_distinct_project_limits(&mut problem, &faculty);
        self.add_cats_limits(&mut problem, &faculty, cats_unit);
        self.add_tension_terms(&mut problem, &faculty, cats_unit, plans.len());

        debug!(
            selectors = plans.len(),
            vars = problem.num_vars(),
            constraints = problem.num_constraints(),
            "matching model built"
        );
        Ok(MatchingModel {
            problem,
            attempt_id: self.attempt.id().to_string(),
            plans,
        })
    }

    fn add_distinct_project_limits(&self, problem: &mut LinearProblem, faculty: &BTreeMap<String, FacultyTerms>) {
        let config = &self.attempt.config;
        if config.max_different_group_projects.is_none() && config.max_different_all_projects.is_none() {
            return;
        }
        for (f, terms) in faculty {
            // y[f,p]: f supervises at least one student on p
            let mut by_project: BTreeMap<&str, VarId> = BTreeMap::new();
            let mut by_class: BTreeMap<&str, Vec<VarId>> = BTreeMap::new();
            for ((pclass_id, project_id), vars) in &terms.projects {
                let y = *by_project
                    .entry(project_id.as_str())
                    .or_insert_with(|| problem.add_binary(format!("y[{f},{project_id}]")));
                for v in vars {
                    problem.add_constraint(
                        format!("y-link[{f},{project_id}]"),
                        [(*v, 1.0), (y, -1.0)],
                        Comparison::Le,
                        0.0,
                    );
                }
                by_class.entry(pclass_id.as_str()).or_default().push(y);
            }
            if let Some(limit) = config.max_different_group_projects {
                for (pclass_id, ys) in &by_class {
                    problem.add_constraint(
                        format!("different-group[{f},{pclass_id}]"),
                        ys.iter().map(|y| (*y, 1.0)),
                        Comparison::Le,
                        limit as f64,
                    );
                }
            }
            if let Some(limit) = config.max_different_all_projects {
                problem.add_constraint(
                    format!("different-all[{f}]"),
                    by_project.values().map(|y| (*y, 1.0)),
                    Comparison::Le,
                    limit as f64,
                );
            }
        }
    }

    fn add_cats_limits(&self, problem: &mut LinearProblem, faculty: &BTreeMap<String, FacultyTerms>, cats_unit: f64) {
        let config = &self.attempt.config;
        let ledger = WorkloadLedger::new(self.facts).with_matchings(self.included.iter().copied());
        let relax = config.ignore_per_faculty_limits;

        for (f, terms) in faculty {
            let pclasses: BTreeSet<&str> = terms.cats.keys().map(|(pc, _)| pc.as_str()).collect();

            let mut scopes: Vec<(Option<&str>, WorkloadScope)> = vec![(None, WorkloadScope::All)];
            scopes.extend(
                pclasses
                    .iter()
                    .map(|pc| (Some(*pc), WorkloadScope::ProjectClass(pc.to_string()))),
            );

            for (pclass, scope) in scopes {
                let limits = effective_limits(
                    self.facts,
                    &config.attempt_limits,
                    &config.limit_overrides,
                    f,
                    pclass,
                    relax,
                );
                let baseline = ledger.totals(f, &scope);
                let label = pclass.unwrap_or("*");

                for category in MATCHING_CATEGORIES {
                    let row: Vec<(VarId, f64)> = terms
                        .cats
                        .iter()
                        .filter(|((pc, c), _)| *c == category && pclass.map_or(true, |p| p == pc.as_str()))
                        .flat_map(|(_, t)| t.iter().copied())
                        .collect();
                    if row.is_empty() {
                        continue;
                    }
                    let used = baseline.get(category) as f64;

                    if let Some(hard) = limits.hard.get(category) {
                        problem.add_constraint(
                            format!("cats[{f},{label},{}]", category.as_str()),
                            row.iter().copied(),
                            Comparison::Le,
                            (hard as f64 - used).max(0.0),
                        );
                    }
                    if let Some(soft) = limits.soft.get(category) {
                        let excess = problem.add_continuous(
                            format!("excess[{f},{label},{}]", category.as_str()),
                            0.0,
                            BIG,
                        );
                        problem.add_objective(excess, -config.cats_violation_penalty / cats_unit);
                        problem.add_constraint(
                            format!("cats-soft[{f},{label},{}]", category.as_str()),
                            row.iter().copied().chain([(excess, -1.0)]),
                            Comparison::Le,
                            (soft as f64 - used).max(0.0),
                        );
                    }
                }
            }
        }
    }

    fn add_tension_terms(
        &self,
        problem: &mut LinearProblem,
        faculty: &BTreeMap<String, FacultyTerms>,
        cats_unit: f64,
        selectors: usize,
    ) {
        let config = &self.attempt.config;
        let ledger = WorkloadLedger::new(self.facts).with_matchings(self.included.iter().copied());

        // total CATS load per faculty member: (terms, committed baseline)
        let loads: BTreeMap<&str, (Vec<(VarId, f64)>, f64)> = faculty
            .iter()
            .map(|(f, terms)| {
                let row = terms.cats.values().flatten().copied().collect();
                let base = ledger.totals(f, &WorkloadScope::All);
                let used = MATCHING_CATEGORIES.iter().map(|c| base.get(*c)).sum::<u32>() as f64;
                (f.as_str(), (row, used))
            })
            .collect();

        let supervisors: BTreeSet<&str> = faculty
            .iter()
            .filter(|(_, t)| !t.supervising.is_empty())
            .map(|(f, _)| f.as_str())
            .collect();
        let markers: BTreeSet<&str> = faculty
            .iter()
            .filter(|(_, t)| !t.marking.is_empty())
            .map(|(f, _)| f.as_str())
            .collect();

        let groups: [(&str, BTreeSet<&str>); 3] = [
            ("supervise", supervisors.difference(&markers).copied().collect()),
            ("mark", markers.difference(&supervisors).copied().collect()),
            ("both", supervisors.intersection(&markers).copied().collect()),
        ];
        if config.levelling_bias > 0.0 {
            for (name, members) in &groups {
                add_spread(problem, name, members, &loads, config.levelling_bias / cats_unit);
            }
        }
        if config.intra_group_tension > 0.0 {
            let everyone: BTreeSet<&str> = loads.keys().copied().collect();
            add_spread(problem, "global", &everyone, &loads, config.intra_group_tension / cats_unit);
        }

        for (name, weight, members, pick) in [
            ("supervising", config.supervising_pressure, &supervisors, true),
            ("marking", config.marking_pressure, &markers, false),
        ] {
            if weight <= 0.0 || members.is_empty() {
                continue;
            }
            let peak = problem.add_continuous(format!("peak[{name}]"), 0.0, BIG);
            problem.add_objective(peak, -weight);
            for f in members {
                let terms = &faculty[*f];
                let vars = if pick { &terms.supervising } else { &terms.marking };
                problem.add_constraint(
                    format!("peak[{name},{f}]"),
                    vars.iter().map(|v| (*v, 1.0)).chain([(peak, -1.0)]),
                    Comparison::Le,
                    0.0,
                );
            }
        }

        if config.no_assignment_penalty > 0.0 && selectors > 0 {
            for f in &supervisors {
                let enrolled = self
                    .attempt
                    .pclass_ids
                    .iter()
                    .any(|pc| self.facts.is_enrolled(f, pc, WorkloadCategory::Supervision));
                if !enrolled {
                    continue;
                }
                let idle = problem.add_binary(format!("idle[{f}]"));
                problem.add_objective(idle, -config.no_assignment_penalty);
                problem.add_constraint(
                    format!("idle[{f}]"),
                    faculty[*f]
                        .supervising
                        .iter()
                        .map(|v| (*v, 1.0))
                        .chain([(idle, 1.0)]),
                    Comparison::Ge,
                    1.0,
                );
            }
        }
    }
}

/// Adds `weight · (max − min)` of the members' loads to the objective.
fn add_spread(
    problem: &mut LinearProblem,
    name: &str,
    members: &BTreeSet<&str>,
    loads: &BTreeMap<&str, (Vec<(VarId, f64)>, f64)>,
    weight: f64,
) {
    if members.len() < 2 {
        return;
    }
    let hi = problem.add_continuous(format!("max[{name}]"), 0.0, BIG);
    let lo = problem.add_continuous(format!("min[{name}]"), 0.0, BIG);
    problem.add_objective(hi, -weight);
    problem.add_objective(lo, weight);
    for f in members {
        let Some((row, used)) = loads.get(f) else { continue };
        problem.add_constraint(
            format!("max[{name},{f}]"),
            row.iter().copied().chain([(hi, -1.0)]),
            Comparison::Le,
            -used,
        );
        problem.add_constraint(
            format!("min[{name},{f}]"),
            row.iter().copied().chain([(lo, -1.0)]),
            Comparison::Ge,
            -used,
        );
    }
}
