//! Attempt store: ownership, lifecycle and manual edits.
//!
//! Each attempt lives behind its own lock. Solves and audits work on cloned
//! snapshots; a verdict is committed under the attempt's lock in one step,
//! so readers never observe a half-materialized attempt. No operation holds
//! two attempt locks at once.
//!
//! Lifecycle transitions (publish, select/deploy, revoke) are serialized
//! and refuse attempts whose validation reports errors.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::jobs::JobQueue;
use crate::matching::{self, attempt_score, effective_rank, MatchingModel, MatchingProblemBuilder, MatchingStats};
use crate::models::{
    FactSnapshot, MatchingAttempt, MatchingRecord, ProjectFacts, Role, RoleKind, ScheduleAttempt,
    ScheduleSlot, Selector,
};
use crate::scheduling::{self, ScheduleModel, ScheduleProblemBuilder, ScheduleStats};
use crate::solver::offline::{self, OfflineExport, SolutionFormat};
use crate::solver::{backend_for, run, SolverBackend, SolverOutcome};
use crate::validation::{EntityKey, EntityKind, ValidationCache, ValidationReport};
use crate::workload::CatsTotals;

type Shared<T> = Arc<Mutex<T>>;

fn poisoned<T>(e: PoisonError<T>) -> EngineError {
    EngineError::LockPoisoned(e.to_string())
}

/// Owns matching and schedule attempts over one catalog snapshot.
#[derive(Debug)]
pub struct AttemptStore {
    facts: RwLock<Arc<FactSnapshot>>,
    matchings: RwLock<BTreeMap<String, Shared<MatchingAttempt>>>,
    schedules: RwLock<BTreeMap<String, Shared<ScheduleAttempt>>>,
    cache: Mutex<ValidationCache>,
    lifecycle: Mutex<()>,
}

impl AttemptStore {
    pub fn new(facts: Arc<FactSnapshot>) -> Self {
        Self {
            facts: RwLock::new(facts),
            matchings: RwLock::new(BTreeMap::new()),
            schedules: RwLock::new(BTreeMap::new()),
            cache: Mutex::new(ValidationCache::new()),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn facts(&self) -> EngineResult<Arc<FactSnapshot>> {
        Ok(Arc::clone(&*self.facts.read().map_err(poisoned)?))
    }

    /// Swaps in a new catalog snapshot and drops cached validation for the
    /// entities that changed.
    pub fn replace_facts(&self, facts: Arc<FactSnapshot>, changed: impl IntoIterator<Item = EntityKey>) -> EngineResult<usize> {
        *self.facts.write().map_err(poisoned)? = facts;
        let mut cache = self.cache()?;
        let dropped = changed
            .into_iter()
            .map(|key| cache.invalidate(key.kind, &key.id))
            .sum();
        Ok(dropped)
    }

    fn cache(&self) -> EngineResult<MutexGuard<'_, ValidationCache>> {
        self.cache.lock().map_err(poisoned)
    }

    fn invalidate(&self, kind: EntityKind, id: &str) -> EngineResult<()> {
        self.cache()?.invalidate(kind, id);
        Ok(())
    }

    fn invalidate_attempt(&self, kind: EntityKind, id: &str) -> EngineResult<()> {
        self.cache()?.invalidate_attempt(kind, id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // matching attempts
    // ------------------------------------------------------------------

    pub fn insert_matching(&self, attempt: MatchingAttempt) -> EngineResult<()> {
        let mut map = self.matchings.write().map_err(poisoned)?;
        if map.contains_key(attempt.id()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "matching attempt '{}' already exists",
                attempt.id()
            )));
        }
        info!(attempt = %attempt.id(), "matching attempt created");
        map.insert(attempt.id().to_string(), Arc::new(Mutex::new(attempt)));
        Ok(())
    }

    pub fn remove_matching(&self, id: &str) -> EngineResult<MatchingAttempt> {
        if self.matching(id)?.selected {
            return Err(EngineError::invalid_state(id, "be removed", "attempt is selected"));
        }
        let handle = self
            .matchings
            .write()
            .map_err(poisoned)?
            .remove(id)
            .ok_or_else(|| EngineError::unknown("matching attempt", id))?;
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;
        let attempt = handle.lock().map_err(poisoned)?.clone();
        Ok(attempt)
    }

    pub fn matching_ids(&self) -> EngineResult<Vec<String>> {
        Ok(self.matchings.read().map_err(poisoned)?.keys().cloned().collect())
    }

    fn matching_handle(&self, id: &str) -> EngineResult<Shared<MatchingAttempt>> {
        self.matchings
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::unknown("matching attempt", id))
    }

    /// Snapshot of one matching attempt.
    pub fn matching(&self, id: &str) -> EngineResult<MatchingAttempt> {
        let handle = self.matching_handle(id)?;
        let attempt = handle.lock().map_err(poisoned)?.clone();
        Ok(attempt)
    }

    fn with_matching<R>(&self, id: &str, f: impl FnOnce(&mut MatchingAttempt) -> EngineResult<R>) -> EngineResult<R> {
        let handle = self.matching_handle(id)?;
        let mut attempt = handle.lock().map_err(poisoned)?;
        f(&mut *attempt)
    }

    /// Snapshots of the base and included attempts of `attempt`.
    fn matching_context(&self, attempt: &MatchingAttempt) -> EngineResult<(Option<MatchingAttempt>, Vec<MatchingAttempt>)> {
        let base = attempt
            .meta
            .base_id
            .as_deref()
            .map(|b| self.matching(b))
            .transpose()?;
        let included = attempt
            .meta
            .include_ids
            .iter()
            .map(|i| self.matching(i))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok((base, included))
    }

    fn matching_model(&self, facts: &FactSnapshot, attempt: &MatchingAttempt) -> EngineResult<(MatchingModel, Duration)> {
        let started = Instant::now();
        let (base, included) = self.matching_context(attempt)?;
        let mut builder = MatchingProblemBuilder::new(facts, attempt).with_included(included.iter());
        if let Some(base) = &base {
            builder = builder.with_base(base);
        }
        let model = builder.build()?;
        Ok((model, started.elapsed()))
    }

    /// Solves with the backend named in the attempt's configuration.
    pub fn solve_matching(&self, id: &str) -> EngineResult<SolverOutcome> {
        let backend = backend_for(self.matching(id)?.config.solver);
        self.solve_matching_with(id, backend.as_ref())
    }

    #[instrument(skip(self, backend), fields(backend = ?backend.kind()))]
    pub fn solve_matching_with(&self, id: &str, backend: &dyn SolverBackend) -> EngineResult<SolverOutcome> {
        self.run_matching_solve(id, backend, None)?
            .ok_or_else(|| EngineError::invalid_state(id, "solve", "solve was superseded"))
    }

    /// Builds, solves and commits. With a `task`, the result is only
    /// committed if the attempt still belongs to that job.
    fn run_matching_solve(
        &self,
        id: &str,
        backend: &dyn SolverBackend,
        task: Option<Uuid>,
    ) -> EngineResult<Option<SolverOutcome>> {
        let facts = self.facts()?;
        let snapshot = self.matching(id)?;
        if snapshot.selected {
            return Err(EngineError::invalid_state(id, "solve", "attempt is selected"));
        }
        let (model, construct_time) = self.matching_model(&facts, &snapshot)?;
        debug!(
            vars = model.problem.num_vars(),
            constraints = model.problem.num_constraints(),
            "matching model built"
        );
        let verdict = run(backend, &model.problem);

        let committed = self.with_matching(id, |attempt| {
            if task.is_some() && attempt.meta.task_id != task {
                debug!(?task, "stale job result discarded");
                return Ok(false);
            }
            matching::materialize(attempt, &facts, &model, &verdict, construct_time)?;
            attempt.meta.job_finished = task.is_some();
            Ok(true)
        })?;
        if !committed {
            return Ok(None);
        }
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;
        Ok(Some(verdict.outcome))
    }

    /// Queues a solve. The attempt is reset and tagged with the job id.
    pub fn submit_matching_solve(self: &Arc<Self>, queue: &dyn JobQueue, id: &str) -> EngineResult<Uuid> {
        let task = Uuid::new_v4();
        let solver = self.with_matching(id, |attempt| {
            if attempt.selected {
                return Err(EngineError::invalid_state(id, "solve", "attempt is selected"));
            }
            attempt.meta.reset_solve();
            attempt.meta.task_id = Some(task);
            Ok(attempt.config.solver)
        })?;
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;

        let store = Arc::clone(self);
        let attempt_id = id.to_string();
        queue.submit(
            task,
            Box::new(move || {
                let backend = backend_for(solver);
                store.run_matching_solve(&attempt_id, backend.as_ref(), Some(task)).map(|_| ())
            }),
        );
        info!(attempt = id, %task, "matching solve queued");
        Ok(task)
    }

    /// Detaches the running job. The attempt stays unfinished.
    pub fn revoke_matching_job(&self, queue: &dyn JobQueue, id: &str) -> EngineResult<Uuid> {
        let task = self.with_matching(id, |attempt| {
            let task = attempt
                .meta
                .task_id
                .take()
                .ok_or_else(|| EngineError::invalid_state(id, "revoke its job", "no job is attached"))?;
            queue.revoke(task);
            attempt.meta.finished = false;
            attempt.meta.job_finished = false;
            warn!(attempt = id, %task, "matching job revoked");
            Ok(task)
        })?;
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;
        Ok(task)
    }

    /// Writes the attempt's problem for offline solving.
    pub fn export_matching(&self, id: &str, dir: &Path) -> EngineResult<OfflineExport> {
        let facts = self.facts()?;
        let snapshot = self.matching(id)?;
        let (model, _) = self.matching_model(&facts, &snapshot)?;
        let export = offline::export(&model.problem, dir, &id.replace('/', "_"))?;
        self.with_matching(id, |attempt| {
            attempt.meta.reset_solve();
            attempt.meta.awaiting_upload = true;
            Ok(())
        })?;
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;
        Ok(export)
    }

    /// Commits an uploaded solution to an exported attempt.
    ///
    /// The model is rebuilt from the same facts, so variable names and
    /// columns match the export.
    pub fn upload_matching(&self, id: &str, raw: &str, format: SolutionFormat) -> EngineResult<SolverOutcome> {
        let facts = self.facts()?;
        let snapshot = self.matching(id)?;
        if !snapshot.meta.awaiting_upload {
            return Err(EngineError::invalid_state(id, "accept an upload", "no problem was exported"));
        }
        let (model, construct_time) = self.matching_model(&facts, &snapshot)?;
        let verdict = offline::read_solution(&model.problem, raw, format)?;
        self.with_matching(id, |attempt| {
            matching::materialize(attempt, &facts, &model, &verdict, construct_time)
        })?;
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;
        info!(attempt = id, outcome = ?verdict.outcome, "solution uploaded");
        Ok(verdict.outcome)
    }

    pub fn validate_matching(&self, id: &str) -> EngineResult<ValidationReport> {
        let facts = self.facts()?;
        let snapshot = self.matching(id)?;
        let (_, included) = self.matching_context(&snapshot)?;
        let refs: Vec<&MatchingAttempt> = included.iter().collect();
        Ok(self.cache()?.validate_matching(&facts, &snapshot, &refs))
    }

    pub fn matching_stats(&self, id: &str) -> EngineResult<MatchingStats> {
        let facts = self.facts()?;
        Ok(MatchingStats::calculate(&self.matching(id)?, &facts))
    }

    /// CATS a faculty member carries in an attempt and its included attempts.
    pub fn faculty_totals(&self, id: &str, faculty_id: &str) -> EngineResult<CatsTotals> {
        let facts = self.facts()?;
        let snapshot = self.matching(id)?;
        let (_, included) = self.matching_context(&snapshot)?;
        let refs: Vec<&MatchingAttempt> = included.iter().collect();
        Ok(self.cache()?.matching_totals(&facts, &snapshot, &refs, faculty_id))
    }

    fn ensure_no_errors(&self, id: &str, report: &ValidationReport) -> EngineResult<()> {
        if report.has_errors() {
            return Err(EngineError::ValidationBlocked {
                attempt_id: id.to_string(),
                count: report.errors.len(),
            });
        }
        Ok(())
    }

    pub fn publish_matching(&self, id: &str) -> EngineResult<()> {
        let _guard = self.lifecycle.lock().map_err(poisoned)?;
        let report = self.validate_matching(id)?;
        self.with_matching(id, |attempt| {
            if !attempt.meta.is_solved() {
                return Err(EngineError::invalid_state(id, "be published", "attempt has no solution"));
            }
            self.ensure_no_errors(id, &report)?;
            attempt.meta.published = true;
            info!(attempt = id, "matching published");
            Ok(())
        })
    }

    pub fn unpublish_matching(&self, id: &str) -> EngineResult<()> {
        self.with_matching(id, |attempt| {
            attempt.meta.published = false;
            Ok(())
        })
    }

    /// Marks the attempt as the selected matching for its scope.
    pub fn select_matching(&self, id: &str) -> EngineResult<()> {
        let _guard = self.lifecycle.lock().map_err(poisoned)?;
        let report = self.validate_matching(id)?;
        let snapshot = self.matching(id)?;
        if !snapshot.meta.is_solved() {
            return Err(EngineError::invalid_state(id, "be selected", "attempt has no solution"));
        }
        self.ensure_no_errors(id, &report)?;

        for other_id in self.matching_ids()? {
            if other_id == id {
                continue;
            }
            let other = self.matching(&other_id)?;
            if other.selected && other.shares_scope(&snapshot) {
                return Err(EngineError::ScopeConflict {
                    holder: other_id,
                    flag: "selected",
                });
            }
        }
        self.with_matching(id, |attempt| {
            attempt.selected = true;
            info!(attempt = id, "matching selected");
            Ok(())
        })
    }

    pub fn revoke_matching(&self, id: &str) -> EngineResult<()> {
        let _guard = self.lifecycle.lock().map_err(poisoned)?;
        self.with_matching(id, |attempt| {
            if !attempt.is_revokable() {
                return Err(EngineError::invalid_state(id, "be revoked", "attempt is not selected"));
            }
            attempt.selected = false;
            warn!(attempt = id, "matching selection revoked");
            Ok(())
        })
    }

    /// New attempt with the same scope and configuration, but no results.
    pub fn duplicate_matching(&self, id: &str, new_id: &str, name: &str) -> EngineResult<()> {
        let source = self.matching(id)?;
        let mut copy = MatchingAttempt::new(new_id, name, source.year).with_config(source.config.clone());
        copy.pclass_ids = source.pclass_ids.clone();
        copy.meta.base_id = source.meta.base_id.clone();
        copy.meta.include_ids = source.meta.include_ids.clone();
        self.insert_matching(copy)
    }

    pub fn revert_matching(&self, id: &str) -> EngineResult<usize> {
        let facts = self.facts()?;
        let changed = self.with_matching(id, |attempt| Ok(matching::revert(attempt, &facts)))?;
        self.invalidate_attempt(EntityKind::MatchingAttempt, id)?;
        Ok(changed)
    }

    /// Applies `edit` to one record, snapshotting it first.
    fn edit_record(
        &self,
        id: &str,
        selector_id: &str,
        period_id: &str,
        edit: impl FnOnce(&mut MatchingRecord) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let facts = self.facts()?;
        let record_id = self.with_matching(id, |attempt| {
            let record = attempt
                .record_mut(selector_id, period_id)
                .ok_or_else(|| EngineError::unknown("record", format!("{id}/{selector_id}/{period_id}")))?;
            let before = record.clone();
            record.ensure_original();
            if let Err(e) = edit(&mut *record) {
                *record = before;
                return Err(e);
            }
            let record_id = record.id.clone();
            attempt.meta.score = attempt_score(&attempt.config, &facts, &attempt.records);
            attempt.meta.touch();
            Ok(record_id)
        })?;
        self.invalidate(EntityKind::Record, &record_id)?;
        self.invalidate(EntityKind::MatchingAttempt, id)
    }

    /// Moves a student to another project. The project owner replaces the
    /// current supervisors.
    pub fn reassign_project(&self, id: &str, selector_id: &str, period_id: &str, project_id: &str) -> EngineResult<()> {
        let facts = self.facts()?;
        let project = facts.require_project(project_id)?;
        let selector = facts
            .selector(selector_id)
            .ok_or_else(|| EngineError::unknown("selector", selector_id))?;
        self.edit_record(id, selector_id, period_id, |record| {
            assign_project(record, selector, project, None);
            Ok(())
        })?;
        info!(attempt = id, selector = selector_id, project = project_id, "project reassigned");
        Ok(())
    }

    /// Moves a student to an alternative of their current (or original)
    /// project.
    pub fn reassign_alternative(&self, id: &str, selector_id: &str, period_id: &str, project_id: &str) -> EngineResult<()> {
        let facts = self.facts()?;
        let project = facts.require_project(project_id)?;
        let selector = facts
            .selector(selector_id)
            .ok_or_else(|| EngineError::unknown("selector", selector_id))?;
        self.edit_record(id, selector_id, period_id, |record| {
            let mut sources = vec![record.project_id.clone()];
            if let Some(orig) = &record.original {
                sources.push(orig.project_id.clone());
            }
            let priority = sources
                .iter()
                .filter_map(|p| facts.project(p))
                .flat_map(|p| p.alternatives())
                .find(|alt| alt.project_id == project_id)
                .map(|alt| alt.priority)
                .ok_or_else(|| {
                    EngineError::invalid_state(
                        id,
                        "reassign an alternative",
                        format!("'{project_id}' is not an alternative of '{}'", record.project_id),
                    )
                })?;
            assign_project(record, selector, project, Some(priority));
            Ok(())
        })
    }

    pub fn add_role(&self, id: &str, selector_id: &str, period_id: &str, user_id: &str, kind: RoleKind) -> EngineResult<()> {
        let facts = self.facts()?;
        if facts.faculty_member(user_id).is_none() {
            return Err(EngineError::unknown("faculty member", user_id));
        }
        self.edit_record(id, selector_id, period_id, |record| {
            if !record.roles.insert(Role::new(user_id, kind)) {
                return Err(EngineError::invalid_state(
                    id,
                    "add a role",
                    format!("'{user_id}' already is {} on '{}'", kind.as_str(), record.id),
                ));
            }
            Ok(())
        })
    }

    pub fn remove_role(&self, id: &str, selector_id: &str, period_id: &str, user_id: &str, kind: RoleKind) -> EngineResult<()> {
        self.edit_record(id, selector_id, period_id, |record| {
            if !record.roles.remove(&Role::new(user_id, kind)) {
                return Err(EngineError::invalid_state(
                    id,
                    "remove a role",
                    format!("'{user_id}' is not {} on '{}'", kind.as_str(), record.id),
                ));
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // schedule attempts
    // ------------------------------------------------------------------

    pub fn insert_schedule(&self, attempt: ScheduleAttempt) -> EngineResult<()> {
        let mut map = self.schedules.write().map_err(poisoned)?;
        if map.contains_key(attempt.id()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "schedule attempt '{}' already exists",
                attempt.id()
            )));
        }
        info!(attempt = %attempt.id(), assessment = %attempt.assessment_id, "schedule attempt created");
        map.insert(attempt.id().to_string(), Arc::new(Mutex::new(attempt)));
        Ok(())
    }

    pub fn remove_schedule(&self, id: &str) -> EngineResult<ScheduleAttempt> {
        if self.schedule(id)?.deployed {
            return Err(EngineError::invalid_state(id, "be removed", "attempt is deployed"));
        }
        let handle = self
            .schedules
            .write()
            .map_err(poisoned)?
            .remove(id)
            .ok_or_else(|| EngineError::unknown("schedule attempt", id))?;
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;
        let attempt = handle.lock().map_err(poisoned)?.clone();
        Ok(attempt)
    }

    pub fn schedule_ids(&self) -> EngineResult<Vec<String>> {
        Ok(self.schedules.read().map_err(poisoned)?.keys().cloned().collect())
    }

    fn schedule_handle(&self, id: &str) -> EngineResult<Shared<ScheduleAttempt>> {
        self.schedules
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::unknown("schedule attempt", id))
    }

    /// Snapshot of one schedule attempt.
    pub fn schedule(&self, id: &str) -> EngineResult<ScheduleAttempt> {
        let handle = self.schedule_handle(id)?;
        let attempt = handle.lock().map_err(poisoned)?.clone();
        Ok(attempt)
    }

    fn with_schedule<R>(&self, id: &str, f: impl FnOnce(&mut ScheduleAttempt) -> EngineResult<R>) -> EngineResult<R> {
        let handle = self.schedule_handle(id)?;
        let mut attempt = handle.lock().map_err(poisoned)?;
        f(&mut *attempt)
    }

    fn schedule_context(&self, attempt: &ScheduleAttempt) -> EngineResult<(Option<ScheduleAttempt>, Vec<ScheduleAttempt>)> {
        let base = attempt
            .meta
            .base_id
            .as_deref()
            .map(|b| self.schedule(b))
            .transpose()?;
        let included = attempt
            .meta
            .include_ids
            .iter()
            .map(|i| self.schedule(i))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok((base, included))
    }

    fn schedule_model(&self, facts: &FactSnapshot, attempt: &ScheduleAttempt) -> EngineResult<(ScheduleModel, Duration)> {
        let started = Instant::now();
        let (base, included) = self.schedule_context(attempt)?;
        let mut builder = ScheduleProblemBuilder::new(facts, attempt).with_included(included.iter());
        if let Some(base) = &base {
            builder = builder.with_base(base);
        }
        let model = builder.build()?;
        Ok((model, started.elapsed()))
    }

    pub fn solve_schedule(&self, id: &str) -> EngineResult<SolverOutcome> {
        let backend = backend_for(self.schedule(id)?.config.solver);
        self.solve_schedule_with(id, backend.as_ref())
    }

    #[instrument(skip(self, backend), fields(backend = ?backend.kind()))]
    pub fn solve_schedule_with(&self, id: &str, backend: &dyn SolverBackend) -> EngineResult<SolverOutcome> {
        self.run_schedule_solve(id, backend, None)?
            .ok_or_else(|| EngineError::invalid_state(id, "solve", "solve was superseded"))
    }

    fn run_schedule_solve(
        &self,
        id: &str,
        backend: &dyn SolverBackend,
        task: Option<Uuid>,
    ) -> EngineResult<Option<SolverOutcome>> {
        let facts = self.facts()?;
        let snapshot = self.schedule(id)?;
        if snapshot.deployed {
            return Err(EngineError::invalid_state(id, "solve", "attempt is deployed"));
        }
        let (model, construct_time) = self.schedule_model(&facts, &snapshot)?;
        debug!(
            vars = model.problem.num_vars(),
            constraints = model.problem.num_constraints(),
            "schedule model built"
        );
        let verdict = run(backend, &model.problem);

        let committed = self.with_schedule(id, |attempt| {
            if task.is_some() && attempt.meta.task_id != task {
                debug!(?task, "stale job result discarded");
                return Ok(false);
            }
            scheduling::materialize(attempt, &model, &verdict, construct_time)?;
            attempt.meta.job_finished = task.is_some();
            Ok(true)
        })?;
        if !committed {
            return Ok(None);
        }
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;
        Ok(Some(verdict.outcome))
    }

    pub fn submit_schedule_solve(self: &Arc<Self>, queue: &dyn JobQueue, id: &str) -> EngineResult<Uuid> {
        let task = Uuid::new_v4();
        let solver = self.with_schedule(id, |attempt| {
            if attempt.deployed {
                return Err(EngineError::invalid_state(id, "solve", "attempt is deployed"));
            }
            attempt.meta.reset_solve();
            attempt.meta.task_id = Some(task);
            Ok(attempt.config.solver)
        })?;
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;

        let store = Arc::clone(self);
        let attempt_id = id.to_string();
        queue.submit(
            task,
            Box::new(move || {
                let backend = backend_for(solver);
                store.run_schedule_solve(&attempt_id, backend.as_ref(), Some(task)).map(|_| ())
            }),
        );
        info!(attempt = id, %task, "schedule solve queued");
        Ok(task)
    }

    pub fn revoke_schedule_job(&self, queue: &dyn JobQueue, id: &str) -> EngineResult<Uuid> {
        let task = self.with_schedule(id, |attempt| {
            let task = attempt
                .meta
                .task_id
                .take()
                .ok_or_else(|| EngineError::invalid_state(id, "revoke its job", "no job is attached"))?;
            queue.revoke(task);
            attempt.meta.finished = false;
            attempt.meta.job_finished = false;
            warn!(attempt = id, %task, "schedule job revoked");
            Ok(task)
        })?;
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;
        Ok(task)
    }

    pub fn export_schedule(&self, id: &str, dir: &Path) -> EngineResult<OfflineExport> {
        let facts = self.facts()?;
        let snapshot = self.schedule(id)?;
        let (model, _) = self.schedule_model(&facts, &snapshot)?;
        let export = offline::export(&model.problem, dir, &id.replace('/', "_"))?;
        self.with_schedule(id, |attempt| {
            attempt.meta.reset_solve();
            attempt.meta.awaiting_upload = true;
            Ok(())
        })?;
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;
        Ok(export)
    }

    pub fn upload_schedule(&self, id: &str, raw: &str, format: SolutionFormat) -> EngineResult<SolverOutcome> {
        let facts = self.facts()?;
        let snapshot = self.schedule(id)?;
        if !snapshot.meta.awaiting_upload {
            return Err(EngineError::invalid_state(id, "accept an upload", "no problem was exported"));
        }
        let (model, construct_time) = self.schedule_model(&facts, &snapshot)?;
        let verdict = offline::read_solution(&model.problem, raw, format)?;
        self.with_schedule(id, |attempt| {
            scheduling::materialize(attempt, &model, &verdict, construct_time)
        })?;
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;
        info!(attempt = id, outcome = ?verdict.outcome, "solution uploaded");
        Ok(verdict.outcome)
    }

    pub fn validate_schedule(&self, id: &str) -> EngineResult<ValidationReport> {
        let facts = self.facts()?;
        let snapshot = self.schedule(id)?;
        let (_, included) = self.schedule_context(&snapshot)?;
        let refs: Vec<&ScheduleAttempt> = included.iter().collect();
        Ok(self.cache()?.validate_schedule(&facts, &snapshot, &refs))
    }

    pub fn schedule_stats(&self, id: &str) -> EngineResult<ScheduleStats> {
        let facts = self.facts()?;
        Ok(ScheduleStats::calculate(&self.schedule(id)?, &facts))
    }

    pub fn publish_schedule(&self, id: &str) -> EngineResult<()> {
        let _guard = self.lifecycle.lock().map_err(poisoned)?;
        let report = self.validate_schedule(id)?;
        self.with_schedule(id, |attempt| {
            if !attempt.meta.is_solved() {
                return Err(EngineError::invalid_state(id, "be published", "attempt has no solution"));
            }
            self.ensure_no_errors(id, &report)?;
            attempt.meta.published = true;
            info!(attempt = id, "schedule published");
            Ok(())
        })
    }

    /// Marks the attempt as the deployed schedule of its assessment.
    pub fn deploy_schedule(&self, id: &str) -> EngineResult<()> {
        let _guard = self.lifecycle.lock().map_err(poisoned)?;
        let report = self.validate_schedule(id)?;
        let snapshot = self.schedule(id)?;
        if !snapshot.meta.is_solved() {
            return Err(EngineError::invalid_state(id, "be deployed", "attempt has no solution"));
        }
        self.ensure_no_errors(id, &report)?;

        for other_id in self.schedule_ids()? {
            if other_id == id {
                continue;
            }
            let other = self.schedule(&other_id)?;
            if other.deployed && other.assessment_id == snapshot.assessment_id {
                return Err(EngineError::ScopeConflict {
                    holder: other_id,
                    flag: "deployed",
                });
            }
        }
        self.with_schedule(id, |attempt| {
            attempt.deployed = true;
            info!(attempt = id, "schedule deployed");
            Ok(())
        })
    }

    /// Withdraws a deployed schedule, provided none of its sessions lies
    /// before `today`.
    pub fn revoke_schedule(&self, id: &str, today: NaiveDate) -> EngineResult<()> {
        let _guard = self.lifecycle.lock().map_err(poisoned)?;
        let facts = self.facts()?;
        self.with_schedule(id, |attempt| {
            if !attempt.is_revokable(&facts, today) {
                return Err(EngineError::invalid_state(
                    id,
                    "be revoked",
                    "attempt is not deployed or a session has already taken place",
                ));
            }
            attempt.deployed = false;
            warn!(attempt = id, "schedule deployment revoked");
            Ok(())
        })
    }

    pub fn duplicate_schedule(&self, id: &str, new_id: &str, name: &str) -> EngineResult<()> {
        let source = self.schedule(id)?;
        let mut copy =
            ScheduleAttempt::new(new_id, name, source.assessment_id.clone()).with_config(source.config.clone());
        copy.meta.base_id = source.meta.base_id.clone();
        copy.meta.include_ids = source.meta.include_ids.clone();
        self.insert_schedule(copy)
    }

    pub fn revert_schedule(&self, id: &str) -> EngineResult<usize> {
        let changed = self.with_schedule(id, |attempt| Ok(scheduling::revert(attempt)))?;
        self.invalidate_attempt(EntityKind::ScheduleAttempt, id)?;
        Ok(changed)
    }

    fn after_slot_edit(&self, id: &str, slot_ids: &[String]) -> EngineResult<()> {
        let mut cache = self.cache()?;
        for slot in slot_ids {
            cache.invalidate(EntityKind::Slot, slot);
        }
        cache.invalidate(EntityKind::ScheduleAttempt, id);
        Ok(())
    }

    /// Moves a talk into the slot `(session_id, room_id)`, creating it if
    /// needed.
    pub fn move_talk(&self, id: &str, talk_id: &str, session_id: &str, room_id: &str) -> EngineResult<()> {
        let facts = self.facts()?;
        if facts.talk(talk_id).is_none() {
            return Err(EngineError::unknown("talk", talk_id));
        }
        let session = facts
            .session(session_id)
            .ok_or_else(|| EngineError::unknown("session", session_id))?;
        if !session.room_ids.iter().any(|r| r == room_id) {
            return Err(EngineError::unknown("room", format!("{session_id}/{room_id}")));
        }

        let touched = self.with_schedule(id, |attempt| {
            let target_id = ScheduleSlot::new(id, session_id, room_id).id;
            if attempt.slot_of_talk(talk_id).map(|s| s.id.as_str()) == Some(target_id.as_str()) {
                return Ok(Vec::new());
            }
            let mut touched = Vec::new();
            if let Some(source) = attempt.slots.iter_mut().find(|s| s.talks.contains(talk_id)) {
                source.ensure_original();
                source.talks.remove(talk_id);
                touched.push(source.id.clone());
            }
            let target = match attempt.slots.iter().position(|s| s.id == target_id) {
                Some(i) => &mut attempt.slots[i],
                None => {
                    attempt.slots.push(ScheduleSlot::new(id, session_id, room_id));
                    let last = attempt.slots.len() - 1;
                    &mut attempt.slots[last]
                }
            };
            target.ensure_original();
            target.talks.insert(talk_id.to_string());
            touched.push(target_id);
            attempt.meta.touch();
            Ok(touched)
        })?;
        self.after_slot_edit(id, &touched)?;
        info!(attempt = id, talk = talk_id, session = session_id, room = room_id, "talk moved");
        Ok(())
    }

    fn edit_slot(
        &self,
        id: &str,
        session_id: &str,
        room_id: &str,
        edit: impl FnOnce(&mut ScheduleSlot) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let slot_id = self.with_schedule(id, |attempt| {
            let slot = attempt
                .slots
                .iter_mut()
                .find(|s| s.session_id == session_id && s.room_id == room_id)
                .ok_or_else(|| EngineError::unknown("slot", format!("{id}/{session_id}/{room_id}")))?;
            let before = slot.clone();
            slot.ensure_original();
            if let Err(e) = edit(&mut *slot) {
                *slot = before;
                return Err(e);
            }
            let slot_id = slot.id.clone();
            attempt.meta.touch();
            Ok(slot_id)
        })?;
        self.after_slot_edit(id, &[slot_id])
    }

    pub fn add_assessor(&self, id: &str, session_id: &str, room_id: &str, faculty_id: &str) -> EngineResult<()> {
        if self.facts()?.faculty_member(faculty_id).is_none() {
            return Err(EngineError::unknown("faculty member", faculty_id));
        }
        self.edit_slot(id, session_id, room_id, |slot| {
            if !slot.assessors.insert(faculty_id.to_string()) {
                return Err(EngineError::invalid_state(
                    id,
                    "add an assessor",
                    format!("'{faculty_id}' already sits on '{}'", slot.id),
                ));
            }
            Ok(())
        })
    }

    pub fn remove_assessor(&self, id: &str, session_id: &str, room_id: &str, faculty_id: &str) -> EngineResult<()> {
        self.edit_slot(id, session_id, room_id, |slot| {
            if !slot.assessors.remove(faculty_id) {
                return Err(EngineError::invalid_state(
                    id,
                    "remove an assessor",
                    format!("'{faculty_id}' does not sit on '{}'", slot.id),
                ));
            }
            Ok(())
        })
    }
}

/// Points a record at `project`: rank from the selector's list, owner as
/// supervisor, optionally flagged as an alternative.
fn assign_project(record: &mut MatchingRecord, selector: &Selector, project: &ProjectFacts, alternative: Option<u32>) {
    record.project_id = project.id.clone();
    record.rank = effective_rank(selector, &project.id);
    record.alternative = alternative.is_some();
    record.priority = alternative;
    record
        .roles
        .retain(|r| !matches!(r.kind, RoleKind::Supervisor | RoleKind::ResponsibleSupervisor));
    if let Some(owner) = &project.owner_id {
        record.roles.insert(Role::new(owner.as_str(), RoleKind::Supervisor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ImmediateJobQueue, Job, JobStatus};
    use crate::models::{
        Assessment, CatsValues, EnrollmentRecord, Faculty, PresentationSession, ProjectClass, Room,
        SubmissionPeriod, Talk,
    };
    use crate::solver::offline::{read_problem, UploadedSolution};
    use crate::solver::PackagedMilp;
    use crate::validation::{ValidationState, ValidationStatus};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn facts() -> Arc<FactSnapshot> {
        Arc::new(
            FactSnapshot::new()
                .with_pclass(ProjectClass::new("PC1", CatsValues::new(10, 3, 0, 1)))
                .with_period(SubmissionPeriod::new("T1", "PC1").with_assessors(1))
                .with_faculty(Faculty::new("F1"))
                .with_faculty(Faculty::new("F2"))
                .with_enrollment(EnrollmentRecord::new("F1", "PC1"))
                .with_enrollment(EnrollmentRecord::new("F2", "PC1"))
                .with_project(ProjectFacts::new("P1", "PC1").with_owner("F1").with_capacity(1))
                .with_project(
                    ProjectFacts::new("P2", "PC1")
                        .with_owner("F2")
                        .with_capacity(2)
                        .with_alternative("P3", 1),
                )
                .with_project(ProjectFacts::new("P3", "PC1").with_owner("F1").with_capacity(2))
                .with_selector(Selector::new("S1", "PC1").with_choice("P1", 1).with_choice("P2", 2))
                .with_room(Room::new("R1", 4))
                .with_session(PresentationSession::new("D1", day(12)).with_room("R1"))
                .with_session(PresentationSession::new("D2", day(13)).with_room("R1"))
                .with_talk(Talk::new("K1", "S1", "P1", "T1").with_supervisor("F1"))
                .with_assessment(
                    Assessment::new("AS")
                        .with_period("T1")
                        .with_session("D1")
                        .with_session("D2")
                        .with_assessor("F2")
                        .with_talk("K1"),
                ),
        )
    }

    fn store_with_matching() -> AttemptStore {
        crate::logging::init_test();
        let store = AttemptStore::new(facts());
        store
            .insert_matching(MatchingAttempt::new("A", "first", 2025).with_pclass("PC1"))
            .unwrap();
        store
    }

    #[test]
    fn test_solve_select_and_scope_conflict() {
        let store = store_with_matching();
        assert_eq!(store.solve_matching_with("A", &PackagedMilp).unwrap(), SolverOutcome::Optimal);
        let a = store.matching("A").unwrap();
        assert_eq!(a.record("S1", "T1").unwrap().project_id, "P1");

        store.publish_matching("A").unwrap();
        store.select_matching("A").unwrap();
        assert!(store.matching("A").unwrap().selected);
        // selected attempts cannot be re-solved
        assert!(store.solve_matching_with("A", &PackagedMilp).is_err());

        store.duplicate_matching("A", "B", "second").unwrap();
        store.solve_matching_with("B", &PackagedMilp).unwrap();
        assert!(matches!(
            store.select_matching("B"),
            Err(EngineError::ScopeConflict { ref holder, .. }) if holder == "A"
        ));

        store.revoke_matching("A").unwrap();
        store.select_matching("B").unwrap();
        assert!(store.revoke_matching("A").is_err());
    }

    #[test]
    fn test_duplicate_copies_configuration_only() {
        let store = store_with_matching();
        store.solve_matching_with("A", &PackagedMilp).unwrap();
        store.duplicate_matching("A", "B", "copy").unwrap();

        let b = store.matching("B").unwrap();
        assert!(b.records.is_empty());
        assert!(!b.meta.finished);
        assert_eq!(b.pclass_ids, store.matching("A").unwrap().pclass_ids);
        assert!(store.duplicate_matching("A", "B", "again").is_err());
    }

    #[test]
    fn test_validation_errors_block_selection() {
        let store = store_with_matching();
        store.solve_matching_with("A", &PackagedMilp).unwrap();
        store.remove_role("A", "S1", "T1", "F2", RoleKind::Marker).unwrap();

        let report = store.validate_matching("A").unwrap();
        assert_eq!(report.errors_in("markers").count(), 1);
        assert!(matches!(
            store.select_matching("A"),
            Err(EngineError::ValidationBlocked { count: 1, .. })
        ));

        store.add_role("A", "S1", "T1", "F2", RoleKind::Marker).unwrap();
        assert!(store.add_role("A", "S1", "T1", "F2", RoleKind::Marker).is_err());
        store.select_matching("A").unwrap();
    }

    #[test]
    fn test_manual_edit_invalidates_and_reverts() {
        let store = store_with_matching();
        store.solve_matching_with("A", &PackagedMilp).unwrap();
        store.validate_matching("A").unwrap();
        assert_eq!(
            store.cache().unwrap().state(EntityKind::Record, "A/S1/T1"),
            ValidationState::Validated(ValidationStatus::Ok)
        );

        store.reassign_project("A", "S1", "T1", "P2").unwrap();
        assert_eq!(
            store.cache().unwrap().state(EntityKind::Record, "A/S1/T1"),
            ValidationState::Unvalidated
        );
        let record = store.matching("A").unwrap().record("S1", "T1").cloned().unwrap();
        assert_eq!(record.project_id, "P2");
        assert_eq!(record.rank, Some(2));
        assert_eq!(record.supervisors(), vec!["F2"]);
        assert_eq!(record.original.as_ref().unwrap().project_id, "P1");

        // P3 is an alternative of P2
        store.reassign_alternative("A", "S1", "T1", "P3").unwrap();
        let record = store.matching("A").unwrap().record("S1", "T1").cloned().unwrap();
        assert!(record.alternative);
        assert_eq!(record.priority, Some(1));
        assert_eq!(record.rank, None);
        assert!(store.reassign_alternative("A", "S1", "T1", "P1").is_err());

        assert_eq!(store.revert_matching("A").unwrap(), 1);
        let record = store.matching("A").unwrap().record("S1", "T1").cloned().unwrap();
        assert_eq!(record.project_id, "P1");
        assert!(!record.alternative);
    }

    #[test]
    fn test_offline_export_and_upload() {
        let store = store_with_matching();
        let dir = tempfile::tempdir().unwrap();
        let export = store.export_matching("A", dir.path()).unwrap();
        assert!(store.matching("A").unwrap().meta.awaiting_upload);

        // solve the exported problem elsewhere
        let problem = read_problem(&export.problem_path).unwrap();
        let verdict = run(&PackagedMilp, &problem);
        let upload = UploadedSolution {
            outcome: verdict.outcome,
            objective: verdict.objective,
            values: problem
                .variables
                .iter()
                .zip(&verdict.values)
                .map(|(v, x)| (v.name.clone(), *x))
                .collect(),
        };
        let raw = serde_json::to_string(&upload).unwrap();

        let outcome = store.upload_matching("A", &raw, SolutionFormat::Json).unwrap();
        assert_eq!(outcome, SolverOutcome::Optimal);
        let a = store.matching("A").unwrap();
        assert!(!a.meta.awaiting_upload);
        assert_eq!(a.record("S1", "T1").unwrap().project_id, "P1");
        assert!(store.upload_matching("A", &raw, SolutionFormat::Json).is_err());
    }

    #[derive(Default)]
    struct HeldQueue {
        jobs: Mutex<Vec<(Uuid, Job)>>,
    }

    impl JobQueue for HeldQueue {
        fn submit(&self, id: Uuid, job: Job) {
            self.jobs.lock().unwrap().push((id, job));
        }

        fn status(&self, _id: Uuid) -> Option<JobStatus> {
            None
        }

        fn revoke(&self, _id: Uuid) -> bool {
            true
        }
    }

    #[test]
    fn test_queued_solve_commits() {
        let store = Arc::new(store_with_matching());
        let queue = ImmediateJobQueue::new();
        let task = store.submit_matching_solve(&queue, "A").unwrap();

        assert_eq!(queue.status(task), Some(JobStatus::Succeeded));
        let a = store.matching("A").unwrap();
        assert_eq!(a.meta.task_id, Some(task));
        assert!(a.meta.finished);
        assert!(a.meta.job_finished);
    }

    #[test]
    fn test_revoked_job_leaves_attempt_unfinished() {
        let store = Arc::new(store_with_matching());
        let queue = HeldQueue::default();
        let task = store.submit_matching_solve(&queue, "A").unwrap();
        assert_eq!(store.revoke_matching_job(&queue, "A").unwrap(), task);

        // the detached job still runs to completion, but its result is dropped
        let (_, job) = queue.jobs.lock().unwrap().pop().unwrap();
        job().unwrap();
        let a = store.matching("A").unwrap();
        assert!(!a.meta.finished);
        assert!(a.records.is_empty());
        assert!(a.meta.task_id.is_none());
    }

    #[test]
    fn test_reset_attempt_drops_stale_report() {
        let store = Arc::new(store_with_matching());
        store.solve_matching_with("A", &PackagedMilp).unwrap();
        store.remove_role("A", "S1", "T1", "F2", RoleKind::Marker).unwrap();
        assert_eq!(store.validate_matching("A").unwrap().errors.len(), 1);

        // a queued re-solve resets the attempt, which is then vacuously valid
        let queue = HeldQueue::default();
        store.submit_matching_solve(&queue, "A").unwrap();
        assert!(!store.matching("A").unwrap().meta.finished);
        assert!(store.validate_matching("A").unwrap().is_ok());
        store.revoke_matching_job(&queue, "A").unwrap();
        assert!(store.validate_matching("A").unwrap().is_ok());

        store.solve_matching_with("A", &PackagedMilp).unwrap();
        store.remove_role("A", "S1", "T1", "F2", RoleKind::Marker).unwrap();
        assert!(store.validate_matching("A").unwrap().has_errors());
        let dir = tempfile::tempdir().unwrap();
        store.export_matching("A", dir.path()).unwrap();
        assert!(store.validate_matching("A").unwrap().is_ok());
    }

    #[test]
    fn test_faculty_totals_follow_catalog_edit() {
        let store = store_with_matching();
        store.solve_matching_with("A", &PackagedMilp).unwrap();
        assert_eq!(store.faculty_totals("A", "F1").unwrap().supervising, 10);

        let edited = (*facts()).clone().with_project(
            ProjectFacts::new("P1", "PC1")
                .with_owner("F1")
                .with_capacity(1)
                .with_cats(CatsValues::new(20, 3, 0, 1)),
        );
        store
            .replace_facts(Arc::new(edited), [EntityKey::new(EntityKind::Project, "P1")])
            .unwrap();
        assert_eq!(store.faculty_totals("A", "F1").unwrap().supervising, 20);
    }

    #[test]
    fn test_schedule_lifecycle_and_edits() {
        crate::logging::init_test();
        let store = AttemptStore::new(facts());
        store.insert_schedule(ScheduleAttempt::new("X", "draft", "AS")).unwrap();
        assert_eq!(store.solve_schedule_with("X", &PackagedMilp).unwrap(), SolverOutcome::Optimal);
        let x = store.schedule("X").unwrap();
        let slot = x.slot_of_talk("K1").unwrap().clone();
        assert!(slot.assessors.contains("F2"));

        store.deploy_schedule("X").unwrap();
        store.duplicate_schedule("X", "Y", "copy").unwrap();
        store.solve_schedule_with("Y", &PackagedMilp).unwrap();
        assert!(matches!(store.deploy_schedule("Y"), Err(EngineError::ScopeConflict { .. })));

        // a session already held blocks revocation
        assert!(store.revoke_schedule("X", day(14)).is_err());
        store.revoke_schedule("X", day(1)).unwrap();

        let other = if slot.session_id == "D1" { "D2" } else { "D1" };
        store.move_talk("X", "K1", other, "R1").unwrap();
        let x = store.schedule("X").unwrap();
        assert_eq!(x.slot_of_talk("K1").unwrap().session_id, other);
        // the new slot has no panel yet
        assert!(store.validate_schedule("X").unwrap().errors_in("assessors").count() >= 1);

        store.add_assessor("X", other, "R1", "F2").unwrap();
        assert!(store.add_assessor("X", other, "R1", "F2").is_err());
        assert!(store.validate_schedule("X").unwrap().is_ok());
        store.remove_assessor("X", other, "R1", "F2").unwrap();

        store.revert_schedule("X").unwrap();
        let x = store.schedule("X").unwrap();
        assert_eq!(x.slot_of_talk("K1").unwrap().session_id, slot.session_id);
        assert_eq!(store.schedule_stats("X").unwrap().talks, 1);
    }
}
