//! Solver adapter.
//!
//! Problem builders emit a [`LinearProblem`]; a [`SolverBackend`] turns it
//! into a [`SolverVerdict`]. Backends report failures as
//! [`SolverError`](crate::error::SolverError), which [`run`] folds into a
//! [`SolverOutcome::NotSolved`] verdict so no backend failure reaches the
//! caller as an error or a panic.
//!
//! Backends:
//! - [`PackagedMilp`]: in-process branch-and-bound (`good_lp` + `microlp`).
//! - [`ExternalSolver`]: CBC, GLPK, SCIP, Gurobi or CPLEX executables,
//!   driven through CPLEX-LP files.
//! - [`offline`]: export the problem and wait for an uploaded solution.

pub mod external;
pub mod offline;
pub mod packaged;
pub mod problem;

pub use external::ExternalSolver;
pub use packaged::PackagedMilp;
pub use problem::{Comparison, LinearConstraint, LinearProblem, Sense, VarDomain, VarId, Variable};

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::error::SolverError;

/// Solver backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverKind {
    /// Bundled pure-Rust MILP solver.
    #[default]
    PackagedMilp,
    Cbc,
    Glpk,
    Cplex,
    Gurobi,
    Scip,
}

impl SolverKind {
    pub fn is_external(&self) -> bool {
        !matches!(self, SolverKind::PackagedMilp)
    }
}

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverOutcome {
    Optimal,
    /// A feasible but not provably optimal solution.
    Feasible,
    Infeasible,
    Unbounded,
    Undefined,
    NotSolved,
}

impl SolverOutcome {
    /// Whether the verdict may be materialized.
    pub fn is_usable(&self) -> bool {
        matches!(self, SolverOutcome::Optimal | SolverOutcome::Feasible)
    }
}

/// What a backend returned for a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverVerdict {
    pub outcome: SolverOutcome,
    /// Value per variable, aligned with `LinearProblem::variables`.
    /// Empty for unusable outcomes.
    pub values: Vec<f64>,
    pub objective: Option<f64>,
    pub compute_time: Duration,
}

impl SolverVerdict {
    /// Verdict with no solution attached.
    pub fn unusable(outcome: SolverOutcome, compute_time: Duration) -> Self {
        Self {
            outcome,
            values: Vec::new(),
            objective: None,
            compute_time,
        }
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    /// Whether a binary variable is set.
    pub fn is_set(&self, var: VarId) -> bool {
        self.value(var) > 0.9
    }
}

/// A solver backend.
pub trait SolverBackend: Send + Sync {
    fn kind(&self) -> SolverKind;

    /// Solves `problem`. Infeasible or unbounded problems are verdicts,
    /// not errors; errors mean no answer could be read at all.
    fn solve(&self, problem: &LinearProblem) -> Result<SolverVerdict, SolverError>;
}

/// Returns the backend for `kind`.
pub fn backend_for(kind: SolverKind) -> Box<dyn SolverBackend> {
    match kind {
        SolverKind::PackagedMilp => Box::new(PackagedMilp),
        other => Box::new(ExternalSolver::new(other)),
    }
}

/// Runs `backend` on `problem`, mapping every failure to `NotSolved`.
#[instrument(skip_all, fields(problem = %problem.name, kind = ?backend.kind()))]
pub fn run(backend: &dyn SolverBackend, problem: &LinearProblem) -> SolverVerdict {
    let start = Instant::now();
    match backend.solve(problem) {
        Ok(verdict) => {
            info!(
                outcome = ?verdict.outcome,
                objective = ?verdict.objective,
                elapsed_ms = verdict.compute_time.as_millis() as u64,
                "solve finished"
            );
            verdict
        }
        Err(e) => {
            warn!(error = %e, "solver backend failed");
            SolverVerdict::unusable(SolverOutcome::NotSolved, start.elapsed())
        }
    }
}
