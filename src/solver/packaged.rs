//! In-process MILP backend: `good_lp` driving its bundled `microlp` solver.

use good_lp::solvers::ObjectiveDirection;
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::debug;

use super::{
    Comparison, LinearProblem, Sense, SolverBackend, SolverKind, SolverOutcome, SolverVerdict,
    VarDomain,
};
use crate::error::SolverError;

/// Bundled branch-and-bound solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackagedMilp;

impl SolverBackend for PackagedMilp {
    fn kind(&self) -> SolverKind {
        SolverKind::PackagedMilp
    }

    fn solve(&self, problem: &LinearProblem) -> Result<SolverVerdict, SolverError> {
        let start = Instant::now();
        debug!(
            vars = problem.num_vars(),
            constraints = problem.num_constraints(),
            "packaged MILP solve"
        );

        // the bundled solver panics on some degenerate inputs
        let result = catch_unwind(AssertUnwindSafe(|| solve_inner(problem))).map_err(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            SolverError::Internal(msg)
        })?;
        let compute_time = start.elapsed();

        match result {
            Ok(values) => Ok(SolverVerdict {
                outcome: SolverOutcome::Optimal,
                objective: Some(problem.evaluate(&values)),
                values,
                compute_time,
            }),
            Err(ResolutionError::Infeasible) => Ok(SolverVerdict::unusable(
                SolverOutcome::Infeasible,
                compute_time,
            )),
            Err(ResolutionError::Unbounded) => Ok(SolverVerdict::unusable(
                SolverOutcome::Unbounded,
                compute_time,
            )),
            Err(other) => Err(SolverError::Internal(other.to_string())),
        }
    }
}

fn solve_inner(problem: &LinearProblem) -> Result<Vec<f64>, ResolutionError> {
    let mut pvars = ProblemVariables::new();
    let vars: Vec<Variable> = problem
        .variables
        .iter()
        .map(|v| match v.domain {
            VarDomain::Binary => pvars.add(variable().binary()),
            VarDomain::Integer { min, max } => pvars.add(variable().integer().min(min).max(max)),
            VarDomain::Continuous { min, max } => pvars.add(variable().min(min).max(max)),
        })
        .collect();

    let objective: Expression = vars
        .iter()
        .zip(&problem.objective)
        .map(|(&var, &coeff)| coeff * var)
        .sum();
    let direction = match problem.sense {
        Sense::Maximize => ObjectiveDirection::Maximisation,
        Sense::Minimize => ObjectiveDirection::Minimisation,
    };

    let mut model = pvars.optimise(direction, objective).using(default_solver);
    for c in &problem.constraints {
        let lhs: Expression = c.terms.iter().map(|(v, coeff)| *coeff * vars[v.0]).sum();
        let rhs = c.rhs;
        match c.cmp {
            Comparison::Le => model.add_constraint(constraint!(lhs <= rhs)),
            Comparison::Ge => model.add_constraint(constraint!(lhs >= rhs)),
            Comparison::Eq => model.add_constraint(constraint!(lhs == rhs)),
        };
    }

    let solution = model.solve()?;
    Ok(vars
        .iter()
        .zip(&problem.variables)
        .map(|(&var, v)| {
            let value = solution.value(var);
            if v.domain.is_integral() {
                value.round()
            } else {
                value
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::run;

    #[test]
    fn test_small_assignment() {
        // two students, one seat on P1: the higher reward wins it
        let mut p = LinearProblem::new("assign", Sense::Maximize);
        let a1 = p.add_binary("a1");
        let a2 = p.add_binary("a2");
        let b1 = p.add_binary("b1");
        let b2 = p.add_binary("b2");
        p.add_objective(a1, 1.0);
        p.add_objective(a2, 0.5);
        p.add_objective(b1, 1.0);
        p.add_objective(b2, 0.1);
        p.add_constraint("a", [(a1, 1.0), (a2, 1.0)], Comparison::Eq, 1.0);
        p.add_constraint("b", [(b1, 1.0), (b2, 1.0)], Comparison::Eq, 1.0);
        p.add_constraint("cap", [(a1, 1.0), (b1, 1.0)], Comparison::Le, 1.0);

        let verdict = run(&PackagedMilp, &p);
        assert_eq!(verdict.outcome, SolverOutcome::Optimal);
        assert!(verdict.is_set(b1));
        assert!(verdict.is_set(a2));
        assert!(!verdict.is_set(a1));
        assert!((verdict.objective.unwrap() - 1.5).abs() < 1e-6);
        assert!(p.violated(&verdict.values, 1e-6).is_empty());
    }

    #[test]
    fn test_infeasible() {
        let mut p = LinearProblem::new("bad", Sense::Maximize);
        let x = p.add_binary("x");
        p.add_constraint("ge", [(x, 1.0)], Comparison::Ge, 2.0);

        let verdict = run(&PackagedMilp, &p);
        assert_eq!(verdict.outcome, SolverOutcome::Infeasible);
        assert!(verdict.values.is_empty());
    }

    #[test]
    fn test_integer_and_offset() {
        let mut p = LinearProblem::new("int", Sense::Minimize);
        let n = p.add_integer("n", 0, 10);
        p.add_objective(n, 1.0);
        p.add_objective_offset(2.0);
        p.add_constraint("lb", [(n, 2.0)], Comparison::Ge, 5.0);

        let verdict = run(&PackagedMilp, &p);
        assert_eq!(verdict.outcome, SolverOutcome::Optimal);
        assert!((verdict.value(n) - 3.0).abs() < 1e-6);
        assert!((verdict.objective.unwrap() - 5.0).abs() < 1e-6);
    }
}
