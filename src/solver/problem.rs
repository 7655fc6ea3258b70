//! Abstract linear problem description.
//!
//! A [`LinearProblem`] is the hand-off format between the problem builders
//! and the solver backends: typed variables, a linear objective and linear
//! (in)equalities. Constraint terms are merged per variable on insertion,
//! so every backend sees each variable at most once per row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Handle to a variable of a [`LinearProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub usize);

/// Variable domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VarDomain {
    Binary,
    Integer { min: i32, max: i32 },
    Continuous { min: f64, max: f64 },
}

impl VarDomain {
    pub fn is_integral(&self) -> bool {
        !matches!(self, VarDomain::Continuous { .. })
    }

    /// Lower and upper bounds as floats.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            VarDomain::Binary => (0.0, 1.0),
            VarDomain::Integer { min, max } => (min as f64, max as f64),
            VarDomain::Continuous { min, max } => (min, max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub domain: VarDomain,
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Le,
    Ge,
    Eq,
}

impl Comparison {
    pub fn as_lp(&self) -> &'static str {
        match self {
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Eq => "=",
        }
    }
}

/// A named linear constraint `Σ coeff·var  cmp  rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub cmp: Comparison,
    pub rhs: f64,
}

impl LinearConstraint {
    fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values.get(v.0).copied().unwrap_or(0.0))
            .sum()
    }

    /// Whether `values` satisfy the constraint within `tol`.
    pub fn is_satisfied(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.lhs(values);
        match self.cmp {
            Comparison::Le => lhs <= self.rhs + tol,
            Comparison::Ge => lhs >= self.rhs - tol,
            Comparison::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

/// A mixed-integer linear program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProblem {
    pub name: String,
    pub sense: Sense,
    pub variables: Vec<Variable>,
    /// Objective coefficient per variable (dense, aligned with `variables`).
    pub objective: Vec<f64>,
    /// Constant added to the objective value.
    pub objective_offset: f64,
    pub constraints: Vec<LinearConstraint>,
}

impl LinearProblem {
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self {
            name: name.into(),
            sense,
            variables: Vec::new(),
            objective: Vec::new(),
            objective_offset: 0.0,
            constraints: Vec::new(),
        }
    }

    fn add_var(&mut self, name: impl Into<String>, domain: VarDomain) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            domain,
        });
        self.objective.push(0.0);
        id
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarDomain::Binary)
    }

    pub fn add_integer(&mut self, name: impl Into<String>, min: i32, max: i32) -> VarId {
        self.add_var(name, VarDomain::Integer { min, max })
    }

    pub fn add_continuous(&mut self, name: impl Into<String>, min: f64, max: f64) -> VarId {
        self.add_var(name, VarDomain::Continuous { min, max })
    }

    /// Adds `coeff` to the objective coefficient of `var`.
    pub fn add_objective(&mut self, var: VarId, coeff: f64) {
        if let Some(c) = self.objective.get_mut(var.0) {
            *c += coeff;
        }
    }

    pub fn add_objective_offset(&mut self, value: f64) {
        self.objective_offset += value;
    }

    /// Adds a constraint, merging repeated variables and dropping zero terms.
    ///
    /// A constraint with no remaining terms is kept only if it is violated
    /// (`0 cmp rhs` false), so an impossible model stays impossible.
    pub fn add_constraint<I>(&mut self, name: impl Into<String>, terms: I, cmp: Comparison, rhs: f64)
    where
        I: IntoIterator<Item = (VarId, f64)>,
    {
        let mut merged: BTreeMap<VarId, f64> = BTreeMap::new();
        for (var, coeff) in terms {
            *merged.entry(var).or_insert(0.0) += coeff;
        }
        let terms: Vec<(VarId, f64)> = merged.into_iter().filter(|(_, c)| *c != 0.0).collect();

        let constraint = LinearConstraint {
            name: name.into(),
            terms,
            cmp,
            rhs,
        };
        if constraint.terms.is_empty() && constraint.is_satisfied(&[], 1e-9) {
            return;
        }
        self.constraints.push(constraint);
    }

    /// Pins a variable to a value.
    pub fn fix(&mut self, name: impl Into<String>, var: VarId, value: f64) {
        self.add_constraint(name, [(var, 1.0)], Comparison::Eq, value);
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn var_name(&self, var: VarId) -> Option<&str> {
        self.variables.get(var.0).map(|v| v.name.as_str())
    }

    /// Finds a variable by name.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(VarId)
    }

    /// Objective value at `values`, including the offset.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .zip(values)
            .map(|(c, v)| c * v)
            .sum::<f64>()
            + self.objective_offset
    }

    /// Names of constraints violated by `values`.
    pub fn violated(&self, values: &[f64], tol: f64) -> Vec<&str> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(values, tol))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Renders the problem in CPLEX LP format.
    ///
    /// Variables are written as `x<index>` so arbitrary names survive
    /// solvers with strict identifier rules; [`Self::lp_column`] maps back.
    pub fn to_lp_format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\\ {}", self.name);
        out.push_str(match self.sense {
            Sense::Maximize => "Maximize\n",
            Sense::Minimize => "Minimize\n",
        });
        out.push_str(" obj:");
        let mut any = false;
        for (i, c) in self.objective.iter().enumerate() {
            if *c != 0.0 {
                write_term(&mut out, *c, i);
                any = true;
            }
        }
        if !any {
            // LP readers reject an empty objective row
            out.push_str(" 0 x0");
        }
        out.push('\n');

        out.push_str("Subject To\n");
        for (k, c) in self.constraints.iter().enumerate() {
            let _ = write!(out, " c{k}:");
            if c.terms.is_empty() {
                out.push_str(" 0 x0");
            }
            for (v, coeff) in &c.terms {
                write_term(&mut out, *coeff, v.0);
            }
            let _ = writeln!(out, " {} {}", c.cmp.as_lp(), fmt_num(c.rhs));
        }

        out.push_str("Bounds\n");
        for (i, v) in self.variables.iter().enumerate() {
            let (lo, hi) = v.domain.bounds();
            let lo = if lo.is_finite() { fmt_num(lo) } else { "-inf".into() };
            let hi = if hi.is_finite() { fmt_num(hi) } else { "+inf".into() };
            let _ = writeln!(out, " {lo} <= x{i} <= {hi}");
        }

        let binaries: Vec<usize> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.domain == VarDomain::Binary)
            .map(|(i, _)| i)
            .collect();
        let generals: Vec<usize> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v.domain, VarDomain::Integer { .. }))
            .map(|(i, _)| i)
            .collect();
        if !binaries.is_empty() {
            out.push_str("Binaries\n");
            for i in binaries {
                let _ = writeln!(out, " x{i}");
            }
        }
        if !generals.is_empty() {
            out.push_str("Generals\n");
            for i in generals {
                let _ = writeln!(out, " x{i}");
            }
        }
        out.push_str("End\n");
        out
    }

    /// Inverse of the column naming used by [`Self::to_lp_format`].
    pub fn lp_column(&self, column: &str) -> Option<VarId> {
        let idx: usize = column.strip_prefix('x')?.parse().ok()?;
        (idx < self.variables.len()).then_some(VarId(idx))
    }
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn write_term(out: &mut String, coeff: f64, idx: usize) {
    if coeff < 0.0 {
        let _ = write!(out, " - {} x{idx}", fmt_num(-coeff));
    } else {
        let _ = write!(out, " + {} x{idx}", fmt_num(coeff));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_terms_merged() {
        let mut p = LinearProblem::new("t", Sense::Maximize);
        let x = p.add_binary("x");
        let y = p.add_binary("y");
        p.add_constraint("c", [(x, 1.0), (y, 1.0), (x, 2.0), (y, -1.0)], Comparison::Le, 3.0);

        assert_eq!(p.num_constraints(), 1);
        assert_eq!(p.constraints[0].terms, vec![(x, 3.0)]);
    }

    #[test]
    fn test_trivial_constraints() {
        let mut p = LinearProblem::new("t", Sense::Maximize);
        p.add_constraint("always", Vec::<(VarId, f64)>::new(), Comparison::Le, 1.0);
        assert_eq!(p.num_constraints(), 0);

        p.add_constraint("never", Vec::<(VarId, f64)>::new(), Comparison::Ge, 1.0);
        assert_eq!(p.num_constraints(), 1);
        assert_eq!(p.violated(&[], 1e-9), vec!["never"]);
    }

    #[test]
    fn test_evaluate_and_lookup() {
        let mut p = LinearProblem::new("t", Sense::Minimize);
        let x = p.add_integer("x", 0, 10);
        let y = p.add_continuous("y", 0.0, f64::INFINITY);
        p.add_objective(x, 2.0);
        p.add_objective(y, 0.5);
        p.add_objective_offset(1.0);

        assert!((p.evaluate(&[3.0, 4.0]) - 9.0).abs() < 1e-10);
        assert_eq!(p.lookup("y"), Some(y));
        assert_eq!(p.var_name(x), Some("x"));
        assert_eq!(p.lookup("z"), None);
    }

    #[test]
    fn test_lp_format() {
        let mut p = LinearProblem::new("demo", Sense::Maximize);
        let x = p.add_binary("x[S1,P1]");
        let n = p.add_integer("n", 0, 4);
        p.add_objective(x, 1.5);
        p.add_objective(n, -1.0);
        p.add_constraint("cap", [(x, 1.0), (n, -1.0)], Comparison::Le, 0.0);

        let lp = p.to_lp_format();
        assert!(lp.contains("Maximize"));
        assert!(lp.contains("obj: + 1.5 x0 - 1 x1"));
        assert!(lp.contains("c0: + 1 x0 - 1 x1 <= 0"));
        assert!(lp.contains("Binaries\n x0"));
        assert!(lp.contains("Generals\n x1"));
        assert!(lp.ends_with("End\n"));
        assert_eq!(p.lp_column("x1"), Some(n));
        assert_eq!(p.lp_column("x7"), None);
    }
}
