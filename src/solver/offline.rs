//! Offline solving: export the problem, solve elsewhere, upload the answer.
//!
//! Used for problems too large to solve inside a job. The export writes the
//! problem twice, as JSON (lossless, with variable names) and as a CPLEX-LP
//! file any supported solver can read. An uploaded solution is either a
//! JSON [`UploadedSolution`] or a native solution file of one of the
//! external solvers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::external::{self, ParsedSolution};
use super::{LinearProblem, SolverKind, SolverOutcome, SolverVerdict};
use crate::error::{EngineError, EngineResult, SolverError};

/// Paths written by [`export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineExport {
    pub problem_path: PathBuf,
    pub lp_path: PathBuf,
}

/// Writes `problem` as `<stem>.json` and `<stem>.lp` into `dir`.
pub fn export(problem: &LinearProblem, dir: &Path, stem: &str) -> EngineResult<OfflineExport> {
    std::fs::create_dir_all(dir)?;
    let problem_path = dir.join(format!("{stem}.json"));
    let lp_path = dir.join(format!("{stem}.lp"));

    std::fs::write(&problem_path, serde_json::to_string_pretty(problem)?)?;
    std::fs::write(&lp_path, problem.to_lp_format())?;

    info!(path = %problem_path.display(), vars = problem.num_vars(), "problem exported");
    Ok(OfflineExport {
        problem_path,
        lp_path,
    })
}

/// Reads a problem written by [`export`].
pub fn read_problem(path: &Path) -> EngineResult<LinearProblem> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// JSON solution upload.
///
/// `values` is keyed by variable name, or by LP column (`x<index>`).
/// Variables not listed are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedSolution {
    pub outcome: SolverOutcome,
    #[serde(default)]
    pub objective: Option<f64>,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

/// Format of an uploaded solution file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionFormat {
    Json,
    /// A solution file written by the given external solver.
    Native(SolverKind),
}

/// Parses an uploaded solution against `problem`.
pub fn read_solution(
    problem: &LinearProblem,
    raw: &str,
    format: SolutionFormat,
) -> EngineResult<SolverVerdict> {
    let parsed = match format {
        SolutionFormat::Json => {
            let upload: UploadedSolution = serde_json::from_str(raw)?;
            let columns = upload
                .values
                .into_iter()
                .map(|(name, value)| {
                    problem
                        .lookup(&name)
                        .or_else(|| problem.lp_column(&name))
                        .map(|var| (format!("x{}", var.0), value))
                        .ok_or_else(|| {
                            EngineError::Solver(SolverError::MalformedOutput(format!(
                                "unknown variable '{name}'"
                            )))
                        })
                })
                .collect::<EngineResult<Vec<_>>>()?;
            ParsedSolution {
                outcome: upload.outcome,
                objective: upload.objective,
                columns,
            }
        }
        SolutionFormat::Native(kind) => match kind {
            SolverKind::Cbc => external::parse_cbc(raw)?,
            SolverKind::Glpk => external::parse_glpk(raw)?,
            SolverKind::Scip => external::parse_scip(raw)?,
            SolverKind::Gurobi => external::parse_gurobi(raw)?,
            SolverKind::Cplex => external::parse_cplex(raw)?,
            SolverKind::PackagedMilp => return Err(SolverError::Unsupported(kind).into()),
        },
    };

    let verdict = external::to_verdict(problem, parsed, Duration::ZERO)?;
    if verdict.outcome.is_usable() {
        let violated = problem.violated(&verdict.values, 1e-6);
        if !violated.is_empty() {
            return Err(EngineError::UnusableVerdict(format!(
                "uploaded solution violates {} constraint(s), first '{}'",
                violated.len(),
                violated[0]
            )));
        }
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{Comparison, Sense};

    fn problem() -> LinearProblem {
        let mut p = LinearProblem::new("offline", Sense::Maximize);
        let a = p.add_binary("x[S1,P1]");
        let b = p.add_binary("x[S1,P2]");
        p.add_objective(a, 1.0);
        p.add_objective(b, 0.5);
        p.add_constraint("one", [(a, 1.0), (b, 1.0)], Comparison::Eq, 1.0);
        p
    }

    #[test]
    fn test_export_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let p = problem();
        let paths = export(&p, dir.path(), "attempt-1").unwrap();

        assert!(paths.lp_path.exists());
        let back = read_problem(&paths.problem_path).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_json_upload_by_name() {
        let p = problem();
        let raw = r#"{"outcome": "Optimal", "objective": 1.0, "values": {"x[S1,P1]": 1.0}}"#;
        let verdict = read_solution(&p, raw, SolutionFormat::Json).unwrap();

        assert_eq!(verdict.outcome, SolverOutcome::Optimal);
        assert!(verdict.is_set(p.lookup("x[S1,P1]").unwrap()));
        assert!(!verdict.is_set(p.lookup("x[S1,P2]").unwrap()));
    }

    #[test]
    fn test_upload_rejects_infeasible_values() {
        let p = problem();
        let raw = r#"{"outcome": "Optimal", "values": {"x0": 1.0, "x1": 1.0}}"#;
        let err = read_solution(&p, raw, SolutionFormat::Json).unwrap_err();
        assert!(matches!(err, EngineError::UnusableVerdict(_)));

        let raw = r#"{"outcome": "Optimal", "values": {"nope": 1.0}}"#;
        assert!(read_solution(&p, raw, SolutionFormat::Json).is_err());
    }

    #[test]
    fn test_native_upload() {
        let p = problem();
        let raw = "s mip 1 2 o 0.5\nj 1 0\nj 2 1\n";
        let verdict = read_solution(&p, raw, SolutionFormat::Native(SolverKind::Glpk)).unwrap();
        assert!(verdict.is_set(p.lookup("x[S1,P2]").unwrap()));

        let raw = r#"{"outcome": "Infeasible"}"#;
        let verdict = read_solution(&p, raw, SolutionFormat::Json).unwrap();
        assert_eq!(verdict.outcome, SolverOutcome::Infeasible);
        assert!(verdict.values.is_empty());
    }
}
