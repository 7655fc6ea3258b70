//! External solver executables driven through CPLEX-LP files.
//!
//! The problem is written with [`LinearProblem::to_lp_format`], the solver
//! is run as a child process, and its solution file is parsed back. Each
//! solver writes its own solution format; the parsers below read only the
//! status line, objective and column values.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tempfile::Builder;
use tracing::{debug, instrument};

use super::{LinearProblem, SolverBackend, SolverKind, SolverOutcome, SolverVerdict};
use crate::error::SolverError;

/// Solution file contents, before mapping columns back to variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSolution {
    pub outcome: SolverOutcome,
    pub objective: Option<f64>,
    pub columns: Vec<(String, f64)>,
}

/// A solver run as a child process.
#[derive(Debug, Clone)]
pub struct ExternalSolver {
    kind: SolverKind,
    executable: String,
    workdir: Option<PathBuf>,
    keep_files: bool,
}

impl ExternalSolver {
    /// Creates an adapter using the conventional executable name for `kind`.
    pub fn new(kind: SolverKind) -> Self {
        let executable = match kind {
            SolverKind::Cbc => "cbc",
            SolverKind::Glpk => "glpsol",
            SolverKind::Cplex => "cplex",
            SolverKind::Gurobi => "gurobi_cl",
            SolverKind::Scip => "scip",
            SolverKind::PackagedMilp => "",
        };
        Self {
            kind,
            executable: executable.to_string(),
            workdir: None,
            keep_files: false,
        }
    }

    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable = path.into();
        self
    }

    /// Parent of the per-run scratch directory. Defaults to the system
    /// temp dir.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Leaves the scratch directory and its files in place after the run.
    pub fn keep_files(mut self) -> Self {
        self.keep_files = true;
        self
    }

    fn command(&self, lp: &Path, sol: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        match self.kind {
            SolverKind::Cbc => {
                cmd.arg(lp).arg("solve").arg("solu").arg(sol);
            }
            SolverKind::Glpk => {
                cmd.arg("--lp").arg(lp).arg("-w").arg(sol);
            }
            SolverKind::Scip => {
                cmd.arg("-c").arg(format!(
                    "read {} optimize write solution {} quit",
                    lp.display(),
                    sol.display()
                ));
            }
            SolverKind::Gurobi => {
                cmd.arg(format!("ResultFile={}", sol.display())).arg(lp);
            }
            SolverKind::Cplex => {
                cmd.arg("-c")
                    .arg(format!("read {}", lp.display()))
                    .arg("optimize")
                    .arg(format!("write {}", sol.display()))
                    .arg("quit");
            }
            SolverKind::PackagedMilp => {}
        }
        cmd
    }

    fn parse(&self, raw: &str) -> Result<ParsedSolution, SolverError> {
        match self.kind {
            SolverKind::Cbc => parse_cbc(raw),
            SolverKind::Glpk => parse_glpk(raw),
            SolverKind::Scip => parse_scip(raw),
            SolverKind::Gurobi => parse_gurobi(raw),
            SolverKind::Cplex => parse_cplex(raw),
            SolverKind::PackagedMilp => Err(SolverError::Unsupported(self.kind)),
        }
    }
}

impl SolverBackend for ExternalSolver {
    fn kind(&self) -> SolverKind {
        self.kind
    }

    #[instrument(skip_all, fields(kind = ?self.kind, executable = %self.executable))]
    fn solve(&self, problem: &LinearProblem) -> Result<SolverVerdict, SolverError> {
        if !self.kind.is_external() {
            return Err(SolverError::Unsupported(self.kind));
        }

        let mut builder = Builder::new();
        builder.prefix("allocation-");
        let scratch = match &self.workdir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };
        let lp_path = scratch.path().join("problem.lp");
        let sol_path = scratch.path().join("problem.sol");
        std::fs::write(&lp_path, problem.to_lp_format())?;

        let start = Instant::now();
        let output = self
            .command(&lp_path, &sol_path)
            .output()
            .map_err(|source| SolverError::Launch {
                command: self.executable.clone(),
                source,
            });
        let compute_time = start.elapsed();

        let result = output.and_then(|output| {
            debug!(status = %output.status, "solver process exited");
            if !output.status.success() {
                return Err(SolverError::ExitStatus {
                    command: self.executable.clone(),
                    status: output.status.to_string(),
                });
            }
            let raw = std::fs::read_to_string(&sol_path).map_err(|e| {
                SolverError::MalformedOutput(format!("cannot read solution file: {e}"))
            })?;
            self.parse(&raw)
        });

        if self.keep_files {
            let kept = scratch.keep();
            debug!(dir = %kept.display(), "kept solver files");
        } else {
            scratch.close()?;
        }

        let parsed = result?;
        to_verdict(problem, parsed, compute_time)
    }
}

/// Maps LP column names back onto the problem's variables.
pub fn to_verdict(
    problem: &LinearProblem,
    parsed: ParsedSolution,
    compute_time: std::time::Duration,
) -> Result<SolverVerdict, SolverError> {
    if !parsed.outcome.is_usable() {
        return Ok(SolverVerdict::unusable(parsed.outcome, compute_time));
    }
    let mut values = vec![0.0; problem.num_vars()];
    for (column, value) in parsed.columns {
        let var = problem
            .lp_column(&column)
            .ok_or_else(|| SolverError::MalformedOutput(format!("unknown column '{column}'")))?;
        values[var.0] = value;
    }
    let objective = parsed
        .objective
        .map(|o| o + problem.objective_offset)
        .or_else(|| Some(problem.evaluate(&values)));
    Ok(SolverVerdict {
        outcome: parsed.outcome,
        values,
        objective,
        compute_time,
    })
}

fn number(token: &str) -> Result<f64, SolverError> {
    token
        .trim()
        .parse()
        .map_err(|_| SolverError::MalformedOutput(format!("expected a number, got '{token}'")))
}

/// CBC `solu` output:
///
/// ```text
/// Optimal - objective value 1.5
///       0 x0                 1                     1.5
/// ```
pub fn parse_cbc(raw: &str) -> Result<ParsedSolution, SolverError> {
    let mut lines = raw.lines();
    let header = lines
        .next()
        .ok_or_else(|| SolverError::MalformedOutput("empty CBC solution".into()))?;
    let lower = header.to_ascii_lowercase();

    let outcome = if lower.starts_with("optimal") {
        SolverOutcome::Optimal
    } else if lower.contains("infeasible") {
        SolverOutcome::Infeasible
    } else if lower.contains("unbounded") {
        SolverOutcome::Unbounded
    } else if lower.starts_with("stopped") {
        SolverOutcome::Feasible
    } else {
        SolverOutcome::Undefined
    };
    let objective = header
        .rsplit("objective value")
        .next()
        .filter(|_| lower.contains("objective value"))
        .map(number)
        .transpose()?;

    let mut columns = Vec::new();
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        // "**" marks infeasible rows in some CBC builds
        let parts: Vec<&str> = parts.into_iter().filter(|p| *p != "**").collect();
        if parts.len() >= 3 {
            columns.push((parts[1].to_string(), number(parts[2])?));
        }
    }
    Ok(ParsedSolution {
        outcome,
        objective,
        columns,
    })
}

/// GLPK `-w` output (plain solution format): `s mip ROWS COLS STATUS OBJ`,
/// then one `j COL VALUE` line per column. Columns are numbered from 1.
pub fn parse_glpk(raw: &str) -> Result<ParsedSolution, SolverError> {
    let mut outcome = None;
    let mut objective = None;
    let mut is_mip = true;
    let mut columns = Vec::new();

    for line in raw.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.first().copied() {
            Some("s") if parts.len() >= 6 => {
                is_mip = parts[1] == "mip";
                let (status, obj) = if is_mip {
                    (parts[4], parts[5])
                } else {
                    // s bas ROWS COLS PST DST OBJ
                    (parts[4], parts.get(6).copied().unwrap_or("0"))
                };
                outcome = Some(match status {
                    "o" => SolverOutcome::Optimal,
                    "f" => SolverOutcome::Feasible,
                    "n" | "i" => SolverOutcome::Infeasible,
                    "u" => SolverOutcome::Undefined,
                    _ => SolverOutcome::Undefined,
                });
                objective = Some(number(obj)?);
            }
            Some("j") if parts.len() >= 3 => {
                let idx: usize = parts[1].parse().map_err(|_| {
                    SolverError::MalformedOutput(format!("bad GLPK column '{}'", parts[1]))
                })?;
                let value = if is_mip { parts[2] } else { parts.get(3).copied().unwrap_or("0") };
                columns.push((format!("x{}", idx.saturating_sub(1)), number(value)?));
            }
            _ => {}
        }
    }

    let outcome =
        outcome.ok_or_else(|| SolverError::MalformedOutput("no GLPK status line".into()))?;
    Ok(ParsedSolution {
        outcome,
        objective,
        columns,
    })
}

/// SCIP `write solution` output.
pub fn parse_scip(raw: &str) -> Result<ParsedSolution, SolverError> {
    let mut outcome = SolverOutcome::Undefined;
    let mut objective = None;
    let mut columns = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(status) = trimmed.strip_prefix("solution status:") {
            let status = status.trim().to_ascii_lowercase();
            outcome = if status.contains("optimal") {
                SolverOutcome::Optimal
            } else if status.contains("infeasible") {
                SolverOutcome::Infeasible
            } else if status.contains("unbounded") {
                SolverOutcome::Unbounded
            } else {
                SolverOutcome::Feasible
            };
        } else if let Some(obj) = trimmed.strip_prefix("objective value:") {
            objective = Some(number(obj)?);
        } else if trimmed.starts_with('x') {
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 2 {
                columns.push((parts[0].to_string(), number(parts[1])?));
            }
        }
    }

    if outcome == SolverOutcome::Feasible && columns.is_empty() {
        outcome = SolverOutcome::Undefined;
    }
    Ok(ParsedSolution {
        outcome,
        objective,
        columns,
    })
}

/// Gurobi `.sol` file. Gurobi only writes one when a solution exists.
pub fn parse_gurobi(raw: &str) -> Result<ParsedSolution, SolverError> {
    let mut objective = None;
    let mut columns = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(comment) = trimmed.strip_prefix('#') {
            if let Some((_, value)) = comment.split_once('=') {
                if comment.to_ascii_lowercase().contains("objective value") {
                    objective = Some(number(value)?);
                }
            }
            continue;
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() >= 2 {
            columns.push((parts[0].to_string(), number(parts[1])?));
        }
    }

    if columns.is_empty() {
        return Err(SolverError::MalformedOutput("Gurobi solution has no columns".into()));
    }
    Ok(ParsedSolution {
        outcome: SolverOutcome::Optimal,
        objective,
        columns,
    })
}

fn xml_attr<'a>(element: &'a str, attr: &str) -> Option<&'a str> {
    let needle = format!("{attr}=\"");
    let start = element.find(&needle)? + needle.len();
    let end = element[start..].find('"')? + start;
    Some(&element[start..end])
}

/// CPLEX XML solution: a `<header>` element carrying
/// `solutionStatusString` and `objectiveValue`, then `<variable>` elements.
pub fn parse_cplex(raw: &str) -> Result<ParsedSolution, SolverError> {
    let header_start = raw
        .find("<header")
        .ok_or_else(|| SolverError::MalformedOutput("no CPLEX header".into()))?;
    let header_end = raw[header_start..]
        .find('>')
        .map(|i| i + header_start)
        .ok_or_else(|| SolverError::MalformedOutput("unterminated CPLEX header".into()))?;
    let header = &raw[header_start..header_end];

    let status = xml_attr(header, "solutionStatusString")
        .unwrap_or("")
        .to_ascii_lowercase();
    let outcome = if status.contains("infeasible") {
        SolverOutcome::Infeasible
    } else if status.contains("unbounded") {
        SolverOutcome::Unbounded
    } else if status.contains("optimal") {
        SolverOutcome::Optimal
    } else if status.contains("feasible") || status.contains("limit") {
        SolverOutcome::Feasible
    } else {
        SolverOutcome::Undefined
    };
    let objective = xml_attr(header, "objectiveValue").map(number).transpose()?;

    let mut columns = Vec::new();
    for chunk in raw.split("<variable ").skip(1) {
        let element = chunk.split('>').next().unwrap_or("");
        let name = xml_attr(element, "name")
            .ok_or_else(|| SolverError::MalformedOutput("CPLEX variable without name".into()))?;
        let value = xml_attr(element, "value")
            .ok_or_else(|| SolverError::MalformedOutput("CPLEX variable without value".into()))?;
        columns.push((name.to_string(), number(value)?));
    }

    Ok(ParsedSolution {
        outcome,
        objective,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Sense;
    use std::time::Duration;

    #[test]
    fn test_parse_cbc() {
        let raw = "Optimal - objective value 1.50000000\n      0 x0                 1                     1.5\n      1 x1                 0                       0\n";
        let parsed = parse_cbc(raw).unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Optimal);
        assert!((parsed.objective.unwrap() - 1.5).abs() < 1e-10);
        assert_eq!(parsed.columns, vec![("x0".into(), 1.0), ("x1".into(), 0.0)]);

        let parsed = parse_cbc("Infeasible - objective value 0.0\n").unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Infeasible);
    }

    #[test]
    fn test_parse_glpk() {
        let raw = "c Problem:\nc\ns mip 3 2 o 1.5\ni 1 1\nj 1 1\nj 2 0\ne o f\n";
        let parsed = parse_glpk(raw).unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Optimal);
        assert_eq!(parsed.columns, vec![("x0".into(), 1.0), ("x1".into(), 0.0)]);

        let parsed = parse_glpk("s mip 3 2 n 0\n").unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Infeasible);

        assert!(parse_glpk("garbage").is_err());
    }

    #[test]
    fn test_parse_scip() {
        let raw = "solution status: optimal solution found\nobjective value:                    1.5\nx0                                  1   (obj:1.5)\n";
        let parsed = parse_scip(raw).unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Optimal);
        assert_eq!(parsed.columns, vec![("x0".into(), 1.0)]);

        let parsed = parse_scip("solution status: infeasible\nno solution available\n").unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Infeasible);
    }

    #[test]
    fn test_parse_gurobi() {
        let raw = "# Solution for model allocation\n# Objective value = 1.5\nx0 1\nx1 0\n";
        let parsed = parse_gurobi(raw).unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Optimal);
        assert!((parsed.objective.unwrap() - 1.5).abs() < 1e-10);
        assert_eq!(parsed.columns.len(), 2);

        assert!(parse_gurobi("# empty\n").is_err());
    }

    #[test]
    fn test_parse_cplex() {
        let raw = r#"<?xml version = "1.0" standalone="yes"?>
<CPLEXSolution version="1.2">
 <header problemName="m.lp" objectiveValue="1.5" solutionStatusValue="101" solutionStatusString="integer optimal solution"/>
 <variables>
  <variable name="x0" index="0" value="1"/>
  <variable name="x1" index="1" value="0"/>
 </variables>
</CPLEXSolution>"#;
        let parsed = parse_cplex(raw).unwrap();
        assert_eq!(parsed.outcome, SolverOutcome::Optimal);
        assert!((parsed.objective.unwrap() - 1.5).abs() < 1e-10);
        assert_eq!(parsed.columns, vec![("x0".into(), 1.0), ("x1".into(), 0.0)]);
    }

    #[test]
    fn test_to_verdict_maps_columns() {
        let mut p = LinearProblem::new("t", Sense::Maximize);
        let a = p.add_binary("a");
        let b = p.add_binary("b");
        let parsed = ParsedSolution {
            outcome: SolverOutcome::Optimal,
            objective: Some(1.0),
            columns: vec![("x1".into(), 1.0)],
        };
        let verdict = to_verdict(&p, parsed, Duration::ZERO).unwrap();
        assert!(!verdict.is_set(a));
        assert!(verdict.is_set(b));

        let bad = ParsedSolution {
            outcome: SolverOutcome::Optimal,
            objective: None,
            columns: vec![("x9".into(), 1.0)],
        };
        assert!(to_verdict(&p, bad, Duration::ZERO).is_err());
    }

    #[test]
    fn test_missing_executable_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ExternalSolver::new(SolverKind::Cbc)
            .with_executable("definitely-not-a-solver-binary")
            .with_workdir(dir.path());
        let p = LinearProblem::new("t", Sense::Maximize);
        let err = solver.solve(&p).unwrap_err();
        assert!(matches!(err, SolverError::Launch { .. }));

        // files are cleaned up after a failed run
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_keep_files_leaves_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ExternalSolver::new(SolverKind::Glpk)
            .with_executable("definitely-not-a-solver-binary")
            .with_workdir(dir.path())
            .keep_files();
        let p = LinearProblem::new("t", Sense::Maximize);
        assert!(solver.solve(&p).is_err());

        let kept: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(kept.len(), 1);
        assert!(kept[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("allocation-"));
        assert!(kept[0].join("problem.lp").exists());
    }
}
