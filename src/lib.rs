//! Project allocation engine.
//!
//! Matches students to supervised projects (with supervisor, marker and
//! moderator roles) and schedules presentation assessments into
//! session/room slots with assessor panels, subject to capacity, workload
//! ("CATS") and preference constraints.
//!
//! # Modules
//!
//! - **`models`**: Catalog facts (`FactSnapshot`, projects, faculty,
//!   selectors, sessions) and attempt state (`MatchingAttempt`,
//!   `ScheduleAttempt`)
//! - **`matching`**: Objective, problem construction, materialization and
//!   statistics for student ↔ project ↔ role assignment
//! - **`scheduling`**: The same for talks, slots and assessor panels
//! - **`solver`**: `LinearProblem`, the bundled MILP backend, external
//!   solver executables and offline export/upload
//! - **`validation`**: Independent re-derivation of every hard rule, memoized
//!   with explicit dependency edges
//! - **`workload`**: CATS totals and effective limits shared by builders and
//!   validators
//! - **`store`**, **`jobs`**: Attempt ownership, lifecycle operations, manual
//!   edits and background solves
//! - **`config`**, **`error`**, **`logging`**: Configuration, error types and
//!   subscriber setup
//!
//! # Flow
//!
//! ```text
//! FactSnapshot ─▶ builder ─▶ LinearProblem ─▶ SolverBackend ─▶ SolverVerdict
//!                                                                  │
//!        Validator ◀── committed records/slots ◀── materialize ◀───┘
//! ```
//!
//! Both the builders and the validators query [`workload`] so the solver and
//! the audit agree on what each faculty member carries.

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod matching;
pub mod models;
pub mod scheduling;
pub mod solver;
pub mod store;
pub mod validation;
pub mod workload;

pub use error::{EngineError, EngineResult};
pub use store::AttemptStore;
