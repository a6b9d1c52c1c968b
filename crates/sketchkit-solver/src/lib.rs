//! # SketchKit Solver
//!
//! Constraint solver boundary for SketchKit. The editor depends only on the
//! [`SketchSolver`] trait; [`PlanarSolver`] is the built-in relaxation
//! backend used by default and by the test suite.

pub mod facade;
pub mod planar;
pub mod status;

pub use facade::{SketchSolver, SolveError, SolveOutcome};
pub use planar::PlanarSolver;
pub use status::{classify_status, SolveStatus};
