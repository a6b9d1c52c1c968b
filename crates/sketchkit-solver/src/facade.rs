//! The solver facade.
//!
//! The editor talks to the numeric solver exclusively through
//! [`SketchSolver`]. An interactive drag is armed once with
//! `init_temporary_move`, then fed target positions via
//! `move_temporary_point` against a *temporary* model copy; the committed
//! model is never touched by a rejected move.

use thiserror::Error;

use sketchkit_core::geometry::Point2d;
use sketchkit_core::id::{GeoId, PointPos};
use sketchkit_core::model::GeometryModel;

use crate::status::{classify_status, SolveStatus};

/// Solver error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// No convergent solution for the requested move; the model was left
    /// at its last good state.
    #[error("No valid solution (residual {residual:.6})")]
    NoConvergence {
        /// The residual after the iteration budget was exhausted.
        residual: f64,
    },

    /// `move_temporary_point` was called without a prior
    /// `init_temporary_move`.
    #[error("Temporary move not armed")]
    NotArmed,

    /// The referenced geometry does not exist in the model.
    #[error("Invalid solver reference: GeoId {geo_id}")]
    InvalidReference {
        /// The offending geometry id.
        geo_id: GeoId,
    },

    /// The referenced geometry exists but has no such point.
    #[error("Geometry {geo_id} has no {pos:?} point")]
    InvalidPoint {
        /// The geometry id.
        geo_id: GeoId,
        /// The requested point position.
        pos: PointPos,
    },
}

/// Diagnostics of one full solve pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveOutcome {
    /// Remaining degrees of freedom; negative means over-determined.
    pub dof: i32,
    /// Indices of contradictory constraints.
    pub conflicting: Vec<usize>,
    /// Indices of exactly duplicated constraints.
    pub redundant: Vec<usize>,
    /// Indices of constraints implied by combinations of others.
    pub partially_redundant: Vec<usize>,
    /// Indices of constraints whose operands do not resolve.
    pub malformed: Vec<usize>,
}

impl SolveOutcome {
    /// Overall status for UI consumption.
    pub fn status(&self) -> SolveStatus {
        classify_status(self)
    }

    /// True when rendering should switch to the invalid-sketch palette.
    pub fn is_invalid(&self) -> bool {
        !self.conflicting.is_empty() || self.dof < 0
    }

    /// Any diagnostic worth reporting at all.
    pub fn has_diagnostics(&self) -> bool {
        !self.conflicting.is_empty()
            || !self.redundant.is_empty()
            || !self.partially_redundant.is_empty()
            || !self.malformed.is_empty()
    }
}

/// The constraint solver boundary.
///
/// Calls are synchronous and blocking; a solve either returns a result or
/// an error on the same call stack. There is no cancellation.
pub trait SketchSolver {
    /// Runs a full solve over the model, mutating geometry toward a
    /// constraint-satisfying configuration. `force` re-solves even when the
    /// solver believes the model is already converged.
    fn solve(&mut self, model: &mut GeometryModel, force: bool) -> SolveOutcome;

    /// Arms an interactive drag of the given point (or whole edge when
    /// `pos` is `PointPos::None`). `relative` makes subsequent targets
    /// deltas against the armed reference position.
    fn init_temporary_move(
        &mut self,
        model: &GeometryModel,
        geo_id: GeoId,
        pos: PointPos,
        relative: bool,
    ) -> Result<(), SolveError>;

    /// Moves the armed point to `target` within `model` (a temporary copy),
    /// re-solving around it. On error the model is left at its last good
    /// state and the committed model is untouched by construction.
    fn move_temporary_point(
        &mut self,
        model: &mut GeometryModel,
        geo_id: GeoId,
        pos: PointPos,
        target: Point2d,
        relative: bool,
    ) -> Result<(), SolveError>;

    /// Solved position of a point.
    fn point(
        &self,
        model: &GeometryModel,
        geo_id: GeoId,
        pos: PointPos,
    ) -> Result<Point2d, SolveError>;

    /// Unit normal of the curve at (approximately) the given point, if the
    /// curve has a well-defined one there.
    fn normal_at_point(&self, model: &GeometryModel, geo_id: GeoId, at: Point2d)
        -> Option<Point2d>;

    /// GeoIds whose parameters are coupled to the given point through the
    /// constraint graph.
    fn dependency_group(&self, model: &GeometryModel, geo_id: GeoId, pos: PointPos) -> Vec<GeoId>;
}
