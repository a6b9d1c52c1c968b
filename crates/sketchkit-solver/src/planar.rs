//! Built-in planar constraint solver.
//!
//! A Gauss–Seidel style relaxation backend: each pass projects geometry
//! directly onto the constraint manifolds, one constraint at a time, until
//! the summed residual converges or the iteration budget runs out. This is
//! not a production numeric solver (the facade exists so one can be
//! plugged in), but it is exact for the common geometric projections and
//! good enough to drive the editor and its tests without FFI.

use tracing::{debug, trace};

use sketchkit_core::constraint::{AlignmentRole, Constraint, ConstraintKind};
use sketchkit_core::geometry::{GeometryKind, Point2d};
use sketchkit_core::id::{GeoId, GeoPointRef, PointPos};
use sketchkit_core::model::GeometryModel;

use crate::facade::{SketchSolver, SolveError, SolveOutcome};

const DEFAULT_MAX_ITERS: usize = 200;
const DEFAULT_TOLERANCE: f64 = 1e-7;
/// Residual above which a constraint is reported as conflicting after a
/// full solve.
const CONFLICT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone)]
struct DragArm {
    geo_id: GeoId,
    pos: PointPos,
    relative: bool,
    reference: Point2d,
}

/// The built-in relaxation solver.
#[derive(Debug)]
pub struct PlanarSolver {
    max_iters: usize,
    tolerance: f64,
    armed: Option<DragArm>,
}

impl Default for PlanarSolver {
    fn default() -> Self {
        Self {
            max_iters: DEFAULT_MAX_ITERS,
            tolerance: DEFAULT_TOLERANCE,
            armed: None,
        }
    }
}

impl PlanarSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(max_iters: usize, tolerance: f64) -> Self {
        Self {
            max_iters,
            tolerance,
            armed: None,
        }
    }

    /// One relaxation run. Returns the summed residual after the last pass.
    fn relax(&self, model: &mut GeometryModel, pinned: Option<GeoPointRef>) -> f64 {
        let mut residual = 0.0;
        for pass in 0..self.max_iters {
            residual = 0.0;
            for index in 0..model.constraints().len() {
                if model.validate_constraint(index).is_err() {
                    continue;
                }
                let constraint = model.constraints()[index].clone();
                if !constraint.active || !constraint.driving {
                    continue;
                }
                residual += project_constraint(model, &constraint, pinned);
            }
            if residual < self.tolerance {
                trace!(pass, residual, "relaxation converged");
                return residual;
            }
        }
        trace!(residual, "relaxation exhausted iteration budget");
        residual
    }
}

impl SketchSolver for PlanarSolver {
    fn solve(&mut self, model: &mut GeometryModel, force: bool) -> SolveOutcome {
        let _ = force; // the relaxation pass is cheap enough to always run
        self.relax(model, None);

        let mut outcome = SolveOutcome::default();

        // Malformed: operands that do not resolve. Skipped everywhere else.
        for index in 0..model.constraints().len() {
            if model.validate_constraint(index).is_err() {
                outcome.malformed.push(index);
            }
        }

        // Conflicts: whatever still carries a residual after relaxation.
        for (index, constraint) in model.constraints().iter().enumerate() {
            if outcome.malformed.contains(&index) || !constraint.active || !constraint.driving {
                continue;
            }
            let r = constraint_residual(model, &constraint.kind);
            if r > CONFLICT_TOLERANCE {
                outcome.conflicting.push(index);
            }
        }

        outcome.redundant = find_redundant(model);
        outcome.partially_redundant = find_partially_redundant(model);
        outcome.dof = estimate_dof(model, &outcome.malformed);

        debug!(
            dof = outcome.dof,
            conflicting = outcome.conflicting.len(),
            redundant = outcome.redundant.len(),
            malformed = outcome.malformed.len(),
            "solve finished"
        );
        outcome
    }

    fn init_temporary_move(
        &mut self,
        model: &GeometryModel,
        geo_id: GeoId,
        pos: PointPos,
        relative: bool,
    ) -> Result<(), SolveError> {
        let reference = anchor_point(model, geo_id, pos)?;
        self.armed = Some(DragArm {
            geo_id,
            pos,
            relative,
            reference,
        });
        trace!(geo_id, ?pos, relative, "armed temporary move");
        Ok(())
    }

    fn move_temporary_point(
        &mut self,
        model: &mut GeometryModel,
        geo_id: GeoId,
        pos: PointPos,
        target: Point2d,
        relative: bool,
    ) -> Result<(), SolveError> {
        let arm = self.armed.clone().ok_or(SolveError::NotArmed)?;
        if arm.geo_id != geo_id || arm.pos != pos {
            return Err(SolveError::NotArmed);
        }
        let absolute = if relative || arm.relative {
            arm.reference + target
        } else {
            target
        };

        let snapshot = model.clone();
        let current = anchor_point(model, geo_id, pos)?;
        apply_move(model, geo_id, pos, current, absolute)?;

        let pinned = Some(GeoPointRef::new(geo_id, pos));
        let residual = self.relax(model, pinned);
        if residual >= CONFLICT_TOLERANCE {
            *model = snapshot;
            return Err(SolveError::NoConvergence { residual });
        }
        Ok(())
    }

    fn point(
        &self,
        model: &GeometryModel,
        geo_id: GeoId,
        pos: PointPos,
    ) -> Result<Point2d, SolveError> {
        model.point(geo_id, pos).map_err(|_| SolveError::InvalidPoint { geo_id, pos })
    }

    fn normal_at_point(
        &self,
        model: &GeometryModel,
        geo_id: GeoId,
        at: Point2d,
    ) -> Option<Point2d> {
        let element = model.geometry(geo_id).ok()?;
        match &element.kind {
            GeometryKind::LineSegment(l) => {
                let d = l.direction().normalized()?;
                Some(Point2d::new(-d.y, d.x))
            }
            GeometryKind::Circle(c) => (at - c.center).normalized(),
            GeometryKind::ArcOfCircle(a) => (at - a.center).normalized(),
            GeometryKind::Ellipse(e) => {
                // Gradient of the implicit form in the local frame.
                let (sin, cos) = e.angle.sin_cos();
                let d = at - e.center;
                let lx = d.x * cos + d.y * sin;
                let ly = -d.x * sin + d.y * cos;
                let g = Point2d::new(
                    lx / (e.major_radius * e.major_radius),
                    ly / (e.minor_radius * e.minor_radius),
                );
                let local = g.normalized()?;
                Some(Point2d::new(
                    local.x * cos - local.y * sin,
                    local.x * sin + local.y * cos,
                ))
            }
            _ => None,
        }
    }

    fn dependency_group(&self, model: &GeometryModel, geo_id: GeoId, pos: PointPos) -> Vec<GeoId> {
        let _ = pos; // coupling is tracked at geometry granularity
        let mut group = vec![geo_id];
        let mut frontier = vec![geo_id];
        while let Some(current) = frontier.pop() {
            for constraint in model.constraints() {
                let ids = constraint.geo_ids();
                if ids.contains(&current) {
                    for id in ids {
                        if !group.contains(&id) {
                            group.push(id);
                            frontier.push(id);
                        }
                    }
                }
            }
        }
        group.sort_unstable();
        group
    }
}

/// The representative point of a drag target: the referenced point, or the
/// element's first vertex (falling back to a parametric midpoint) for a
/// whole-edge drag.
fn anchor_point(model: &GeometryModel, geo_id: GeoId, pos: PointPos) -> Result<Point2d, SolveError> {
    if pos != PointPos::None {
        return model
            .point(geo_id, pos)
            .map_err(|_| SolveError::InvalidPoint { geo_id, pos });
    }
    let element = model
        .geometry(geo_id)
        .map_err(|_| SolveError::InvalidReference { geo_id })?;
    if let Some((_, p)) = element.vertices().first().copied() {
        return Ok(p);
    }
    let (t0, t1) = element
        .param_range()
        .ok_or(SolveError::InvalidReference { geo_id })?;
    Ok(element.eval_param((t0 + t1) / 2.0))
}

fn apply_move(
    model: &mut GeometryModel,
    geo_id: GeoId,
    pos: PointPos,
    current: Point2d,
    target: Point2d,
) -> Result<(), SolveError> {
    if pos == PointPos::None {
        let delta = target - current;
        translate_element(model, geo_id, delta)
            .map_err(|_| SolveError::InvalidReference { geo_id })?;
        Ok(())
    } else {
        set_point(model, GeoPointRef::new(geo_id, pos), target)
            .then_some(())
            .ok_or(SolveError::InvalidPoint { geo_id, pos })
    }
}

fn translate_element(
    model: &mut GeometryModel,
    geo_id: GeoId,
    delta: Point2d,
) -> Result<(), sketchkit_core::ModelError> {
    let element = model.geometry_mut(geo_id)?;
    match &mut element.kind {
        GeometryKind::Point { point } => *point = *point + delta,
        GeometryKind::LineSegment(l) => {
            l.start = l.start + delta;
            l.end = l.end + delta;
        }
        GeometryKind::Circle(c) => c.center = c.center + delta,
        GeometryKind::Ellipse(e) => e.center = e.center + delta,
        GeometryKind::ArcOfCircle(a) => a.center = a.center + delta,
        GeometryKind::ArcOfEllipse(a) => a.center = a.center + delta,
        GeometryKind::ArcOfHyperbola(a) => a.center = a.center + delta,
        GeometryKind::ArcOfParabola(a) => a.vertex = a.vertex + delta,
        GeometryKind::BSpline(b) => {
            for cp in &mut b.control_points {
                *cp = *cp + delta;
            }
        }
    }
    Ok(())
}

/// Writes a point into the referenced slot of an element. Center moves
/// translate the whole element; arc endpoint moves re-aim the angle while
/// keeping the radius. Returns false when the element has no such point.
fn set_point(model: &mut GeometryModel, r: GeoPointRef, p: Point2d) -> bool {
    let Ok(element) = model.geometry_mut(r.geo_id) else {
        return false;
    };
    match (&mut element.kind, r.pos) {
        (GeometryKind::Point { point }, PointPos::Start)
        | (GeometryKind::Point { point }, PointPos::Mid) => {
            *point = p;
            true
        }
        (GeometryKind::LineSegment(l), PointPos::Start) => {
            l.start = p;
            true
        }
        (GeometryKind::LineSegment(l), PointPos::End) => {
            l.end = p;
            true
        }
        (GeometryKind::Circle(c), PointPos::Mid) => {
            c.center = p;
            true
        }
        (GeometryKind::Ellipse(e), PointPos::Mid) => {
            e.center = p;
            true
        }
        (GeometryKind::ArcOfCircle(a), PointPos::Mid) => {
            a.center = p;
            true
        }
        (GeometryKind::ArcOfCircle(a), PointPos::Start) => {
            let d = p - a.center;
            if d.norm() > 1e-12 {
                a.start_angle = d.y.atan2(d.x);
            }
            true
        }
        (GeometryKind::ArcOfCircle(a), PointPos::End) => {
            let d = p - a.center;
            if d.norm() > 1e-12 {
                a.end_angle = d.y.atan2(d.x);
            }
            true
        }
        (GeometryKind::ArcOfEllipse(a), PointPos::Mid) => {
            a.center = p;
            true
        }
        (GeometryKind::ArcOfHyperbola(a), PointPos::Mid) => {
            a.center = p;
            true
        }
        (GeometryKind::ArcOfParabola(a), PointPos::Mid) => {
            a.vertex = p;
            true
        }
        (GeometryKind::BSpline(b), PointPos::Start) if !b.periodic => {
            if let Some(cp) = b.control_points.first_mut() {
                *cp = p;
            }
            true
        }
        (GeometryKind::BSpline(b), PointPos::End) if !b.periodic => {
            if let Some(cp) = b.control_points.last_mut() {
                *cp = p;
            }
            true
        }
        _ => false,
    }
}

fn get_point(model: &GeometryModel, r: GeoPointRef) -> Option<Point2d> {
    model.point(r.geo_id, r.pos).ok()
}

fn is_pinned(pinned: Option<GeoPointRef>, r: GeoPointRef) -> bool {
    match pinned {
        Some(p) => p.geo_id == r.geo_id && (p.pos == PointPos::None || p.pos == r.pos),
        None => false,
    }
}

/// Moves the free side of a two-point relation so that `b` lands on
/// `target_of(a)`. Returns the pre-projection error.
fn project_pair(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    a: GeoPointRef,
    b: GeoPointRef,
    target_for_b: Point2d,
    target_for_a: Point2d,
) -> f64 {
    let (Some(pa), Some(pb)) = (get_point(model, a), get_point(model, b)) else {
        return 0.0;
    };
    let error = pb.distance(&target_for_b).max(pa.distance(&target_for_a));
    if is_pinned(pinned, b) || (a.geo_id >= 0 && !is_pinned(pinned, a) && b.geo_id < 0) {
        set_point(model, a, target_for_a);
    } else {
        set_point(model, b, target_for_b);
    }
    error
}

fn line_of(model: &GeometryModel, geo_id: GeoId) -> Option<(Point2d, Point2d)> {
    match &model.geometry(geo_id).ok()?.kind {
        GeometryKind::LineSegment(l) => Some((l.start, l.end)),
        _ => None,
    }
}

fn circle_of(model: &GeometryModel, geo_id: GeoId) -> Option<(Point2d, f64)> {
    match &model.geometry(geo_id).ok()?.kind {
        GeometryKind::Circle(c) => Some((c.center, c.radius)),
        GeometryKind::ArcOfCircle(a) => Some((a.center, a.radius)),
        _ => None,
    }
}

fn set_radius(model: &mut GeometryModel, geo_id: GeoId, radius: f64) {
    if let Ok(element) = model.geometry_mut(geo_id) {
        match &mut element.kind {
            GeometryKind::Circle(c) => c.radius = radius,
            GeometryKind::ArcOfCircle(a) => a.radius = radius,
            _ => {}
        }
    }
}

fn edge_length(model: &GeometryModel, geo_id: GeoId) -> Option<f64> {
    let (s, e) = line_of(model, geo_id)?;
    Some(s.distance(&e))
}

/// Rotates a line about its midpoint so its direction matches `dir`.
fn aim_line(model: &mut GeometryModel, geo_id: GeoId, dir: Point2d, pinned: Option<GeoPointRef>) {
    let Some((s, e)) = line_of(model, geo_id) else {
        return;
    };
    let Some(d) = dir.normalized() else { return };
    let half = s.distance(&e) / 2.0;
    // Keep a pinned endpoint fixed; otherwise rotate about the midpoint.
    let (anchor, sign_s, sign_e) =
        if is_pinned(pinned, GeoPointRef::new(geo_id, PointPos::Start)) {
            (s, 0.0, 2.0)
        } else if is_pinned(pinned, GeoPointRef::new(geo_id, PointPos::End)) {
            (e, -2.0, 0.0)
        } else {
            (s.midpoint(&e), -1.0, 1.0)
        };
    let new_s = anchor + d * (half * sign_s);
    let new_e = anchor + d * (half * sign_e);
    if sign_s != 0.0 {
        set_point(model, GeoPointRef::new(geo_id, PointPos::Start), new_s);
    }
    if sign_e != 0.0 {
        set_point(model, GeoPointRef::new(geo_id, PointPos::End), new_e);
    }
}

fn reflect_across_line(p: Point2d, a: Point2d, b: Point2d) -> Option<Point2d> {
    let d = (b - a).normalized()?;
    let v = p - a;
    let along = d * v.dot(&d);
    let perp = v - along;
    Some(p - perp * 2.0)
}

/// Applies one projection step for a constraint. Returns the residual
/// *before* the step, so a converged system reports ~0.
fn project_constraint(
    model: &mut GeometryModel,
    constraint: &Constraint,
    pinned: Option<GeoPointRef>,
) -> f64 {
    use ConstraintKind::*;
    match &constraint.kind {
        Coincident { a, b } => {
            let (Some(pa), Some(pb)) = (get_point(model, *a), get_point(model, *b)) else {
                return 0.0;
            };
            project_pair(model, pinned, *a, *b, pa, pb)
        }
        Horizontal { first, second } => project_level(model, pinned, *first, *second, true),
        Vertical { first, second } => project_level(model, pinned, *first, *second, false),
        Parallel { a, b } => {
            let (Some((a0, a1)), Some((b0, b1))) = (line_of(model, *a), line_of(model, *b))
            else {
                return 0.0;
            };
            let (Some(da), Some(db)) = ((a1 - a0).normalized(), (b1 - b0).normalized()) else {
                return 0.0;
            };
            let error = da.cross(&db).abs();
            if error > 1e-12 {
                // Flip so the rotation takes the short way round.
                let target = if da.dot(&db) < 0.0 { da * -1.0 } else { da };
                if pinned.map(|p| p.geo_id) == Some(*b) {
                    aim_line(model, *a, if da.dot(&db) < 0.0 { db * -1.0 } else { db }, pinned);
                } else {
                    aim_line(model, *b, target, pinned);
                }
            }
            error
        }
        Perpendicular { a, b } => {
            let (Some((a0, a1)), Some((b0, b1))) = (line_of(model, *a), line_of(model, *b))
            else {
                return 0.0;
            };
            let (Some(da), Some(db)) = ((a1 - a0).normalized(), (b1 - b0).normalized()) else {
                return 0.0;
            };
            let error = da.dot(&db).abs();
            if error > 1e-12 {
                let perp = Point2d::new(-da.y, da.x);
                let target = if perp.dot(&db) < 0.0 { perp * -1.0 } else { perp };
                if pinned.map(|p| p.geo_id) == Some(*b) {
                    let perp_b = Point2d::new(-db.y, db.x);
                    let t = if perp_b.dot(&da) < 0.0 { perp_b * -1.0 } else { perp_b };
                    aim_line(model, *a, t, pinned);
                } else {
                    aim_line(model, *b, target, pinned);
                }
            }
            error
        }
        Tangent { a, b } => project_tangent(model, pinned, *a, *b),
        Equal { a, b } => project_equal(model, pinned, *a, *b),
        Symmetric { a, b, reference } => {
            let (Some(pa), Some(pb)) = (get_point(model, *a), get_point(model, *b)) else {
                return 0.0;
            };
            if reference.is_point() {
                let Some(pr) = get_point(model, *reference) else {
                    return 0.0;
                };
                let target_b = pr + (pr - pa);
                let target_a = pr + (pr - pb);
                project_pair(model, pinned, *a, *b, target_b, target_a)
            } else {
                let Some((l0, l1)) = line_of(model, reference.geo_id) else {
                    return 0.0;
                };
                let (Some(tb), Some(ta)) = (
                    reflect_across_line(pa, l0, l1),
                    reflect_across_line(pb, l0, l1),
                ) else {
                    return 0.0;
                };
                project_pair(model, pinned, *a, *b, tb, ta)
            }
        }
        Block { .. } => 0.0, // blocked edges are pinned by the caller's snapshot semantics
        PointOnObject { point, object } => {
            let Some(p) = get_point(model, *point) else {
                return 0.0;
            };
            let target = match &model.geometry(*object).map(|e| e.kind.clone()) {
                Ok(GeometryKind::LineSegment(l)) => {
                    let Some(d) = l.direction().normalized() else {
                        return 0.0;
                    };
                    l.start + d * (p - l.start).dot(&d)
                }
                Ok(GeometryKind::Circle(c)) => {
                    let Some(dir) = (p - c.center).normalized() else {
                        return 0.0;
                    };
                    c.center + dir * c.radius
                }
                Ok(GeometryKind::ArcOfCircle(a)) => {
                    let Some(dir) = (p - a.center).normalized() else {
                        return 0.0;
                    };
                    a.center + dir * a.radius
                }
                _ => return 0.0,
            };
            let error = p.distance(&target);
            if !is_pinned(pinned, *point) {
                set_point(model, *point, target);
            }
            error
        }
        Distance { a, b, value } => match b {
            Some(b) => {
                let (Some(pa), Some(pb)) = (get_point(model, *a), get_point(model, *b)) else {
                    return 0.0;
                };
                let d = pb - pa;
                let len = d.norm();
                let error = (len - value).abs();
                if len > 1e-12 && error > 1e-12 {
                    let dir = d * (1.0 / len);
                    project_pair(model, pinned, *a, *b, pa + dir * *value, pb - dir * *value);
                }
                error
            }
            None => project_length(model, pinned, a.geo_id, *value),
        },
        DistanceX { a, b, value } => project_axis_distance(model, pinned, *a, *b, *value, true),
        DistanceY { a, b, value } => project_axis_distance(model, pinned, *a, *b, *value, false),
        Radius { edge, value } => {
            let Some((_, r)) = circle_of(model, *edge) else {
                return 0.0;
            };
            let error = (r - value).abs();
            set_radius(model, *edge, *value);
            error
        }
        Diameter { edge, value } => {
            let Some((_, r)) = circle_of(model, *edge) else {
                return 0.0;
            };
            let error = (2.0 * r - value).abs();
            set_radius(model, *edge, value / 2.0);
            error
        }
        Weight { edge, value } => {
            // The pole circle's radius *is* the weight, in true units.
            let Some((_, r)) = circle_of(model, *edge) else {
                return 0.0;
            };
            let error = (r - value).abs();
            set_radius(model, *edge, *value);
            error
        }
        Angle { a, b, value } => project_angle(model, pinned, *a, *b, *value),
        InternalAlignment {
            element,
            host,
            role,
        } => project_internal_alignment(model, *element, *host, *role),
        SnellsLaw { .. } => {
            // Residual-only: the refraction relation needs a dedicated
            // numeric treatment; report, never project.
            constraint_residual(model, &constraint.kind)
        }
    }
}

fn project_level(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    first: GeoPointRef,
    second: Option<GeoPointRef>,
    horizontal: bool,
) -> f64 {
    let (a, b) = match second {
        Some(second) => (first, second),
        None => (
            GeoPointRef::new(first.geo_id, PointPos::Start),
            GeoPointRef::new(first.geo_id, PointPos::End),
        ),
    };
    let (Some(pa), Some(pb)) = (get_point(model, a), get_point(model, b)) else {
        return 0.0;
    };
    let error = if horizontal {
        (pa.y - pb.y).abs()
    } else {
        (pa.x - pb.x).abs()
    };
    if error > 1e-12 {
        let (ta, tb) = if horizontal {
            (Point2d::new(pa.x, pb.y), Point2d::new(pb.x, pa.y))
        } else {
            (Point2d::new(pb.x, pa.y), Point2d::new(pa.x, pb.y))
        };
        project_pair(model, pinned, a, b, tb, ta);
    }
    error
}

fn project_length(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    geo_id: GeoId,
    value: f64,
) -> f64 {
    let Some((s, e)) = line_of(model, geo_id) else {
        return 0.0;
    };
    let d = e - s;
    let len = d.norm();
    let error = (len - value).abs();
    if len > 1e-12 && error > 1e-12 {
        let dir = d * (1.0 / len);
        let a = GeoPointRef::new(geo_id, PointPos::Start);
        let b = GeoPointRef::new(geo_id, PointPos::End);
        if is_pinned(pinned, a) {
            set_point(model, b, s + dir * value);
        } else if is_pinned(pinned, b) {
            set_point(model, a, e - dir * value);
        } else {
            let mid = s.midpoint(&e);
            set_point(model, a, mid - dir * (value / 2.0));
            set_point(model, b, mid + dir * (value / 2.0));
        }
    }
    error
}

fn project_axis_distance(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    a: GeoPointRef,
    b: Option<GeoPointRef>,
    value: f64,
    x_axis: bool,
) -> f64 {
    // Single-operand form measures from the origin.
    let pa = match b {
        Some(_) => get_point(model, a),
        None => Some(Point2d::ORIGIN),
    };
    let (origin, moved) = match b {
        Some(b) => (a, b),
        None => (a, a),
    };
    let Some(pa) = pa else { return 0.0 };
    let Some(pb) = get_point(model, moved) else {
        return 0.0;
    };
    let actual = if x_axis { pb.x - pa.x } else { pb.y - pa.y };
    let error = (actual - value).abs();
    if error > 1e-12 {
        let target_b = if x_axis {
            Point2d::new(pa.x + value, pb.y)
        } else {
            Point2d::new(pb.x, pa.y + value)
        };
        let target_a = if x_axis {
            Point2d::new(pb.x - value, pa.y)
        } else {
            Point2d::new(pa.x, pb.y - value)
        };
        if b.is_some() {
            project_pair(model, pinned, origin, moved, target_b, target_a);
        } else if !is_pinned(pinned, moved) {
            set_point(model, moved, target_b);
        }
    }
    error
}

fn project_equal(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    a: GeoId,
    b: GeoId,
) -> f64 {
    if let (Some(la), Some(lb)) = (edge_length(model, a), edge_length(model, b)) {
        let error = (la - lb).abs();
        if error > 1e-12 {
            if pinned.map(|p| p.geo_id) == Some(b) {
                project_length(model, pinned, a, lb);
            } else {
                project_length(model, pinned, b, la);
            }
        }
        return error;
    }
    if let (Some((_, ra)), Some((_, rb))) = (circle_of(model, a), circle_of(model, b)) {
        let error = (ra - rb).abs();
        if pinned.map(|p| p.geo_id) == Some(b) {
            set_radius(model, a, rb);
        } else {
            set_radius(model, b, ra);
        }
        return error;
    }
    0.0
}

fn project_tangent(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    a: GeoId,
    b: GeoId,
) -> f64 {
    // Line-circle: distance from center to the line equals the radius.
    let (line_id, circle_id) = if line_of(model, a).is_some() && circle_of(model, b).is_some() {
        (a, b)
    } else if line_of(model, b).is_some() && circle_of(model, a).is_some() {
        (b, a)
    } else if let (Some((c1, r1)), Some((c2, r2))) = (circle_of(model, a), circle_of(model, b)) {
        // Circle-circle: external or internal tangency, nearest branch.
        let dist = c1.distance(&c2);
        let external = (dist - (r1 + r2)).abs();
        let internal = (dist - (r1 - r2).abs()).abs();
        let (error, target) = if external <= internal {
            (external, r1 + r2)
        } else {
            (internal, (r1 - r2).abs())
        };
        if error > 1e-12 && dist > 1e-12 {
            let dir = (c2 - c1) * (1.0 / dist);
            let moved = if pinned.map(|p| p.geo_id) == Some(b) { a } else { b };
            let fixed = if moved == a { b } else { a };
            let (cf, _) = circle_of(model, fixed).unwrap_or((c1, r1));
            let delta_dir = if moved == b { dir } else { dir * -1.0 };
            let new_center = cf + delta_dir * target;
            let (cm, _) = circle_of(model, moved).unwrap_or((c2, r2));
            let _ = translate_element(model, moved, new_center - cm);
        }
        return error;
    } else {
        return 0.0;
    };

    let Some((s, e)) = line_of(model, line_id) else {
        return 0.0;
    };
    let Some((c, r)) = circle_of(model, circle_id) else {
        return 0.0;
    };
    let Some(d) = (e - s).normalized() else {
        return 0.0;
    };
    let v = c - s;
    let perp = v - d * v.dot(&d);
    let dist = perp.norm();
    let error = (dist - r).abs();
    if error > 1e-12 {
        let line_pinned = pinned.map(|p| p.geo_id) == Some(line_id);
        let circle_pinned = is_pinned(pinned, GeoPointRef::edge(circle_id));
        if line_pinned || !circle_pinned {
            // Grow/shrink the circle onto the line.
            set_radius(model, circle_id, dist);
        } else if dist > 1e-12 {
            // Slide the line along its normal onto the circle.
            let n = perp * (1.0 / dist);
            let shift = n * (dist - r);
            let _ = translate_element(model, line_id, shift);
        }
    }
    error
}

fn project_angle(
    model: &mut GeometryModel,
    pinned: Option<GeoPointRef>,
    a: GeoId,
    b: Option<GeoId>,
    value: f64,
) -> f64 {
    let Some((a0, a1)) = line_of(model, a) else {
        return 0.0;
    };
    let Some(da) = (a1 - a0).normalized() else {
        return 0.0;
    };
    match b {
        None => {
            let current = da.y.atan2(da.x);
            let error = wrap_angle(current - value).abs();
            if error > 1e-12 {
                aim_line(model, a, Point2d::new(value.cos(), value.sin()), pinned);
            }
            error
        }
        Some(b) => {
            let Some((b0, b1)) = line_of(model, b) else {
                return 0.0;
            };
            let Some(db) = (b1 - b0).normalized() else {
                return 0.0;
            };
            let current = db.y.atan2(db.x) - da.y.atan2(da.x);
            let error = wrap_angle(current - value).abs();
            if error > 1e-12 {
                let target_angle = da.y.atan2(da.x) + value;
                let target = Point2d::new(target_angle.cos(), target_angle.sin());
                if pinned.map(|p| p.geo_id) == Some(b) {
                    let back = db.y.atan2(db.x) - value;
                    aim_line(model, a, Point2d::new(back.cos(), back.sin()), pinned);
                } else {
                    aim_line(model, b, target, pinned);
                }
            }
            error
        }
    }
}

fn project_internal_alignment(
    model: &mut GeometryModel,
    element: GeoId,
    host: GeoId,
    role: AlignmentRole,
) -> f64 {
    let Some(target) = alignment_target(model, host, role) else {
        return 0.0;
    };
    match role {
        AlignmentRole::BSplineControlPoint(_) => {
            // The helper is the pole circle: center follows the pole.
            let Some((c, _)) = circle_of(model, element) else {
                return 0.0;
            };
            let error = c.distance(&target);
            let _ = translate_element(model, element, target - c);
            error
        }
        _ => {
            let r = GeoPointRef::new(element, PointPos::Start);
            let Some(p) = get_point(model, r) else {
                return 0.0;
            };
            let error = p.distance(&target);
            set_point(model, r, target);
            error
        }
    }
}

fn alignment_target(model: &GeometryModel, host: GeoId, role: AlignmentRole) -> Option<Point2d> {
    let element = model.geometry(host).ok()?;
    match (&element.kind, role) {
        (GeometryKind::BSpline(b), AlignmentRole::BSplineControlPoint(i)) => {
            b.control_points.get(i).copied()
        }
        (GeometryKind::BSpline(b), AlignmentRole::BSplineKnotPoint(i)) => {
            let (t0, t1) = (b.first_param(), b.last_param());
            let interior = b.knots.iter().filter(|k| **k > t0 && **k < t1);
            let k = interior.clone().nth(i).copied()?;
            Some(b.eval(k))
        }
        (GeometryKind::Ellipse(e), AlignmentRole::EllipseFocus1)
        | (GeometryKind::Ellipse(e), AlignmentRole::EllipseFocus2) => {
            let c = (e.major_radius * e.major_radius - e.minor_radius * e.minor_radius)
                .max(0.0)
                .sqrt();
            let sign = if role == AlignmentRole::EllipseFocus1 {
                1.0
            } else {
                -1.0
            };
            let (sin, cos) = e.angle.sin_cos();
            Some(Point2d::new(
                e.center.x + sign * c * cos,
                e.center.y + sign * c * sin,
            ))
        }
        _ => None,
    }
}

fn wrap_angle(mut a: f64) -> f64 {
    use std::f64::consts::PI;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Scalar residual of a constraint in its natural units.
pub fn constraint_residual(model: &GeometryModel, kind: &ConstraintKind) -> f64 {
    use ConstraintKind::*;
    let pt = |r: &GeoPointRef| get_point(model, *r);
    match kind {
        Coincident { a, b } => match (pt(a), pt(b)) {
            (Some(pa), Some(pb)) => pa.distance(&pb),
            _ => 0.0,
        },
        Horizontal { first, second } | Vertical { first, second } => {
            let horizontal = matches!(kind, Horizontal { .. });
            let (a, b) = match second {
                Some(second) => (*first, *second),
                None => (
                    GeoPointRef::new(first.geo_id, PointPos::Start),
                    GeoPointRef::new(first.geo_id, PointPos::End),
                ),
            };
            match (get_point(model, a), get_point(model, b)) {
                (Some(pa), Some(pb)) => {
                    if horizontal {
                        (pa.y - pb.y).abs()
                    } else {
                        (pa.x - pb.x).abs()
                    }
                }
                _ => 0.0,
            }
        }
        Parallel { a, b } => match (line_of(model, *a), line_of(model, *b)) {
            (Some((a0, a1)), Some((b0, b1))) => {
                match ((a1 - a0).normalized(), (b1 - b0).normalized()) {
                    (Some(da), Some(db)) => da.cross(&db).abs(),
                    _ => 0.0,
                }
            }
            _ => 0.0,
        },
        Perpendicular { a, b } => match (line_of(model, *a), line_of(model, *b)) {
            (Some((a0, a1)), Some((b0, b1))) => {
                match ((a1 - a0).normalized(), (b1 - b0).normalized()) {
                    (Some(da), Some(db)) => da.dot(&db).abs(),
                    _ => 0.0,
                }
            }
            _ => 0.0,
        },
        Tangent { a, b } => tangent_residual(model, *a, *b),
        Equal { a, b } => {
            if let (Some(la), Some(lb)) = (edge_length(model, *a), edge_length(model, *b)) {
                (la - lb).abs()
            } else if let (Some((_, ra)), Some((_, rb))) =
                (circle_of(model, *a), circle_of(model, *b))
            {
                (ra - rb).abs()
            } else {
                0.0
            }
        }
        Symmetric { a, b, reference } => match (pt(a), pt(b)) {
            (Some(pa), Some(pb)) => {
                if reference.is_point() {
                    match pt(reference) {
                        Some(pr) => pa.midpoint(&pb).distance(&pr),
                        None => 0.0,
                    }
                } else {
                    match line_of(model, reference.geo_id) {
                        Some((l0, l1)) => match reflect_across_line(pa, l0, l1) {
                            Some(r) => r.distance(&pb),
                            None => 0.0,
                        },
                        None => 0.0,
                    }
                }
            }
            _ => 0.0,
        },
        Block { .. } => 0.0,
        PointOnObject { point, object } => {
            let Some(p) = pt(point) else { return 0.0 };
            match model.geometry(*object).map(|e| &e.kind) {
                Ok(GeometryKind::LineSegment(l)) => match l.direction().normalized() {
                    Some(d) => {
                        let v = p - l.start;
                        (v - d * v.dot(&d)).norm()
                    }
                    None => 0.0,
                },
                Ok(GeometryKind::Circle(c)) => (p.distance(&c.center) - c.radius).abs(),
                Ok(GeometryKind::ArcOfCircle(a)) => (p.distance(&a.center) - a.radius).abs(),
                _ => 0.0,
            }
        }
        Distance { a, b, value } => match b {
            Some(b) => match (pt(a), pt(b)) {
                (Some(pa), Some(pb)) => (pa.distance(&pb) - value).abs(),
                _ => 0.0,
            },
            None => match edge_length(model, a.geo_id) {
                Some(len) => (len - value).abs(),
                None => 0.0,
            },
        },
        DistanceX { a, b, value } | DistanceY { a, b, value } => {
            let x_axis = matches!(kind, DistanceX { .. });
            let (pa, pb) = match b {
                Some(b) => (pt(a), pt(b)),
                None => (Some(Point2d::ORIGIN), pt(a)),
            };
            match (pa, pb) {
                (Some(pa), Some(pb)) => {
                    let actual = if x_axis { pb.x - pa.x } else { pb.y - pa.y };
                    (actual - value).abs()
                }
                _ => 0.0,
            }
        }
        Radius { edge, value } => match circle_of(model, *edge) {
            Some((_, r)) => (r - value).abs(),
            None => 0.0,
        },
        Diameter { edge, value } => match circle_of(model, *edge) {
            Some((_, r)) => (2.0 * r - value).abs(),
            None => 0.0,
        },
        Weight { edge, value } => match circle_of(model, *edge) {
            Some((_, r)) => (r - value).abs(),
            None => 0.0,
        },
        Angle { a, b, value } => {
            let Some((a0, a1)) = line_of(model, *a) else {
                return 0.0;
            };
            let Some(da) = (a1 - a0).normalized() else {
                return 0.0;
            };
            match b {
                None => wrap_angle(da.y.atan2(da.x) - value).abs(),
                Some(b) => {
                    let Some((b0, b1)) = line_of(model, *b) else {
                        return 0.0;
                    };
                    let Some(db) = (b1 - b0).normalized() else {
                        return 0.0;
                    };
                    wrap_angle(db.y.atan2(db.x) - da.y.atan2(da.x) - value).abs()
                }
            }
        }
        InternalAlignment {
            element,
            host,
            role,
        } => {
            let Some(target) = alignment_target(model, *host, *role) else {
                return 0.0;
            };
            match role {
                AlignmentRole::BSplineControlPoint(_) => match circle_of(model, *element) {
                    Some((c, _)) => c.distance(&target),
                    None => 0.0,
                },
                _ => match get_point(model, GeoPointRef::new(*element, PointPos::Start)) {
                    Some(p) => p.distance(&target),
                    None => 0.0,
                },
            }
        }
        SnellsLaw {
            ray1,
            ray2,
            boundary,
            ratio,
        } => snells_residual(model, *ray1, *ray2, *boundary, *ratio),
    }
}

fn tangent_residual(model: &GeometryModel, a: GeoId, b: GeoId) -> f64 {
    let line_circle = |line_id: GeoId, circle_id: GeoId| -> Option<f64> {
        let (s, e) = line_of(model, line_id)?;
        let (c, r) = circle_of(model, circle_id)?;
        let d = (e - s).normalized()?;
        let v = c - s;
        Some(((v - d * v.dot(&d)).norm() - r).abs())
    };
    if let Some(r) = line_circle(a, b) {
        return r;
    }
    if let Some(r) = line_circle(b, a) {
        return r;
    }
    if let (Some((c1, r1)), Some((c2, r2))) = (circle_of(model, a), circle_of(model, b)) {
        let dist = c1.distance(&c2);
        return (dist - (r1 + r2)).abs().min((dist - (r1 - r2).abs()).abs());
    }
    0.0
}

fn snells_residual(
    model: &GeometryModel,
    ray1: GeoPointRef,
    ray2: GeoPointRef,
    boundary: GeoId,
    ratio: f64,
) -> f64 {
    let (Some(p1), Some(p2)) = (get_point(model, ray1), get_point(model, ray2)) else {
        return 0.0;
    };
    let Some((b0, b1)) = line_of(model, boundary) else {
        return 0.0;
    };
    let Some(n) = (b1 - b0)
        .normalized()
        .map(|d| Point2d::new(-d.y, d.x))
    else {
        return 0.0;
    };
    // The two rays meet at the boundary (their shared coincident point);
    // approximate the meeting point as the midpoint of the two references.
    let meet = p1.midpoint(&p2);
    let (Some(d1), Some(d2)) = ((p1 - meet).normalized(), (p2 - meet).normalized()) else {
        return 0.0;
    };
    let sin1 = d1.cross(&n).abs();
    let sin2 = d2.cross(&n).abs();
    (sin1 - ratio * sin2).abs()
}

fn estimate_dof(model: &GeometryModel, malformed: &[usize]) -> i32 {
    let params: i32 = model
        .internal_geometry()
        .iter()
        .map(|e| match &e.kind {
            GeometryKind::Point { .. } => 2,
            GeometryKind::LineSegment(_) => 4,
            GeometryKind::Circle(_) => 3,
            GeometryKind::Ellipse(_) => 5,
            GeometryKind::ArcOfCircle(_) => 5,
            GeometryKind::ArcOfEllipse(_) => 7,
            GeometryKind::ArcOfHyperbola(_) => 7,
            GeometryKind::ArcOfParabola(_) => 6,
            GeometryKind::BSpline(b) => 2 * b.control_points.len() as i32,
        })
        .sum();

    let equations: i32 = model
        .constraints()
        .iter()
        .enumerate()
        .filter(|(i, c)| c.active && c.driving && !malformed.contains(i))
        .map(|(_, c)| constraint_equation_count(model, c))
        .sum();

    params - equations
}

fn constraint_equation_count(model: &GeometryModel, constraint: &Constraint) -> i32 {
    use ConstraintKind::*;
    match &constraint.kind {
        Coincident { .. } | Symmetric { .. } | InternalAlignment { .. } => 2,
        Block { edge } => match model.geometry(*edge).map(|e| &e.kind) {
            Ok(GeometryKind::Point { .. }) => 2,
            Ok(GeometryKind::LineSegment(_)) => 4,
            Ok(GeometryKind::Circle(_)) => 3,
            _ => 2,
        },
        _ => 1,
    }
}

fn find_redundant(model: &GeometryModel) -> Vec<usize> {
    let mut redundant = Vec::new();
    let normalized: Vec<_> = model
        .constraints()
        .iter()
        .map(|c| normalize_kind(&c.kind))
        .collect();
    for i in 0..normalized.len() {
        for j in 0..i {
            if normalized[i] == normalized[j] {
                redundant.push(i);
                break;
            }
        }
    }
    redundant
}

/// Order-insensitive form of symmetric operand pairs, so that
/// `Coincident(a, b)` duplicates `Coincident(b, a)`.
fn normalize_kind(kind: &ConstraintKind) -> ConstraintKind {
    use ConstraintKind::*;
    let mut kind = kind.clone();
    match &mut kind {
        Coincident { a, b } => {
            if (b.geo_id, b.pos as u8) < (a.geo_id, a.pos as u8) {
                std::mem::swap(a, b);
            }
        }
        Parallel { a, b } | Perpendicular { a, b } | Tangent { a, b } | Equal { a, b } => {
            if b < a {
                std::mem::swap(a, b);
            }
        }
        _ => {}
    }
    kind
}

/// A Parallel constraint between two lines that are each independently
/// forced horizontal (or each vertical) adds no information.
fn find_partially_redundant(model: &GeometryModel) -> Vec<usize> {
    use ConstraintKind::*;
    let leveled = |geo_id: GeoId, horizontal: bool| -> bool {
        model.constraints().iter().any(|c| match &c.kind {
            Horizontal { first, second: None } if horizontal => first.geo_id == geo_id,
            Vertical { first, second: None } if !horizontal => first.geo_id == geo_id,
            _ => false,
        })
    };
    model
        .constraints()
        .iter()
        .enumerate()
        .filter(|(_, c)| match &c.kind {
            Parallel { a, b } => {
                (leveled(*a, true) && leveled(*b, true)) || (leveled(*a, false) && leveled(*b, false))
            }
            _ => false,
        })
        .map(|(i, _)| i)
        .collect()
}
