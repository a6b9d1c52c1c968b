//! End-to-end solver behavior over small sketches.

use anyhow::Result;

use sketchkit_core::constraint::{Constraint, ConstraintKind};
use sketchkit_core::geometry::{Circle, GeometryElement, GeometryKind, LineSeg, Point2d};
use sketchkit_core::id::{GeoPointRef, PointPos};
use sketchkit_core::model::GeometryModel;
use sketchkit_solver::{PlanarSolver, SketchSolver, SolveError, SolveStatus};

fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> GeometryElement {
    GeometryElement::new(GeometryKind::LineSegment(LineSeg::new(
        Point2d::new(x0, y0),
        Point2d::new(x1, y1),
    )))
}

fn circle(cx: f64, cy: f64, r: f64) -> GeometryElement {
    GeometryElement::new(GeometryKind::Circle(Circle::new(Point2d::new(cx, cy), r)))
}

#[test]
fn horizontal_line_levels_out() {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 10.0, 3.0));
    model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
        first: GeoPointRef::edge(l),
        second: None,
    }));

    let mut solver = PlanarSolver::new();
    solver.solve(&mut model, false);

    let s = model.point(l, PointPos::Start).unwrap();
    let e = model.point(l, PointPos::End).unwrap();
    assert!((s.y - e.y).abs() < 1e-6, "line not level: {s:?} {e:?}");
}

#[test]
fn coincident_points_snap_together() {
    let mut model = GeometryModel::new();
    let a = model.add_geometry(line(0.0, 0.0, 1.0, 0.0));
    let b = model.add_geometry(line(1.2, 0.1, 2.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Coincident {
        a: GeoPointRef::new(a, PointPos::End),
        b: GeoPointRef::new(b, PointPos::Start),
    }));

    let mut solver = PlanarSolver::new();
    solver.solve(&mut model, false);

    let pa = model.point(a, PointPos::End).unwrap();
    let pb = model.point(b, PointPos::Start).unwrap();
    assert!(pa.distance(&pb) < 1e-6);
}

#[test]
fn radius_constraint_resizes_circle() {
    let mut model = GeometryModel::new();
    let c = model.add_geometry(circle(2.0, 2.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Radius {
        edge: c,
        value: 3.5,
    }));

    let mut solver = PlanarSolver::new();
    solver.solve(&mut model, false);

    match &model.geometry(c).unwrap().kind {
        GeometryKind::Circle(circle) => assert!((circle.radius - 3.5).abs() < 1e-9),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn distance_constraint_is_honored() {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 4.0, 0.0));
    model.add_constraint(Constraint::new(ConstraintKind::Distance {
        a: GeoPointRef::edge(l),
        b: None,
        value: 10.0,
    }));

    let mut solver = PlanarSolver::new();
    solver.solve(&mut model, false);

    let s = model.point(l, PointPos::Start).unwrap();
    let e = model.point(l, PointPos::End).unwrap();
    assert!((s.distance(&e) - 10.0).abs() < 1e-6);
}

#[test]
fn status_reflects_degrees_of_freedom() {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 10.0, 0.0));
    model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
        first: GeoPointRef::edge(l),
        second: None,
    }));

    let mut solver = PlanarSolver::new();
    let outcome = solver.solve(&mut model, false);
    // A line has 4 parameters, one satisfied equation: 3 DoF left.
    assert_eq!(outcome.dof, 3);
    assert_eq!(outcome.status(), SolveStatus::UnderConstrained { dof: 3 });
}

#[test]
fn duplicate_constraints_flagged_redundant() {
    let mut model = GeometryModel::new();
    let a = model.add_geometry(line(0.0, 0.0, 1.0, 0.0));
    let b = model.add_geometry(line(0.0, 1.0, 1.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Parallel { a, b }));
    // Same relation, operands swapped.
    model.add_constraint(Constraint::new(ConstraintKind::Parallel { a: b, b: a }));

    let mut solver = PlanarSolver::new();
    let outcome = solver.solve(&mut model, false);
    assert_eq!(outcome.redundant, vec![1]);
}

#[test]
fn parallel_between_two_horizontals_is_partially_redundant() {
    let mut model = GeometryModel::new();
    let a = model.add_geometry(line(0.0, 0.0, 1.0, 0.0));
    let b = model.add_geometry(line(0.0, 1.0, 1.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
        first: GeoPointRef::edge(a),
        second: None,
    }));
    model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
        first: GeoPointRef::edge(b),
        second: None,
    }));
    let p = model.add_constraint(Constraint::new(ConstraintKind::Parallel { a, b }));

    let mut solver = PlanarSolver::new();
    let outcome = solver.solve(&mut model, false);
    assert_eq!(outcome.partially_redundant, vec![p]);
}

#[test]
fn conflicting_dimensions_reported() {
    let mut model = GeometryModel::new();
    let c = model.add_geometry(circle(0.0, 0.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Radius {
        edge: c,
        value: 2.0,
    }));
    model.add_constraint(Constraint::new(ConstraintKind::Radius {
        edge: c,
        value: 5.0,
    }));

    let mut solver = PlanarSolver::new();
    let outcome = solver.solve(&mut model, false);
    assert!(!outcome.conflicting.is_empty());
    assert!(outcome.is_invalid());
    assert!(matches!(
        outcome.status(),
        SolveStatus::OverConstrained { .. }
    ));
}

#[test]
fn stale_operand_reported_malformed_not_panicked() {
    let mut model = GeometryModel::new();
    model.add_geometry(line(0.0, 0.0, 1.0, 0.0));
    model.add_constraint(Constraint::new(ConstraintKind::Parallel { a: 0, b: 9 }));

    let mut solver = PlanarSolver::new();
    let outcome = solver.solve(&mut model, false);
    assert_eq!(outcome.malformed, vec![0]);
}

#[test]
fn temporary_move_requires_arming() -> Result<()> {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 1.0, 0.0));

    let mut solver = PlanarSolver::new();
    let err = solver
        .move_temporary_point(&mut model, l, PointPos::End, Point2d::new(5.0, 5.0), false)
        .unwrap_err();
    assert_eq!(err, SolveError::NotArmed);

    solver.init_temporary_move(&model, l, PointPos::End, false)?;
    solver.move_temporary_point(&mut model, l, PointPos::End, Point2d::new(5.0, 5.0), false)?;
    assert_eq!(model.point(l, PointPos::End)?, Point2d::new(5.0, 5.0));
    Ok(())
}

#[test]
fn relative_move_offsets_from_armed_reference() -> Result<()> {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(1.0, 1.0, 4.0, 1.0));

    let mut solver = PlanarSolver::new();
    solver.init_temporary_move(&model, l, PointPos::Start, true)?;
    solver.move_temporary_point(&mut model, l, PointPos::Start, Point2d::new(0.5, -0.5), true)?;
    assert_eq!(model.point(l, PointPos::Start)?, Point2d::new(1.5, 0.5));
    Ok(())
}

#[test]
fn dragged_point_stays_where_placed_under_constraints() -> Result<()> {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 10.0, 0.0));
    model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
        first: GeoPointRef::edge(l),
        second: None,
    }));

    let mut solver = PlanarSolver::new();
    solver.solve(&mut model, false);
    solver.init_temporary_move(&model, l, PointPos::End, false)?;
    solver.move_temporary_point(&mut model, l, PointPos::End, Point2d::new(7.0, 4.0), false)?;

    // The dragged endpoint is pinned; the other end levels out to it.
    let s = model.point(l, PointPos::Start)?;
    let e = model.point(l, PointPos::End)?;
    assert_eq!(e, Point2d::new(7.0, 4.0));
    assert!((s.y - e.y).abs() < 1e-6);
    Ok(())
}

#[test]
fn whole_edge_drag_translates_rigidly() -> Result<()> {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 3.0, 0.0));

    let mut solver = PlanarSolver::new();
    solver.init_temporary_move(&model, l, PointPos::None, true)?;
    solver.move_temporary_point(&mut model, l, PointPos::None, Point2d::new(1.0, 2.0), true)?;

    assert_eq!(model.point(l, PointPos::Start)?, Point2d::new(1.0, 2.0));
    assert_eq!(model.point(l, PointPos::End)?, Point2d::new(4.0, 2.0));
    Ok(())
}

#[test]
fn tangent_drag_of_circle_slides_the_line() -> Result<()> {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 10.0, 0.0));
    let c = model.add_geometry(circle(5.0, 3.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Tangent { a: l, b: c }));

    let mut solver = PlanarSolver::new();
    solver.init_temporary_move(&model, c, PointPos::None, true)?;
    solver.move_temporary_point(&mut model, c, PointPos::None, Point2d::new(0.0, 3.0), true)?;

    // The dragged circle keeps its radius; the line follows it.
    match &model.geometry(c)?.kind {
        GeometryKind::Circle(circle) => {
            assert_eq!(circle.center, Point2d::new(5.0, 6.0));
            assert!((circle.radius - 1.0).abs() < 1e-9);
        }
        other => panic!("unexpected kind {other:?}"),
    }
    let s = model.point(l, PointPos::Start)?;
    let e = model.point(l, PointPos::End)?;
    assert!((s.y - 5.0).abs() < 1e-6 && (e.y - 5.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn tangent_drag_of_line_resizes_the_circle() -> Result<()> {
    let mut model = GeometryModel::new();
    let l = model.add_geometry(line(0.0, 0.0, 10.0, 0.0));
    let c = model.add_geometry(circle(5.0, 3.0, 1.0));
    model.add_constraint(Constraint::new(ConstraintKind::Tangent { a: l, b: c }));

    let mut solver = PlanarSolver::new();
    solver.init_temporary_move(&model, l, PointPos::None, true)?;
    solver.move_temporary_point(&mut model, l, PointPos::None, Point2d::new(0.0, -1.0), true)?;

    // The dragged line stays put; the circle grows out to meet it.
    assert_eq!(model.point(l, PointPos::Start)?, Point2d::new(0.0, -1.0));
    assert_eq!(model.point(l, PointPos::End)?, Point2d::new(10.0, -1.0));
    match &model.geometry(c)?.kind {
        GeometryKind::Circle(circle) => {
            assert_eq!(circle.center, Point2d::new(5.0, 3.0));
            assert!((circle.radius - 4.0).abs() < 1e-9);
        }
        other => panic!("unexpected kind {other:?}"),
    }
    Ok(())
}

#[test]
fn failed_move_restores_model() {
    let mut model = GeometryModel::new();
    let c = model.add_geometry(circle(0.0, 0.0, 1.0));
    // Contradictory radii make any move unsatisfiable.
    model.add_constraint(Constraint::new(ConstraintKind::Radius {
        edge: c,
        value: 2.0,
    }));
    model.add_constraint(Constraint::new(ConstraintKind::Radius {
        edge: c,
        value: 5.0,
    }));

    let mut solver = PlanarSolver::new();
    solver
        .init_temporary_move(&model, c, PointPos::Mid, false)
        .unwrap();
    let before = model.point(c, PointPos::Mid).unwrap();
    let err = solver
        .move_temporary_point(&mut model, c, PointPos::Mid, Point2d::new(8.0, 8.0), false)
        .unwrap_err();
    assert!(matches!(err, SolveError::NoConvergence { .. }));
    assert_eq!(model.point(c, PointPos::Mid).unwrap(), before);
}

#[test]
fn normal_at_circle_points_outward() {
    let mut model = GeometryModel::new();
    let c = model.add_geometry(circle(1.0, 1.0, 2.0));
    let solver = PlanarSolver::new();
    let n = solver
        .normal_at_point(&model, c, Point2d::new(3.0, 1.0))
        .unwrap();
    assert!((n.x - 1.0).abs() < 1e-9 && n.y.abs() < 1e-9);
}

#[test]
fn dependency_group_walks_constraint_graph() {
    let mut model = GeometryModel::new();
    let a = model.add_geometry(line(0.0, 0.0, 1.0, 0.0));
    let b = model.add_geometry(line(1.0, 0.0, 2.0, 0.0));
    let c = model.add_geometry(line(2.0, 0.0, 3.0, 0.0));
    let lone = model.add_geometry(line(9.0, 9.0, 9.0, 10.0));
    model.add_constraint(Constraint::new(ConstraintKind::Coincident {
        a: GeoPointRef::new(a, PointPos::End),
        b: GeoPointRef::new(b, PointPos::Start),
    }));
    model.add_constraint(Constraint::new(ConstraintKind::Parallel { a: b, b: c }));

    let solver = PlanarSolver::new();
    let group = solver.dependency_group(&model, a, PointPos::End);
    assert_eq!(group, vec![a, b, c]);
    assert!(!group.contains(&lone));
}
