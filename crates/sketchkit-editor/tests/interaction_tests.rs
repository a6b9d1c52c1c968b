//! State machine scenarios exercised directly against the pick/selection
//! collaborators: rejected drags, pole weight drags, drag-locked poles, and
//! constraint-glyph drag escalation.

use anyhow::Result;

use sketchkit_core::config::RenderConfig;
use sketchkit_core::constraint::{AlignmentRole, Constraint, ConstraintKind};
use sketchkit_core::geometry::{
    BSpline, Circle, GeometryElement, GeometryKind, InternalAlignment, LineSeg, Point2d,
};
use sketchkit_core::id::{GeoPointRef, PointPos};
use sketchkit_core::model::GeometryModel;
use sketchkit_editor::interaction::{InteractionContext, InteractionState, InteractionStateMachine};
use sketchkit_editor::{
    GlyphLayout, PickIndex, RecordingSink, RenderCache, SelectionManager, SketchHit, Viewport,
};
use sketchkit_solver::PlanarSolver;

/// Everything one machine-level scenario needs, rebuilt from the committed
/// model once up front.
struct Rig {
    model: GeometryModel,
    solver: PlanarSolver,
    config: RenderConfig,
    viewport: Viewport,
    cache: RenderCache,
    pick: PickIndex,
    glyphs: GlyphLayout,
    selection: SelectionManager,
    sink: RecordingSink,
    machine: InteractionStateMachine,
}

impl Rig {
    fn new(model: GeometryModel, config: RenderConfig) -> Self {
        let viewport = Viewport::default();
        let cache = RenderCache::build(&model, &config, false);
        let pick = PickIndex::build(&cache, &viewport, &config);
        let glyphs = GlyphLayout::build(&model, &viewport, &config, false);
        Self {
            model,
            solver: PlanarSolver::new(),
            config,
            viewport,
            cache,
            pick,
            glyphs,
            selection: SelectionManager::new(),
            sink: RecordingSink::new(),
            machine: InteractionStateMachine::new(),
        }
    }

    fn px(&self, x: f64, y: f64) -> (f64, f64) {
        self.viewport.world_to_pixel(Point2d::new(x, y))
    }

    fn press(&mut self, x: f64, y: f64, time_ms: u64) {
        let mut ctx = InteractionContext {
            model: &mut self.model,
            solver: &mut self.solver,
            cache: &self.cache,
            pick: &self.pick,
            glyphs: &self.glyphs,
            selection: &mut self.selection,
            undo: &mut self.sink,
            viewport: &self.viewport,
            config: &self.config,
        };
        self.machine.press(&mut ctx, x, y, time_ms);
    }

    fn mouse_move(&mut self, x: f64, y: f64) {
        let mut ctx = InteractionContext {
            model: &mut self.model,
            solver: &mut self.solver,
            cache: &self.cache,
            pick: &self.pick,
            glyphs: &self.glyphs,
            selection: &mut self.selection,
            undo: &mut self.sink,
            viewport: &self.viewport,
            config: &self.config,
        };
        self.machine.mouse_move(&mut ctx, x, y);
    }

    fn release(&mut self, x: f64, y: f64) {
        let mut ctx = InteractionContext {
            model: &mut self.model,
            solver: &mut self.solver,
            cache: &self.cache,
            pick: &self.pick,
            glyphs: &self.glyphs,
            selection: &mut self.selection,
            undo: &mut self.sink,
            viewport: &self.viewport,
            config: &self.config,
        };
        self.machine.release(&mut ctx, x, y);
    }
}

fn pole_sketch(weights: Vec<f64>) -> GeometryModel {
    let mut model = GeometryModel::new();
    let mut spline = BSpline::clamped(
        2,
        vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(30.0, 30.0),
            Point2d::new(60.0, 0.0),
        ],
    );
    spline.weights = weights;
    let host = model.add_geometry(GeometryElement::new(GeometryKind::BSpline(spline)));
    let pole = model.add_geometry(
        GeometryElement::construction(GeometryKind::Circle(Circle::new(
            Point2d::new(30.0, 30.0),
            20.0,
        )))
        .with_alignment(InternalAlignment::BSplineControlPoint(1)),
    );
    model.add_constraint(Constraint::new(ConstraintKind::InternalAlignment {
        element: pole,
        host,
        role: AlignmentRole::BSplineControlPoint(1),
    }));
    model
}

#[test]
fn rejected_drag_target_leaves_model_untouched() -> Result<()> {
    let mut model = GeometryModel::new();
    model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
        LineSeg::new(Point2d::new(10.0, 5.0), Point2d::new(20.0, 5.0)),
    )));
    // A satisfied length plus a contradictory one: no drag target can
    // converge.
    model.add_constraint(Constraint::new(ConstraintKind::Distance {
        a: GeoPointRef::new(0, PointPos::Start),
        b: Some(GeoPointRef::new(0, PointPos::End)),
        value: 10.0,
    }));
    model.add_constraint(Constraint::new(ConstraintKind::Distance {
        a: GeoPointRef::new(0, PointPos::Start),
        b: Some(GeoPointRef::new(0, PointPos::End)),
        value: 25.0,
    }));
    let mut rig = Rig::new(model, RenderConfig::default());
    let before = serde_json::to_string(&rig.model)?;

    let (x, y) = rig.px(10.0, 5.0);
    rig.press(x, y, 0);
    rig.mouse_move(x + 2.0, y);
    assert!(matches!(
        rig.machine.state(),
        InteractionState::DragPoint { .. }
    ));
    let (tx, ty) = rig.px(60.0, 40.0);
    rig.mouse_move(tx, ty);
    rig.release(tx, ty);

    assert_eq!(*rig.machine.state(), InteractionState::Idle);
    assert_eq!(serde_json::to_string(&rig.model)?, before);
    assert!(rig.sink.records().is_empty());
    Ok(())
}

#[test]
fn pole_weight_drag_divides_by_weight_scale() -> Result<()> {
    let model = pole_sketch(vec![1.0, 2.0, 1.0]);
    let config = RenderConfig {
        weight_scale: 2.0,
        ..RenderConfig::default()
    };
    let mut rig = Rig::new(model, config);

    // Grab the pole circle on its rim.
    let (x, y) = rig.px(50.0, 30.0);
    rig.press(x, y, 0);
    rig.mouse_move(x + 2.0, y);
    assert!(matches!(
        rig.machine.state(),
        InteractionState::DragCurve { geo_id: 1 }
    ));
    // 60 sketch units from the center, scale 2: the solver sees 30.
    let (tx, ty) = rig.px(90.0, 30.0);
    rig.mouse_move(tx, ty);
    rig.release(tx, ty);

    let radius = match &rig.model.geometry(1)?.kind {
        GeometryKind::Circle(c) => c.radius,
        other => panic!("pole is not a circle: {other:?}"),
    };
    assert!((radius - 30.0).abs() < 1e-9);
    assert_eq!(rig.sink.committed_count(), 1);
    assert_eq!(rig.sink.records()[0].name, "Drag edge");
    Ok(())
}

#[test]
fn non_rational_pole_is_drag_locked() -> Result<()> {
    // No weights: the spline is non-rational and its poles refuse drags.
    let model = pole_sketch(Vec::new());
    let mut rig = Rig::new(model, RenderConfig::default());
    let before = serde_json::to_string(&rig.model)?;

    let (x, y) = rig.px(50.0, 30.0);
    rig.press(x, y, 0);
    rig.mouse_move(x + 2.0, y);
    // The drag attempt collapses straight back to Idle.
    assert_eq!(*rig.machine.state(), InteractionState::Idle);

    let (tx, ty) = rig.px(90.0, 30.0);
    rig.mouse_move(tx, ty);
    rig.release(tx, ty);
    assert_eq!(serde_json::to_string(&rig.model)?, before);
    assert!(rig.sink.records().is_empty());
    Ok(())
}

#[test]
fn uniform_weight_pole_is_drag_locked() -> Result<()> {
    // Equal weights everywhere: rational in storage, non-rational in effect.
    let model = pole_sketch(vec![2.0, 2.0, 2.0]);
    let mut rig = Rig::new(model, RenderConfig::default());
    let before = serde_json::to_string(&rig.model)?;

    let (x, y) = rig.px(50.0, 30.0);
    rig.press(x, y, 0);
    rig.mouse_move(x + 2.0, y);
    assert_eq!(*rig.machine.state(), InteractionState::Idle);

    let (tx, ty) = rig.px(90.0, 30.0);
    rig.mouse_move(tx, ty);
    rig.release(tx, ty);
    assert_eq!(serde_json::to_string(&rig.model)?, before);
    assert!(rig.sink.records().is_empty());
    Ok(())
}

#[test]
fn leaving_a_constraint_glyph_cancels_instead_of_dragging() {
    let mut model = GeometryModel::new();
    model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
        LineSeg::new(Point2d::new(10.0, 5.0), Point2d::new(40.0, 5.0)),
    )));
    let mut distance = Constraint::new(ConstraintKind::Distance {
        a: GeoPointRef::new(0, PointPos::Start),
        b: Some(GeoPointRef::new(0, PointPos::End)),
        value: 30.0,
    });
    // Push the glyph well clear of the line and its vertices.
    distance.label_distance = 40.0;
    model.add_constraint(distance);
    let mut rig = Rig::new(model, RenderConfig::default());

    let bounds = rig.glyphs.glyphs[0].bounds;
    let (gx, gy) = (
        (bounds.min_x + bounds.max_x) / 2.0,
        (bounds.min_y + bounds.max_y) / 2.0,
    );
    assert_eq!(
        rig.pick.pick(&rig.glyphs, gx, gy),
        Some(SketchHit::Constraints(vec![0]))
    );

    // A swipe that leaves the glyph before the next move lands in Idle.
    rig.press(gx, gy, 0);
    rig.mouse_move(gx + 300.0, gy);
    assert_eq!(*rig.machine.state(), InteractionState::Idle);
    rig.release(gx + 300.0, gy);
    assert!(rig.sink.records().is_empty());

    // Staying on the glyph still escalates into a label drag.
    rig.press(gx, gy, 5_000);
    rig.mouse_move(gx + 2.0, gy);
    assert!(matches!(
        rig.machine.state(),
        InteractionState::DragConstraint { ids } if ids == &vec![0]
    ));
}
