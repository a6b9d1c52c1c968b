//! The drag/select/preselect state machine.
//!
//! Mouse and keyboard events drive the machine through the states below;
//! geometry edits happen on a temporary model copy during drags and only
//! reach the committed model inside a named undo transaction on release.
//! A custom tool handler (an in-progress geometry creation tool supplied by
//! the host) takes precedence over the built-in transitions while active.

use tracing::{debug, trace};

use sketchkit_core::config::RenderConfig;
use sketchkit_core::geometry::{GeometryKind, InternalAlignment, Point2d};
use sketchkit_core::id::{GeoId, PointPos, is_external};
use sketchkit_core::model::GeometryModel;
use sketchkit_solver::SketchSolver;

use crate::pick::{AxisKind, PickIndex, SketchHit};
use crate::glyph::GlyphLayout;
use crate::rubberband::RubberBand;
use crate::selection::{CrossTarget, SelectionManager};
use crate::tessellation::RenderCache;
use crate::undo::TransactionSink;
use crate::viewport::Viewport;

/// States of the interaction machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    SelectPoint { vertex_id: i32 },
    SelectEdge { geo_id: GeoId },
    SelectCross { target: CrossTarget },
    SelectConstraint { ids: Vec<usize> },
    DragPoint { vertex_id: i32 },
    DragCurve { geo_id: GeoId },
    DragConstraint { ids: Vec<usize> },
    UseCustomToolHandler,
    RubberBandStart,
    RubberBandActive,
}

/// Requests the machine raises to the host instead of handling itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    /// Double-click on a dimensional constraint: open its edit-value dialog.
    EditDimension(usize),
}

/// A geometry creation tool supplied by the host. While installed it sees
/// every event first; Escape asks it to quit rather than ending the edit
/// session.
pub trait ToolHandler {
    /// Returns true when the event was consumed.
    fn press(&mut self, world: Point2d) -> bool;
    fn mouse_move(&mut self, world: Point2d) -> bool;
    fn release(&mut self, world: Point2d) -> bool;
    fn quit(&mut self);
}

/// Borrowed collaborators for one event dispatch.
pub struct InteractionContext<'a> {
    pub model: &'a mut GeometryModel,
    pub solver: &'a mut dyn SketchSolver,
    pub cache: &'a RenderCache,
    pub pick: &'a PickIndex,
    pub glyphs: &'a GlyphLayout,
    pub selection: &'a mut SelectionManager,
    pub undo: &'a mut dyn TransactionSink,
    pub viewport: &'a Viewport,
    pub config: &'a RenderConfig,
}

/// Live drag bookkeeping: the temporary model the solver iterates on.
#[derive(Debug)]
struct DragSession {
    temp: GeometryModel,
    geo_id: GeoId,
    pos: PointPos,
    /// Pole weight drag: screen deltas are divided by the weight scale so
    /// the solver sees true weight units.
    weight_center: Option<Point2d>,
    /// Armed reference for whole-edge drags; relative targets are deltas
    /// against this, fixed at arming time.
    reference: Option<Point2d>,
    moved: bool,
}

/// The interaction state machine.
pub struct InteractionStateMachine {
    state: InteractionState,
    rubber_band: Option<RubberBand>,
    drag: Option<DragSession>,
    tool_handler: Option<Box<dyn ToolHandler>>,
    last_press: Option<(u64, f64, f64)>,
}

impl std::fmt::Debug for InteractionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionStateMachine")
            .field("state", &self.state)
            .field("dragging", &self.drag.is_some())
            .field("tool_handler", &self.tool_handler.is_some())
            .finish()
    }
}

impl Default for InteractionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionStateMachine {
    pub fn new() -> Self {
        Self {
            state: InteractionState::Idle,
            rubber_band: None,
            drag: None,
            tool_handler: None,
            last_press: None,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    /// The temporary drag model, when a drag is live. Redraws read geometry
    /// from here instead of the committed model.
    pub fn drag_model(&self) -> Option<&GeometryModel> {
        self.drag.as_ref().map(|d| &d.temp)
    }

    pub fn rubber_band(&self) -> Option<&RubberBand> {
        self.rubber_band.as_ref()
    }

    /// Installs a custom tool handler; it owns the interaction until it
    /// quits or Escape dismisses it.
    pub fn set_tool_handler(&mut self, handler: Box<dyn ToolHandler>) {
        self.tool_handler = Some(handler);
        self.transition(InteractionState::UseCustomToolHandler);
    }

    pub fn has_tool_handler(&self) -> bool {
        self.tool_handler.is_some()
    }

    fn transition(&mut self, next: InteractionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "interaction transition");
            self.state = next;
        }
    }

    /// Left button press.
    pub fn press(
        &mut self,
        ctx: &mut InteractionContext<'_>,
        x: f64,
        y: f64,
        time_ms: u64,
    ) -> Option<EditRequest> {
        if let Some(handler) = &mut self.tool_handler {
            let world = ctx.viewport.pixel_to_world(x, y);
            handler.press(world);
            return None;
        }

        let double = self.is_double_click(ctx.config, x, y, time_ms);
        self.last_press = Some((time_ms, x, y));

        let hit = ctx.pick.pick(ctx.glyphs, x, y);
        trace!(?hit, double, "press");

        if double {
            if let Some(SketchHit::Constraints(ids)) = &hit {
                if let [id] = ids.as_slice() {
                    let dimensional = ctx
                        .model
                        .constraint(*id)
                        .map(|c| c.kind.is_dimensional())
                        .unwrap_or(false);
                    if dimensional {
                        self.transition(InteractionState::Idle);
                        return Some(EditRequest::EditDimension(*id));
                    }
                }
            }
        }

        match hit {
            Some(SketchHit::Vertex(v)) => {
                self.transition(InteractionState::SelectPoint {
                    vertex_id: v as i32,
                });
            }
            Some(SketchHit::Origin) => self.transition(InteractionState::SelectCross {
                target: CrossTarget::Origin,
            }),
            Some(SketchHit::Axis(AxisKind::Horizontal)) => {
                self.transition(InteractionState::SelectCross {
                    target: CrossTarget::HorizontalAxis,
                })
            }
            Some(SketchHit::Axis(AxisKind::Vertical)) => {
                self.transition(InteractionState::SelectCross {
                    target: CrossTarget::VerticalAxis,
                })
            }
            Some(SketchHit::Edge(geo_id)) => {
                self.transition(InteractionState::SelectEdge { geo_id })
            }
            Some(SketchHit::Constraints(ids)) => {
                self.transition(InteractionState::SelectConstraint { ids })
            }
            None => {
                self.rubber_band = Some(RubberBand::new(x, y));
                self.transition(InteractionState::RubberBandStart);
            }
        }
        None
    }

    /// Mouse move, with the left button held where it matters.
    pub fn mouse_move(&mut self, ctx: &mut InteractionContext<'_>, x: f64, y: f64) {
        if let Some(handler) = &mut self.tool_handler {
            let world = ctx.viewport.pixel_to_world(x, y);
            handler.mouse_move(world);
            return;
        }

        match self.state.clone() {
            InteractionState::Idle => {
                // Hover: refresh the preselect slots.
                match ctx.pick.pick(ctx.glyphs, x, y) {
                    Some(SketchHit::Vertex(v)) => ctx.selection.set_preselect_point(v as i32),
                    Some(SketchHit::Origin) => {
                        ctx.selection.set_preselect_cross(CrossTarget::Origin)
                    }
                    Some(SketchHit::Axis(AxisKind::Horizontal)) => ctx
                        .selection
                        .set_preselect_cross(CrossTarget::HorizontalAxis),
                    Some(SketchHit::Axis(AxisKind::Vertical)) => ctx
                        .selection
                        .set_preselect_cross(CrossTarget::VerticalAxis),
                    Some(SketchHit::Edge(geo_id)) => ctx.selection.set_preselect_curve(geo_id),
                    Some(SketchHit::Constraints(ids)) => {
                        ctx.selection.set_preselect_constraints(ids, ctx.model)
                    }
                    None => ctx.selection.clear_preselect(),
                }
            }
            InteractionState::SelectPoint { vertex_id } => {
                if self.still_under_cursor(ctx, x, y, |h| {
                    matches!(h, SketchHit::Vertex(v) if *v as i32 == vertex_id)
                }) {
                    self.begin_point_drag(ctx, vertex_id);
                } else {
                    self.transition(InteractionState::Idle);
                }
            }
            InteractionState::SelectEdge { geo_id } => {
                if self.still_under_cursor(ctx, x, y, |h| {
                    matches!(h, SketchHit::Edge(g) if *g == geo_id)
                }) {
                    self.begin_curve_drag(ctx, geo_id);
                } else {
                    self.transition(InteractionState::Idle);
                }
            }
            InteractionState::SelectCross { .. } => {
                // The origin and axes are immovable.
                self.transition(InteractionState::Idle);
            }
            InteractionState::SelectConstraint { ids } => {
                if self.still_under_cursor(ctx, x, y, |h| {
                    matches!(h, SketchHit::Constraints(under) if *under == ids)
                }) {
                    self.transition(InteractionState::DragConstraint { ids });
                } else {
                    self.transition(InteractionState::Idle);
                }
            }
            InteractionState::DragPoint { .. } | InteractionState::DragCurve { .. } => {
                self.continue_drag(ctx, x, y);
            }
            InteractionState::DragConstraint { ids } => {
                self.drag_constraint_labels(ctx, &ids, x, y);
            }
            InteractionState::RubberBandStart => {
                if let Some(rb) = &mut self.rubber_band {
                    rb.update(x, y);
                }
                self.transition(InteractionState::RubberBandActive);
            }
            InteractionState::RubberBandActive => {
                if let Some(rb) = &mut self.rubber_band {
                    rb.update(x, y);
                }
            }
            InteractionState::UseCustomToolHandler => {}
        }
    }

    /// Left button release.
    pub fn release(&mut self, ctx: &mut InteractionContext<'_>, x: f64, y: f64) {
        if let Some(handler) = &mut self.tool_handler {
            let world = ctx.viewport.pixel_to_world(x, y);
            handler.release(world);
            return;
        }

        match self.state.clone() {
            InteractionState::SelectPoint { vertex_id } => {
                ctx.selection.toggle_point(vertex_id);
                self.transition(InteractionState::Idle);
            }
            InteractionState::SelectEdge { geo_id } => {
                ctx.selection.toggle_curve(geo_id);
                self.transition(InteractionState::Idle);
            }
            InteractionState::SelectCross { target } => {
                match target {
                    CrossTarget::Origin => {
                        ctx.selection
                            .toggle_point(sketchkit_core::id::ROOT_POINT_VERTEX);
                    }
                    CrossTarget::HorizontalAxis => {
                        ctx.selection.toggle_curve(sketchkit_core::id::GEOID_H_AXIS);
                    }
                    CrossTarget::VerticalAxis => {
                        ctx.selection.toggle_curve(sketchkit_core::id::GEOID_V_AXIS);
                    }
                }
                self.transition(InteractionState::Idle);
            }
            InteractionState::SelectConstraint { ids } => {
                for id in ids {
                    ctx.selection.toggle_constraint(id, ctx.model);
                }
                self.transition(InteractionState::Idle);
            }
            InteractionState::DragPoint { .. } => {
                self.commit_drag(ctx, "Drag point");
            }
            InteractionState::DragCurve { .. } => {
                self.commit_drag(ctx, "Drag edge");
            }
            InteractionState::DragConstraint { .. } => {
                let id = ctx.undo.open("Drag constraint");
                ctx.undo.commit(id);
                self.transition(InteractionState::Idle);
            }
            InteractionState::RubberBandStart => {
                // A click on empty space clears the selection.
                self.rubber_band = None;
                ctx.selection.clear_all(ctx.model);
                self.transition(InteractionState::Idle);
            }
            InteractionState::RubberBandActive => {
                if let Some(rb) = self.rubber_band.take() {
                    let picked = rb.select(ctx.model, ctx.cache, ctx.viewport);
                    for geo_id in picked.curves {
                        if !ctx.selection.is_curve_selected(geo_id) {
                            ctx.selection.select_curve(geo_id);
                        }
                    }
                    for vertex_id in picked.vertices {
                        if !ctx.selection.is_point_selected(vertex_id as i32) {
                            ctx.selection.select_point(vertex_id as i32);
                        }
                    }
                }
                self.transition(InteractionState::Idle);
            }
            InteractionState::Idle | InteractionState::UseCustomToolHandler => {}
        }
    }

    /// Escape: quits the custom tool handler if one is active, otherwise
    /// cancels any in-progress drag without touching the committed model.
    pub fn escape(&mut self, _ctx: &mut InteractionContext<'_>) {
        if let Some(mut handler) = self.tool_handler.take() {
            handler.quit();
            self.transition(InteractionState::Idle);
            return;
        }
        if self.drag.take().is_some() {
            debug!("drag cancelled");
        }
        self.rubber_band = None;
        self.transition(InteractionState::Idle);
    }

    fn is_double_click(&self, config: &RenderConfig, x: f64, y: f64, time_ms: u64) -> bool {
        let Some((t, lx, ly)) = self.last_press else {
            return false;
        };
        let dt = time_ms.saturating_sub(t);
        let dist = ((x - lx).powi(2) + (y - ly).powi(2)).sqrt();
        dt <= config.double_click_interval_ms && dist <= config.double_click_radius_px
    }

    fn still_under_cursor(
        &self,
        ctx: &InteractionContext<'_>,
        x: f64,
        y: f64,
        matches: impl Fn(&SketchHit) -> bool,
    ) -> bool {
        ctx.pick
            .pick(ctx.glyphs, x, y)
            .map(|h| matches(&h))
            .unwrap_or(false)
    }

    fn begin_point_drag(&mut self, ctx: &mut InteractionContext<'_>, vertex_id: i32) {
        let Some(slot) = usize::try_from(vertex_id)
            .ok()
            .and_then(|v| ctx.cache.slot_of_vertex(v))
        else {
            self.transition(InteractionState::Idle);
            return;
        };
        let vs = ctx.cache.vertex_slots[slot];

        if pole_drag_locked(ctx.model, vs.geo_id) {
            // Drag-locked poles are a no-op.
            self.transition(InteractionState::Idle);
            return;
        }

        let temp = ctx.model.extract_geometry();
        if ctx
            .solver
            .init_temporary_move(&temp, vs.geo_id, vs.pos, false)
            .is_err()
        {
            self.transition(InteractionState::Idle);
            return;
        }
        self.drag = Some(DragSession {
            temp,
            geo_id: vs.geo_id,
            pos: vs.pos,
            weight_center: None,
            reference: None,
            moved: false,
        });
        self.transition(InteractionState::DragPoint { vertex_id });
    }

    fn begin_curve_drag(&mut self, ctx: &mut InteractionContext<'_>, geo_id: GeoId) {
        if is_external(geo_id) {
            // External reference geometry is immovable.
            self.transition(InteractionState::Idle);
            return;
        }

        if pole_drag_locked(ctx.model, geo_id) {
            self.transition(InteractionState::Idle);
            return;
        }
        let weight_center = pole_weight_center(ctx.model, geo_id);

        let temp = ctx.model.extract_geometry();
        if weight_center.is_none()
            && ctx
                .solver
                .init_temporary_move(&temp, geo_id, PointPos::None, true)
                .is_err()
        {
            self.transition(InteractionState::Idle);
            return;
        }
        let reference = anchor_for_relative(&temp, geo_id);
        self.drag = Some(DragSession {
            temp,
            geo_id,
            pos: PointPos::None,
            weight_center,
            reference,
            moved: false,
        });
        self.transition(InteractionState::DragCurve { geo_id });
    }

    fn continue_drag(&mut self, ctx: &mut InteractionContext<'_>, x: f64, y: f64) {
        let Some(drag) = &mut self.drag else {
            self.transition(InteractionState::Idle);
            return;
        };
        let world = ctx.viewport.pixel_to_world(x, y);

        if let Some(center) = drag.weight_center {
            // Pole weight drag: the screen radius is weight * scale, so the
            // incoming vector is divided by the scale before the solver
            // sees it.
            let weight = (world - center).norm() / ctx.config.weight_scale.max(1e-9);
            if let Ok(element) = drag.temp.geometry_mut(drag.geo_id) {
                if let GeometryKind::Circle(c) = &mut element.kind {
                    c.radius = weight;
                    drag.moved = true;
                }
            }
            ctx.solver.solve(&mut drag.temp, false);
            return;
        }

        let target = if drag.pos == PointPos::None {
            // Whole-edge drags feed deltas against the armed reference.
            match drag.reference {
                Some(reference) => world - reference,
                None => return,
            }
        } else {
            world
        };
        match ctx.solver.move_temporary_point(
            &mut drag.temp,
            drag.geo_id,
            drag.pos,
            target,
            drag.pos == PointPos::None,
        ) {
            Ok(()) => drag.moved = true,
            Err(err) => trace!(%err, "drag target rejected"),
        }
    }

    fn drag_constraint_labels(
        &mut self,
        ctx: &mut InteractionContext<'_>,
        ids: &[usize],
        x: f64,
        y: f64,
    ) {
        let world = ctx.viewport.pixel_to_world(x, y);
        for id in ids {
            // The label pair is glyph placement only, never solver input.
            let anchor = ctx
                .model
                .constraint(*id)
                .and_then(|c| c.kind.refs().first().copied())
                .and_then(|r| ctx.model.point(r.geo_id, r.pos).ok())
                .unwrap_or(Point2d::ORIGIN);
            if let Some(constraint) = ctx.model.constraint_mut(*id) {
                constraint.label_position = world.x - anchor.x;
                constraint.label_distance = world.y - anchor.y;
            }
        }
    }

    fn commit_drag(&mut self, ctx: &mut InteractionContext<'_>, transaction_name: &str) {
        if let Some(drag) = self.drag.take() {
            if drag.moved {
                let id = ctx.undo.open(transaction_name);
                ctx.model.adopt_geometry(&drag.temp);
                ctx.solver.solve(ctx.model, false);
                ctx.undo.commit(id);
            }
        }
        self.transition(InteractionState::Idle);
    }
}

/// Anchor used to express whole-edge drag targets as relative deltas.
fn anchor_for_relative(model: &GeometryModel, geo_id: GeoId) -> Option<Point2d> {
    let element = model.geometry(geo_id).ok()?;
    if let Some((_, p)) = element.vertices().first().copied() {
        return Some(p);
    }
    let (t0, t1) = element.param_range()?;
    Some(element.eval_param((t0 + t1) / 2.0))
}

/// Whether a B-spline pole circle refuses drags: edge-independent poles
/// (no internal-alignment constraint ties them to a host) and poles of
/// effectively non-rational splines (no weights, or all weights equal)
/// are locked.
fn pole_drag_locked(model: &GeometryModel, geo_id: GeoId) -> bool {
    let Ok(element) = model.geometry(geo_id) else {
        return false;
    };
    let InternalAlignment::BSplineControlPoint(_) = element.internal_alignment else {
        return false;
    };
    let Some(host) = pole_host(model, geo_id) else {
        return true; // edge-independent pole
    };
    match model.geometry(host).map(|e| &e.kind) {
        Ok(GeometryKind::BSpline(b)) => !b.is_rational() || b.has_uniform_weights(),
        _ => true,
    }
}

/// Center of a pole circle when the drag should act on its weight.
fn pole_weight_center(model: &GeometryModel, geo_id: GeoId) -> Option<Point2d> {
    let element = model.geometry(geo_id).ok()?;
    let InternalAlignment::BSplineControlPoint(_) = element.internal_alignment else {
        return None;
    };
    match &element.kind {
        GeometryKind::Circle(c) => Some(c.center),
        _ => None,
    }
}

fn pole_host(model: &GeometryModel, pole: GeoId) -> Option<GeoId> {
    use sketchkit_core::constraint::ConstraintKind;
    model.constraints().iter().find_map(|c| match &c.kind {
        ConstraintKind::InternalAlignment { element, host, .. } if *element == pole => Some(*host),
        _ => None,
    })
}
