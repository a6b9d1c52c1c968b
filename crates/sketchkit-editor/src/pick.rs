//! Screen-space hit testing over the render cache and glyph layout.
//!
//! Rebuilt together with the render cache every redraw. Picking resolves
//! the nearest logical entity under the cursor with the priority
//! vertex > origin > axis > edge > constraint glyph, all within the
//! configured pixel pick radius.

use tracing::trace;

use sketchkit_core::config::RenderConfig;
use sketchkit_core::geometry::Point2d;
use sketchkit_core::id::{GeoId, SubElement};
use sketchkit_core::model::GeometryModel;

use crate::glyph::GlyphLayout;
use crate::spatial::{Bounds, SpatialIndex};
use crate::tessellation::{CurveStrip, RenderCache};
use crate::viewport::Viewport;

/// Which sketch axis was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Horizontal,
    Vertical,
}

/// A resolved pick result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SketchHit {
    /// Logical vertex id (zero-based).
    Vertex(usize),
    /// The root (origin) point.
    Origin,
    Axis(AxisKind),
    /// Edge by GeoId; external edges carry their negative id.
    Edge(GeoId),
    /// One or more constraint ids, already disambiguated for merged glyphs.
    Constraints(Vec<usize>),
}

impl SketchHit {
    /// The sub-element name this hit maps to for selection broadcasting.
    /// Multi-constraint hits have no single name; callers iterate instead.
    pub fn sub_element(&self, model: &GeometryModel) -> Option<SubElement> {
        match self {
            SketchHit::Vertex(v) => Some(SubElement::Vertex(*v)),
            SketchHit::Origin => Some(SubElement::RootPoint),
            SketchHit::Axis(AxisKind::Horizontal) => Some(SubElement::HAxis),
            SketchHit::Axis(AxisKind::Vertical) => Some(SubElement::VAxis),
            SketchHit::Edge(g) => Some(SubElement::for_edge(*g)),
            SketchHit::Constraints(ids) => match ids.as_slice() {
                [id] => {
                    let name = model.constraint(*id)?.display_name(*id);
                    Some(SubElement::Constraint(name))
                }
                _ => None,
            },
        }
    }
}

/// One tessellated curve lifted to screen space.
#[derive(Debug, Clone)]
struct ScreenStrip {
    geo_id: GeoId,
    points: Vec<(f64, f64)>,
}

/// The per-frame pick structure.
#[derive(Debug, Clone)]
pub struct PickIndex {
    /// Vertex render slots in screen space; entry id is the slot index.
    vertex_index: SpatialIndex<usize>,
    vertex_screen: Vec<(f64, f64)>,
    /// Logical vertex id per slot; `None` marks the root sentinel.
    slot_vertex_ids: Vec<Option<usize>>,

    curve_index: SpatialIndex<usize>,
    strips: Vec<ScreenStrip>,

    h_axis: ScreenStrip,
    v_axis: ScreenStrip,

    pick_radius: f64,
}

impl PickIndex {
    pub fn build(cache: &RenderCache, viewport: &Viewport, config: &RenderConfig) -> Self {
        let pick_radius = config.pick_radius_px.max(1.0);
        let cell = (pick_radius * 8.0).max(32.0);

        let mut vertex_index = SpatialIndex::new(cell);
        let mut vertex_screen = Vec::with_capacity(cache.vertex_slots.len());
        let mut slot_vertex_ids = Vec::with_capacity(cache.vertex_slots.len());
        for (slot, vs) in cache.vertex_slots.iter().enumerate() {
            let (x, y) = viewport.world_to_pixel(vs.point);
            vertex_index.insert(slot, &Bounds::from_point(x, y, pick_radius));
            vertex_screen.push((x, y));
            slot_vertex_ids.push(cache.vertex_at_slot(slot));
        }

        let mut curve_index = SpatialIndex::new(cell);
        let mut strips = Vec::with_capacity(cache.curves.len());
        for (curv_id, strip) in cache.curves.iter().enumerate() {
            let screen = to_screen(strip, viewport);
            curve_index.insert(curv_id, &strip_bounds(&screen.points, pick_radius));
            strips.push(screen);
        }

        let h_axis = to_screen(&cache.h_axis, viewport);
        let v_axis = to_screen(&cache.v_axis, viewport);

        trace!(
            vertices = vertex_screen.len(),
            curves = strips.len(),
            "rebuilt pick index"
        );
        Self {
            vertex_index,
            vertex_screen,
            slot_vertex_ids,
            curve_index,
            strips,
            h_axis,
            v_axis,
            pick_radius,
        }
    }

    /// Nearest logical entity under a screen position.
    pub fn pick(&self, glyphs: &GlyphLayout, x: f64, y: f64) -> Option<SketchHit> {
        // 1. Vertices (root point excluded: origin ranks below real vertices).
        let mut best_vertex: Option<(f64, usize)> = None;
        let mut root_hit: Option<f64> = None;
        for slot in self.vertex_index.query(&Bounds::from_point(x, y, 0.0)) {
            let (vx, vy) = self.vertex_screen[slot];
            let d = ((vx - x).powi(2) + (vy - y).powi(2)).sqrt();
            if d > self.pick_radius {
                continue;
            }
            match self.slot_vertex_ids[slot] {
                Some(vertex_id) => {
                    if best_vertex.map_or(true, |(bd, _)| d < bd) {
                        best_vertex = Some((d, vertex_id));
                    }
                }
                None => root_hit = Some(root_hit.map_or(d, |r: f64| r.min(d))),
            }
        }
        if let Some((_, vertex_id)) = best_vertex {
            return Some(SketchHit::Vertex(vertex_id));
        }
        // 2. Origin.
        if root_hit.is_some() {
            return Some(SketchHit::Origin);
        }
        // 3. Axes.
        let dh = strip_distance(&self.h_axis.points, x, y);
        let dv = strip_distance(&self.v_axis.points, x, y);
        match (dh, dv) {
            (Some(dh), Some(dv)) if dh <= self.pick_radius && dh <= dv => {
                return Some(SketchHit::Axis(AxisKind::Horizontal));
            }
            (_, Some(dv)) if dv <= self.pick_radius => {
                return Some(SketchHit::Axis(AxisKind::Vertical));
            }
            (Some(dh), _) if dh <= self.pick_radius => {
                return Some(SketchHit::Axis(AxisKind::Horizontal));
            }
            _ => {}
        }
        // 4. Edges.
        let mut best_edge: Option<(f64, GeoId)> = None;
        for curv_id in self
            .curve_index
            .query(&Bounds::from_point(x, y, self.pick_radius))
        {
            let strip = &self.strips[curv_id];
            if let Some(d) = strip_distance(&strip.points, x, y) {
                if d <= self.pick_radius && best_edge.map_or(true, |(bd, _)| d < bd) {
                    best_edge = Some((d, strip.geo_id));
                }
            }
        }
        if let Some((_, geo_id)) = best_edge {
            return Some(SketchHit::Edge(geo_id));
        }
        // 5. Constraint glyphs.
        glyphs.hit(x, y).map(SketchHit::Constraints)
    }
}

fn to_screen(strip: &CurveStrip, viewport: &Viewport) -> ScreenStrip {
    ScreenStrip {
        geo_id: strip.geo_id,
        points: strip
            .points
            .iter()
            .map(|p| viewport.world_to_pixel(*p))
            .collect(),
    }
}

fn strip_bounds(points: &[(f64, f64)], margin: f64) -> Bounds {
    let mut b = Bounds::new(
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
    );
    for (x, y) in points {
        b.min_x = b.min_x.min(*x);
        b.min_y = b.min_y.min(*y);
        b.max_x = b.max_x.max(*x);
        b.max_y = b.max_y.max(*y);
    }
    b.expanded(margin)
}

/// Distance from a point to a polyline, `None` for an empty strip.
fn strip_distance(points: &[(f64, f64)], x: f64, y: f64) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    if points.len() == 1 {
        let (px, py) = points[0];
        return Some(((px - x).powi(2) + (py - y).powi(2)).sqrt());
    }
    let mut best = f64::INFINITY;
    for w in points.windows(2) {
        let (ax, ay) = w[0];
        let (bx, by) = w[1];
        best = best.min(segment_distance(ax, ay, bx, by, x, y));
    }
    Some(best)
}

fn segment_distance(ax: f64, ay: f64, bx: f64, by: f64, x: f64, y: f64) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq < 1e-12 {
        0.0
    } else {
        (((x - ax) * dx + (y - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + dx * t, ay + dy * t);
    ((cx - x).powi(2) + (cy - y).powi(2)).sqrt()
}
