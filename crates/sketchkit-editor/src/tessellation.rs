//! Tessellation and the per-frame render cache.
//!
//! The cache is a value type rebuilt wholesale on every redraw, never
//! diffed or patched. It holds the curve point strips handed to the
//! renderer, the `CurvId -> GeoId` back-pointer table, the vertex render
//! slots with their two translation tables, and a parallel color-class
//! buffer per primitive.

use tracing::trace;

use sketchkit_core::config::{Color, RenderConfig, SketchPalette};
use sketchkit_core::geometry::{GeometryElement, GeometryKind, Point2d};
use sketchkit_core::id::{GeoId, PointPos, GEOID_H_AXIS, GEOID_V_AXIS, ROOT_POINT_VERTEX};
use sketchkit_core::model::GeometryModel;

/// Upper bound for adaptive B-spline refinement.
const MAX_SPLINE_SEGMENTS: usize = 512;

/// Color class assigned per rendered primitive; resolved against the
/// palette at draw time so selection highlights need no re-tessellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorClass {
    Normal,
    Construction,
    External,
    InternalAlignment,
    FullyConstrained,
    /// Whole-sketch override when the solve reports conflicts.
    Invalid,
}

impl ColorClass {
    pub fn resolve(&self, palette: &SketchPalette) -> Color {
        match self {
            ColorClass::Normal => palette.normal,
            ColorClass::Construction => palette.construction,
            ColorClass::External => palette.external,
            ColorClass::InternalAlignment => palette.internal_alignment,
            ColorClass::FullyConstrained => palette.fully_constrained,
            ColorClass::Invalid => palette.invalid_sketch,
        }
    }
}

/// One tessellated curve: an ordered point strip for line-strip rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveStrip {
    pub geo_id: GeoId,
    pub points: Vec<Point2d>,
}

/// One vertex render slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexSlot {
    pub geo_id: GeoId,
    pub pos: PointPos,
    pub point: Point2d,
}

/// The full per-frame cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCache {
    /// Curve strips indexed by CurvId.
    pub curves: Vec<CurveStrip>,
    /// `CurvId -> GeoId` back-pointers, parallel to `curves`.
    pub curv_id_to_geo_id: Vec<GeoId>,
    /// Color class per curve, parallel to `curves`.
    pub curve_colors: Vec<ColorClass>,

    /// Vertex render slots. Slot 0 is always the root point (origin).
    pub vertex_slots: Vec<VertexSlot>,
    /// Render slot -> logical vertex id; the root point sentinel is `-1`.
    pub point_id_to_vertex_id: Vec<i64>,
    /// Logical vertex id -> render slot (inverse of the above, sentinel
    /// excluded).
    pub vertex_id_to_point_id: Vec<usize>,
    /// Color class per vertex slot.
    pub vertex_colors: Vec<ColorClass>,

    /// The two axis lines, tessellated to the current model extent.
    pub h_axis: CurveStrip,
    pub v_axis: CurveStrip,
}

impl RenderCache {
    /// Tessellates the whole model. `invalid` switches every primitive to
    /// the invalid-sketch color class while leaving geometry untouched.
    pub fn build(model: &GeometryModel, config: &RenderConfig, invalid: bool) -> Self {
        let mut curves = Vec::new();
        let mut curv_id_to_geo_id = Vec::new();
        let mut curve_colors = Vec::new();

        let mut vertex_slots = vec![VertexSlot {
            geo_id: GEOID_H_AXIS,
            pos: PointPos::None,
            point: Point2d::ORIGIN,
        }];
        let mut point_id_to_vertex_id: Vec<i64> = vec![ROOT_POINT_VERTEX as i64];
        let mut vertex_id_to_point_id: Vec<usize> = Vec::new();
        let mut vertex_colors = vec![if invalid {
            ColorClass::Invalid
        } else {
            ColorClass::Normal
        }];

        for (geo_id, element) in model.iter_geometry() {
            let class = classify(geo_id, element, invalid);

            if let Some(points) = tessellate(element, config) {
                curves.push(CurveStrip { geo_id, points });
                curv_id_to_geo_id.push(geo_id);
                curve_colors.push(class);
            }

            // Only internal geometry owns numbered vertex slots; external
            // reference points are not selectable vertices.
            if geo_id >= 0 {
                for (pos, point) in element.vertices() {
                    let vertex_id = vertex_id_to_point_id.len() as i64;
                    let slot = vertex_slots.len();
                    vertex_slots.push(VertexSlot { geo_id, pos, point });
                    point_id_to_vertex_id.push(vertex_id);
                    vertex_id_to_point_id.push(slot);
                    vertex_colors.push(class);
                }
            }
        }

        let half = axis_half_extent(model);
        let h_axis = CurveStrip {
            geo_id: GEOID_H_AXIS,
            points: vec![Point2d::new(-half, 0.0), Point2d::new(half, 0.0)],
        };
        let v_axis = CurveStrip {
            geo_id: GEOID_V_AXIS,
            points: vec![Point2d::new(0.0, -half), Point2d::new(0.0, half)],
        };

        trace!(
            curves = curves.len(),
            vertex_slots = vertex_slots.len(),
            invalid,
            "rebuilt render cache"
        );
        Self {
            curves,
            curv_id_to_geo_id,
            curve_colors,
            vertex_slots,
            point_id_to_vertex_id,
            vertex_id_to_point_id,
            vertex_colors,
            h_axis,
            v_axis,
        }
    }

    /// Curve strip of a GeoId, if it tessellated.
    pub fn strip_for(&self, geo_id: GeoId) -> Option<&CurveStrip> {
        let curv_id = self.curv_id_to_geo_id.iter().position(|g| *g == geo_id)?;
        self.curves.get(curv_id)
    }

    /// Render slot of a logical vertex id.
    pub fn slot_of_vertex(&self, vertex_id: usize) -> Option<usize> {
        self.vertex_id_to_point_id.get(vertex_id).copied()
    }

    /// Logical vertex id at a render slot; `None` for the root sentinel.
    pub fn vertex_at_slot(&self, slot: usize) -> Option<usize> {
        let id = *self.point_id_to_vertex_id.get(slot)?;
        usize::try_from(id).ok()
    }
}

fn classify(geo_id: GeoId, element: &GeometryElement, invalid: bool) -> ColorClass {
    if invalid {
        ColorClass::Invalid
    } else if geo_id < 0 {
        ColorClass::External
    } else if element.internal_alignment != sketchkit_core::geometry::InternalAlignment::None {
        ColorClass::InternalAlignment
    } else if element.construction {
        ColorClass::Construction
    } else {
        ColorClass::Normal
    }
}

/// Extent of the axis lines: generous margin past the model bounds so the
/// axes always cross the visible sketch.
fn axis_half_extent(model: &GeometryModel) -> f64 {
    match model.bounds() {
        Some((min, max)) => {
            let reach = min
                .x
                .abs()
                .max(min.y.abs())
                .max(max.x.abs())
                .max(max.y.abs());
            (reach * 1.5).max(10.0)
        }
        None => 10.0,
    }
}

/// Point strip for one element, `None` for point geometry (points render
/// through the vertex slots, not as curves).
fn tessellate(element: &GeometryElement, config: &RenderConfig) -> Option<Vec<Point2d>> {
    use GeometryKind::*;
    let points = match &element.kind {
        Point { .. } => return None,
        LineSegment(l) => vec![l.start, l.end],
        Circle(_) | Ellipse(_) => {
            sample_closed(element, config.conic_segments.max(8))
        }
        ArcOfCircle(a) => {
            let turns = a.span() / std::f64::consts::TAU;
            let count = ((turns * config.arc_segment_scale).ceil() as usize).max(4);
            sample_open(element, count)
        }
        ArcOfEllipse(_) | ArcOfHyperbola(_) | ArcOfParabola(_) => {
            let (t0, t1) = element.param_range()?;
            let turns = (t1 - t0).abs() / std::f64::consts::TAU;
            let count = ((turns * config.arc_segment_scale).ceil() as usize).max(8);
            sample_open(element, count)
        }
        BSpline(b) => {
            if b.control_points.is_empty() {
                return None;
            }
            sample_spline(element, config.spline_deflection)
        }
    };
    Some(points)
}

fn sample_open(element: &GeometryElement, segments: usize) -> Vec<Point2d> {
    let (t0, t1) = element.param_range().unwrap_or((0.0, 1.0));
    (0..=segments)
        .map(|i| element.eval_param(t0 + (t1 - t0) * i as f64 / segments as f64))
        .collect()
}

fn sample_closed(element: &GeometryElement, segments: usize) -> Vec<Point2d> {
    let mut points = sample_open(element, segments);
    // Close the strip exactly.
    if let Some(first) = points.first().copied() {
        if let Some(last) = points.last_mut() {
            *last = first;
        }
    }
    points
}

/// Deflection-adaptive sampling: doubles the segment count until the chord
/// midpoints stay within the deflection tolerance of the curve.
fn sample_spline(element: &GeometryElement, deflection: f64) -> Vec<Point2d> {
    let (t0, t1) = element.param_range().unwrap_or((0.0, 1.0));
    let mut segments = 16usize;
    loop {
        let step = (t1 - t0) / segments as f64;
        let mut worst: f64 = 0.0;
        for i in 0..segments {
            let a = element.eval_param(t0 + step * i as f64);
            let b = element.eval_param(t0 + step * (i + 1) as f64);
            let mid_curve = element.eval_param(t0 + step * (i as f64 + 0.5));
            worst = worst.max(mid_curve.distance(&a.midpoint(&b)));
        }
        if worst <= deflection || segments >= MAX_SPLINE_SEGMENTS {
            return sample_open(element, segments);
        }
        segments *= 2;
    }
}
