//! Rubber-band box selection.
//!
//! Drag direction selects the mode: left-to-right requires full containment
//! of an element's tessellation, right-to-left ("touch mode") accepts any
//! partial overlap. B-spline membership is tested only via the start/end
//! tessellation points in both modes; this matches the established editor
//! behavior and is deliberately not tightened to the control hull.

use tracing::debug;

use sketchkit_core::geometry::GeometryKind;
use sketchkit_core::model::GeometryModel;

use crate::spatial::Bounds;
use crate::tessellation::RenderCache;
use crate::viewport::Viewport;

/// An in-progress rubber band in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubberBand {
    start: (f64, f64),
    current: (f64, f64),
}

/// Elements captured by a finished rubber band.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoxSelection {
    /// Edge GeoIds, internal and external.
    pub curves: Vec<sketchkit_core::id::GeoId>,
    /// Logical vertex ids.
    pub vertices: Vec<usize>,
}

impl RubberBand {
    pub fn new(start_x: f64, start_y: f64) -> Self {
        Self {
            start: (start_x, start_y),
            current: (start_x, start_y),
        }
    }

    pub fn update(&mut self, x: f64, y: f64) {
        self.current = (x, y);
    }

    /// Touch mode is engaged by dragging right-to-left.
    pub fn is_touch_mode(&self) -> bool {
        self.current.0 < self.start.0
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            self.start.0.min(self.current.0),
            self.start.1.min(self.current.1),
            self.start.0.max(self.current.0),
            self.start.1.max(self.current.1),
        )
    }

    /// Tests every tessellated element against the band.
    pub fn select(
        &self,
        model: &GeometryModel,
        cache: &RenderCache,
        viewport: &Viewport,
    ) -> BoxSelection {
        let bounds = self.bounds();
        let touch = self.is_touch_mode();
        let mut result = BoxSelection::default();

        for strip in &cache.curves {
            let screen: Vec<(f64, f64)> = strip
                .points
                .iter()
                .map(|p| viewport.world_to_pixel(*p))
                .collect();
            if screen.is_empty() {
                continue;
            }

            let is_spline = matches!(
                model.geometry(strip.geo_id).map(|e| &e.kind),
                Ok(GeometryKind::BSpline(_))
            );
            // Splines test endpoints only.
            let tested: Vec<(f64, f64)> = if is_spline && screen.len() > 1 {
                vec![screen[0], screen[screen.len() - 1]]
            } else {
                screen.clone()
            };

            let hit = if touch {
                tested.iter().any(|(x, y)| bounds.contains_point(*x, *y))
                    || (!is_spline && any_segment_crosses(&screen, &bounds))
            } else {
                tested.iter().all(|(x, y)| bounds.contains_point(*x, *y))
            };
            if hit {
                result.curves.push(strip.geo_id);
            }
        }

        // Vertices: inside the box in either mode. The root sentinel at
        // slot 0 is not box-selectable.
        for (slot, vs) in cache.vertex_slots.iter().enumerate().skip(1) {
            let (x, y) = viewport.world_to_pixel(vs.point);
            if bounds.contains_point(x, y) {
                if let Some(vertex_id) = cache.vertex_at_slot(slot) {
                    result.vertices.push(vertex_id);
                }
            }
        }

        debug!(
            touch,
            curves = result.curves.len(),
            vertices = result.vertices.len(),
            "rubber band selection"
        );
        result
    }
}

fn any_segment_crosses(points: &[(f64, f64)], bounds: &Bounds) -> bool {
    points.windows(2).any(|w| {
        segment_intersects_bounds(w[0], w[1], bounds)
    })
}

fn segment_intersects_bounds(a: (f64, f64), b: (f64, f64), bounds: &Bounds) -> bool {
    if bounds.contains_point(a.0, a.1) || bounds.contains_point(b.0, b.1) {
        return true;
    }
    let corners = [
        (bounds.min_x, bounds.min_y),
        (bounds.max_x, bounds.min_y),
        (bounds.max_x, bounds.max_y),
        (bounds.min_x, bounds.max_y),
    ];
    (0..4).any(|i| segments_intersect(a, b, corners[i], corners[(i + 1) % 4]))
}

fn segments_intersect(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), p4: (f64, f64)) -> bool {
    let d = |a: (f64, f64), b: (f64, f64), c: (f64, f64)| {
        (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
    };
    let d1 = d(p3, p4, p1);
    let d2 = d(p3, p4, p2);
    let d3 = d(p1, p2, p3);
    let d4 = d(p1, p2, p4);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchkit_core::config::RenderConfig;
    use sketchkit_core::geometry::{BSpline, Circle, GeometryElement, GeometryKind, LineSeg, Point2d};

    fn setup(model: &GeometryModel) -> (RenderCache, Viewport) {
        let cache = RenderCache::build(model, &RenderConfig::default(), false);
        (cache, Viewport::default())
    }

    /// A band over the given world rectangle, dragged in the requested
    /// direction.
    fn band(viewport: &Viewport, min: Point2d, max: Point2d, left_to_right: bool) -> RubberBand {
        let (x0, y0) = viewport.world_to_pixel(min);
        let (x1, y1) = viewport.world_to_pixel(max);
        if left_to_right {
            let mut rb = RubberBand::new(x0.min(x1), y0.min(y1));
            rb.update(x0.max(x1), y0.max(y1));
            rb
        } else {
            let mut rb = RubberBand::new(x0.max(x1), y0.min(y1));
            rb.update(x0.min(x1), y0.max(y1));
            rb
        }
    }

    #[test]
    fn containment_mode_requires_whole_element() {
        let mut model = GeometryModel::new();
        let l = model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
            LineSeg::new(Point2d::new(10.0, 10.0), Point2d::new(30.0, 10.0)),
        )));
        let (cache, viewport) = setup(&model);

        // Band around half the line: not selected.
        let rb = band(&viewport, Point2d::new(5.0, 5.0), Point2d::new(20.0, 15.0), true);
        assert!(!rb.is_touch_mode());
        assert!(rb.select(&model, &cache, &viewport).curves.is_empty());

        // Band around the whole line: selected.
        let rb = band(&viewport, Point2d::new(5.0, 5.0), Point2d::new(35.0, 15.0), true);
        assert_eq!(rb.select(&model, &cache, &viewport).curves, vec![l]);
    }

    #[test]
    fn circle_containment_vs_touch() {
        let mut model = GeometryModel::new();
        let c = model.add_geometry(GeometryElement::new(GeometryKind::Circle(Circle::new(
            Point2d::new(50.0, 50.0),
            20.0,
        ))));
        let (cache, viewport) = setup(&model);

        // A band covering the right cardinal point but not the full circle.
        let min = Point2d::new(65.0, 40.0);
        let max = Point2d::new(80.0, 60.0);

        let contain = band(&viewport, min, max, true);
        assert!(contain.select(&model, &cache, &viewport).curves.is_empty());

        let touch = band(&viewport, min, max, false);
        assert!(touch.is_touch_mode());
        assert_eq!(touch.select(&model, &cache, &viewport).curves, vec![c]);
    }

    #[test]
    fn spline_membership_uses_endpoints_only() {
        let mut model = GeometryModel::new();
        // A spline whose interior bulges far above its endpoints.
        let s = model.add_geometry(GeometryElement::new(GeometryKind::BSpline(
            BSpline::clamped(
                3,
                vec![
                    Point2d::new(10.0, 10.0),
                    Point2d::new(20.0, 100.0),
                    Point2d::new(30.0, 100.0),
                    Point2d::new(40.0, 10.0),
                ],
            ),
        )));
        let (cache, viewport) = setup(&model);

        // A containment band around the endpoints but far below the bulge
        // still selects the spline: only start/end points are tested.
        let rb = band(&viewport, Point2d::new(5.0, 5.0), Point2d::new(45.0, 20.0), true);
        assert_eq!(rb.select(&model, &cache, &viewport).curves, vec![s]);
    }

    #[test]
    fn vertices_collected_inside_band() {
        let mut model = GeometryModel::new();
        model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
            LineSeg::new(Point2d::new(10.0, 10.0), Point2d::new(100.0, 10.0)),
        )));
        let (cache, viewport) = setup(&model);
        let rb = band(&viewport, Point2d::new(5.0, 5.0), Point2d::new(20.0, 15.0), true);
        // Only the start vertex falls inside.
        assert_eq!(rb.select(&model, &cache, &viewport).vertices, vec![0]);
    }
}
