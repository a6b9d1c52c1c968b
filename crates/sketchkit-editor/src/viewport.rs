//! Viewport and coordinate transformation for the sketch canvas.
//!
//! Handles conversion between pixel coordinates (screen space) and sketch
//! coordinates (world space). Manages zoom and pan with proper coordinate
//! mapping; the zoom level doubles as the camera scale factor consumed by
//! glyph clustering and pole-weight rendering.

use std::fmt;

use sketchkit_core::geometry::Point2d;

const MIN_ZOOM: f64 = 0.1;
const MAX_ZOOM: f64 = 50.0;

/// The viewport transformation state (zoom and pan).
#[derive(Debug, Clone)]
pub struct Viewport {
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
    canvas_width: f64,
    canvas_height: f64,
}

impl Viewport {
    /// Creates a new viewport with initial canvas dimensions.
    pub fn new(canvas_width: f64, canvas_height: f64) -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            canvas_width,
            canvas_height,
        }
    }

    pub fn canvas_width(&self) -> f64 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> f64 {
        self.canvas_height
    }

    /// Sets the canvas dimensions (typically called when the window resizes).
    pub fn set_canvas_size(&mut self, width: f64, height: f64) {
        self.canvas_width = width;
        self.canvas_height = height;
    }

    /// Current zoom level (1.0 = one world unit per pixel).
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Sets the zoom level, constrained between 0.1 and 50.0.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom > MIN_ZOOM && zoom < MAX_ZOOM {
            self.zoom = zoom;
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * 1.2);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / 1.2);
    }

    pub fn pan_x(&self) -> f64 {
        self.pan_x
    }

    pub fn pan_y(&self) -> f64 {
        self.pan_y
    }

    pub fn set_pan(&mut self, x: f64, y: f64) {
        self.pan_x = x;
        self.pan_y = y;
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Converts pixel coordinates (0,0 top-left, +Y down) to world
    /// coordinates (+Y up).
    pub fn pixel_to_world(&self, pixel_x: f64, pixel_y: f64) -> Point2d {
        let world_x = (pixel_x - self.pan_x) / self.zoom;
        // Flip Y: lower pixel Y (top of screen) maps to higher world Y.
        let world_y = (self.canvas_height - pixel_y - self.pan_y) / self.zoom;
        Point2d::new(world_x, world_y)
    }

    /// Converts world coordinates to pixel coordinates.
    pub fn world_to_pixel(&self, world: Point2d) -> (f64, f64) {
        let pixel_x = world.x * self.zoom + self.pan_x;
        let pixel_y = self.canvas_height - (world.y * self.zoom + self.pan_y);
        (pixel_x, pixel_y)
    }

    /// Converts a pixel-space length to world units at the current zoom.
    pub fn pixel_to_world_length(&self, pixels: f64) -> f64 {
        pixels / self.zoom
    }

    /// Fits the given world-space bounding box into the viewport.
    /// `padding` is the fraction of viewport reserved on each side.
    pub fn fit_to_bounds(&mut self, min: Point2d, max: Point2d, padding: f64) {
        if min.x >= max.x || min.y >= max.y {
            return;
        }
        let width = max.x - min.x;
        let height = max.y - min.y;

        let padding_factor = 1.0 - (padding * 2.0);
        let zoom_x = (self.canvas_width * padding_factor) / width;
        let zoom_y = (self.canvas_height * padding_factor) / height;
        let new_zoom = zoom_x.min(zoom_y).clamp(MIN_ZOOM, MAX_ZOOM);

        let content_pixel_width = width * new_zoom;
        let content_pixel_height = height * new_zoom;
        let center_pixel_x = self.canvas_width / 2.0 - content_pixel_width / 2.0;
        let center_pixel_y = self.canvas_height / 2.0 - content_pixel_height / 2.0;

        self.zoom = new_zoom;
        self.pan_x = center_pixel_x - min.x * new_zoom;
        self.pan_y = self.canvas_height - center_pixel_y - content_pixel_height - min.y * new_zoom;
    }

    /// Zooms to a world point, keeping that point's screen position fixed.
    pub fn zoom_to_point(&mut self, world: Point2d, new_zoom: f64) {
        if new_zoom <= MIN_ZOOM || new_zoom >= MAX_ZOOM {
            return;
        }
        let (pixel_x, pixel_y) = self.world_to_pixel(world);
        self.zoom = new_zoom;
        self.pan_x = pixel_x - world.x * new_zoom;
        self.pan_y = self.canvas_height - pixel_y - world.y * new_zoom;
    }

    /// Centers the viewport on a world coordinate.
    pub fn center_on(&mut self, world: Point2d) {
        self.pan_x = self.canvas_width / 2.0 - world.x * self.zoom;
        self.pan_y = self.canvas_height / 2.0 - world.y * self.zoom;
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Zoom: {:.2}x | Pan: ({:.1}, {:.1})",
            self.zoom, self.pan_x, self.pan_y
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1200.0, 800.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_world_round_trip() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.set_zoom(2.5);
        vp.set_pan(30.0, -12.0);
        let w = vp.pixel_to_world(200.0, 150.0);
        let (px, py) = vp.world_to_pixel(w);
        assert!((px - 200.0).abs() < 1e-9);
        assert!((py - 150.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut vp = Viewport::default();
        vp.set_zoom(0.01);
        assert_eq!(vp.zoom(), 1.0);
        vp.set_zoom(100.0);
        assert_eq!(vp.zoom(), 1.0);
    }

    #[test]
    fn zoom_to_point_keeps_cursor_fixed() {
        let mut vp = Viewport::new(800.0, 600.0);
        let world = Point2d::new(10.0, 20.0);
        let before = vp.world_to_pixel(world);
        vp.zoom_to_point(world, 3.0);
        let after = vp.world_to_pixel(world);
        assert!((before.0 - after.0).abs() < 1e-9);
        assert!((before.1 - after.1).abs() < 1e-9);
    }

    #[test]
    fn fit_to_bounds_contains_content() {
        let mut vp = Viewport::new(800.0, 600.0);
        vp.fit_to_bounds(Point2d::new(-10.0, -10.0), Point2d::new(10.0, 10.0), 0.05);
        let (px, py) = vp.world_to_pixel(Point2d::new(0.0, 0.0));
        assert!((px - 400.0).abs() < 1.0);
        assert!((py - 300.0).abs() < 1.0);
    }
}
