//! Host configuration and per-session render parameters.
//!
//! The host application exposes a flat key→typed-value preference store.
//! Recognized keys (with defaults) are listed on [`RenderConfig`]. A
//! `RenderConfig` is derived once per edit session and passed by reference
//! into the editing components; on a preference-change notification the
//! session re-derives it and schedules a redraw.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// RGBA color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Flat key→typed-value store of host preferences.
///
/// Values are JSON-typed; typed getters fall back to the supplied default
/// when a key is absent or of the wrong type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceStore {
    values: HashMap<String, Value>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Colors are stored as `[r, g, b]` or `[r, g, b, a]` arrays.
    pub fn get_color(&self, key: &str, default: Color) -> Color {
        let Some(arr) = self.values.get(key).and_then(Value::as_array) else {
            return default;
        };
        let channel = |i: usize, fallback: u8| -> u8 {
            arr.get(i)
                .and_then(Value::as_u64)
                .map(|v| v.min(255) as u8)
                .unwrap_or(fallback)
        };
        if arr.len() < 3 {
            return default;
        }
        Color::rgba(
            channel(0, default.r),
            channel(1, default.g),
            channel(2, default.b),
            channel(3, 255),
        )
    }
}

/// Color palette for sketch rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchPalette {
    pub normal: Color,
    pub construction: Color,
    pub external: Color,
    pub internal_alignment: Color,
    pub fully_constrained: Color,
    /// Used for everything when the sketch is over-constrained/conflicting.
    pub invalid_sketch: Color,
    pub selected: Color,
    pub preselected: Color,
    pub constraint_glyph: Color,
    pub driving_dimension: Color,
    pub reference_dimension: Color,
}

impl Default for SketchPalette {
    fn default() -> Self {
        Self {
            normal: Color::rgb(255, 255, 255),
            construction: Color::rgb(64, 160, 255),
            external: Color::rgb(128, 204, 51),
            internal_alignment: Color::rgb(102, 102, 153),
            fully_constrained: Color::rgb(0, 255, 0),
            invalid_sketch: Color::rgb(255, 120, 0),
            selected: Color::rgb(17, 204, 51),
            preselected: Color::rgb(255, 220, 0),
            constraint_glyph: Color::rgb(220, 55, 55),
            driving_dimension: Color::rgb(220, 55, 55),
            reference_dimension: Color::rgb(64, 120, 255),
        }
    }
}

/// Render/interaction parameters for one edit session.
///
/// Recognized preference keys:
/// - `SnapTolerance`: f64, default 0.2
/// - `ViewScalingFactor`: f64, clamped to [0.5, 5.0], default 1.0
/// - `MarkerSize`: f64 pixels, default 7.0
/// - `PickRadius`: f64 pixels, default 5.0
/// - `ConicSegments`: u64, default 50
/// - `ArcSegmentScale`: f64, default 50.0 (segments per full turn)
/// - `SplineDeflection`: f64 sketch units, default 0.05
/// - `DoubleClickIntervalMs`: u64, default 400
/// - `DoubleClickRadius`: f64 pixels, default 5.0
/// - `GlyphMergeDistance`: f64 sketch units, default 4.0
/// - `BSplineWeightScale`: f64, default 1.0
/// - `DimensionLabelTemplate`: string, default "%N = %V"
/// - `ColorNormal`, `ColorConstruction`, `ColorExternal`, `ColorSelected`,
///   `ColorPreselected`, `ColorInvalid`: `[r, g, b(, a)]` arrays
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub snap_tolerance: f64,
    pub view_scaling_factor: f64,
    pub marker_size_px: f64,
    pub pick_radius_px: f64,
    pub conic_segments: usize,
    pub arc_segment_scale: f64,
    pub spline_deflection: f64,
    pub double_click_interval_ms: u64,
    pub double_click_radius_px: f64,
    /// Clustering threshold for constraint glyphs, in sketch units; the
    /// layout multiplies by the current zoom scale to get pixels. Tunable,
    /// not a law.
    pub glyph_merge_distance: f64,
    /// Exaggeration factor for B-spline pole weight circles. The drag path
    /// divides screen deltas by this so the solver sees true weight units.
    pub weight_scale: f64,
    pub dimension_label_template: String,
    pub palette: SketchPalette,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: 0.2,
            view_scaling_factor: 1.0,
            marker_size_px: 7.0,
            pick_radius_px: 5.0,
            conic_segments: 50,
            arc_segment_scale: 50.0,
            spline_deflection: 0.05,
            double_click_interval_ms: 400,
            double_click_radius_px: 5.0,
            glyph_merge_distance: 4.0,
            weight_scale: 1.0,
            dimension_label_template: "%N = %V".to_string(),
            palette: SketchPalette::default(),
        }
    }
}

impl RenderConfig {
    /// Derives a session config from the host preference store.
    pub fn from_store(store: &PreferenceStore) -> Self {
        let defaults = Self::default();
        let palette_defaults = SketchPalette::default();
        let config = Self {
            snap_tolerance: store.get_f64("SnapTolerance", defaults.snap_tolerance),
            view_scaling_factor: store
                .get_f64("ViewScalingFactor", defaults.view_scaling_factor)
                .clamp(0.5, 5.0),
            marker_size_px: store.get_f64("MarkerSize", defaults.marker_size_px),
            pick_radius_px: store.get_f64("PickRadius", defaults.pick_radius_px),
            conic_segments: store.get_u64("ConicSegments", defaults.conic_segments as u64) as usize,
            arc_segment_scale: store.get_f64("ArcSegmentScale", defaults.arc_segment_scale),
            spline_deflection: store.get_f64("SplineDeflection", defaults.spline_deflection),
            double_click_interval_ms: store
                .get_u64("DoubleClickIntervalMs", defaults.double_click_interval_ms),
            double_click_radius_px: store
                .get_f64("DoubleClickRadius", defaults.double_click_radius_px),
            glyph_merge_distance: store
                .get_f64("GlyphMergeDistance", defaults.glyph_merge_distance),
            weight_scale: store.get_f64("BSplineWeightScale", defaults.weight_scale),
            dimension_label_template: store
                .get_str("DimensionLabelTemplate", &defaults.dimension_label_template),
            palette: SketchPalette {
                normal: store.get_color("ColorNormal", palette_defaults.normal),
                construction: store.get_color("ColorConstruction", palette_defaults.construction),
                external: store.get_color("ColorExternal", palette_defaults.external),
                selected: store.get_color("ColorSelected", palette_defaults.selected),
                preselected: store.get_color("ColorPreselected", palette_defaults.preselected),
                invalid_sketch: store.get_color("ColorInvalid", palette_defaults.invalid_sketch),
                ..palette_defaults
            },
        };
        debug!(
            snap_tolerance = config.snap_tolerance,
            view_scaling_factor = config.view_scaling_factor,
            "derived render config"
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_store_entries() {
        let store = PreferenceStore::new();
        let config = RenderConfig::from_store(&store);
        assert_eq!(config.snap_tolerance, 0.2);
        assert_eq!(config.conic_segments, 50);
        assert_eq!(config.dimension_label_template, "%N = %V");
    }

    #[test]
    fn view_scaling_factor_is_clamped() {
        let mut store = PreferenceStore::new();
        store.set("ViewScalingFactor", 12.0);
        assert_eq!(RenderConfig::from_store(&store).view_scaling_factor, 5.0);
        store.set("ViewScalingFactor", 0.01);
        assert_eq!(RenderConfig::from_store(&store).view_scaling_factor, 0.5);
    }

    #[test]
    fn color_arrays_parse() {
        let mut store = PreferenceStore::new();
        store.set("ColorSelected", serde_json::json!([1, 2, 3]));
        let config = RenderConfig::from_store(&store);
        assert_eq!(config.palette.selected, Color::rgb(1, 2, 3));
        // Malformed entries fall back.
        store.set("ColorNormal", serde_json::json!("red"));
        let config = RenderConfig::from_store(&store);
        assert_eq!(config.palette.normal, SketchPalette::default().normal);
    }

    #[test]
    fn wrong_typed_value_falls_back() {
        let mut store = PreferenceStore::new();
        store.set("SnapTolerance", "lots");
        assert_eq!(RenderConfig::from_store(&store).snap_tolerance, 0.2);
    }
}
