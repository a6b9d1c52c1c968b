//! Constraint glyph layout: anchor computation, same-type clustering, and
//! composite icon images.
//!
//! Rebuilt wholesale on every redraw together with the render cache. Each
//! constraint contributes one or two icon instances (Tangent, Parallel,
//! Perpendicular and Equal render at both referenced edges); instances of
//! the same type that land within the merge distance are stacked vertically
//! into one composite image with per-sub-icon bounding boxes recorded for
//! reverse lookup by the pick index.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use tracing::trace;

use sketchkit_core::config::{Color, RenderConfig};
use sketchkit_core::constraint::{Constraint, ConstraintKind};
use sketchkit_core::geometry::Point2d;
use sketchkit_core::id::{GeoId, GeoPointRef, PointPos};
use sketchkit_core::model::GeometryModel;

use crate::spatial::Bounds;
use crate::viewport::Viewport;

/// Side length of one icon cell in pixels.
pub const ICON_SIZE: u32 = 16;

/// One icon instance before clustering.
#[derive(Debug, Clone)]
struct IconInstance {
    constraint_id: usize,
    kind_key: &'static str,
    /// Screen-space anchor (pixels).
    screen: (f64, f64),
    rotation: f64,
    /// Symmetric icons always render standalone on the dimension line.
    clusterable: bool,
}

/// Screen-space bounding box of one sub-icon inside a composite glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubIconBox {
    pub constraint_id: usize,
    pub bounds: Bounds,
}

/// Text label attached to a dimensional constraint glyph. The renderer owns
/// font rasterization; the layout delivers final text and position.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphLabel {
    pub constraint_id: usize,
    pub text: String,
    pub screen: (f64, f64),
}

/// One placed glyph: a single icon or a vertical composite stack.
#[derive(Debug, Clone)]
pub struct Glyph {
    /// Constraint ids in stack order, top to bottom.
    pub constraint_ids: Vec<usize>,
    pub kind_key: &'static str,
    /// Screen position of the image's top-left corner.
    pub screen: (f64, f64),
    pub rotation: f64,
    pub image: RgbaImage,
    pub bounds: Bounds,
    /// Per-sub-icon boxes; one entry per stacked instance.
    pub sub_boxes: Vec<SubIconBox>,
}

/// The per-frame glyph layout.
#[derive(Debug, Clone, Default)]
pub struct GlyphLayout {
    pub glyphs: Vec<Glyph>,
    /// Composite glyph boxes keyed by the comma-joined constraint-id string,
    /// for reverse lookup of merged icons.
    pub combined_constr_boxes: HashMap<String, Vec<SubIconBox>>,
    pub labels: Vec<GlyphLabel>,
}

impl GlyphLayout {
    /// Lays out every visible constraint. `show_virtual` reveals
    /// constraints flagged as living in virtual space.
    pub fn build(
        model: &GeometryModel,
        viewport: &Viewport,
        config: &RenderConfig,
        show_virtual: bool,
    ) -> Self {
        let mut instances = Vec::new();
        let mut labels = Vec::new();

        for (id, constraint) in model.constraints().iter().enumerate() {
            if constraint.in_virtual_space && !show_virtual {
                continue;
            }
            if resolves(model, constraint) {
                collect_instances(model, viewport, id, constraint, &mut instances);
                if let Some(label) = dimension_label(model, viewport, config, id, constraint) {
                    labels.push(label);
                }
            }
        }

        let max_dist_squared = merge_distance_squared(viewport, config);
        let clusters = cluster(instances, max_dist_squared);

        let mut glyphs = Vec::new();
        let mut combined_constr_boxes = HashMap::new();
        for cluster in clusters {
            let glyph = compose(&cluster, config);
            if cluster.len() > 1 {
                let key = glyph
                    .constraint_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                combined_constr_boxes.insert(key, glyph.sub_boxes.clone());
            }
            glyphs.push(glyph);
        }

        trace!(
            glyphs = glyphs.len(),
            merged = combined_constr_boxes.len(),
            "rebuilt glyph layout"
        );
        Self {
            glyphs,
            combined_constr_boxes,
            labels,
        }
    }

    /// Constraint ids under a screen point, disambiguating merged glyphs by
    /// the closest sub-icon box.
    pub fn hit(&self, x: f64, y: f64) -> Option<Vec<usize>> {
        let glyph = self.glyphs.iter().find(|g| g.bounds.contains_point(x, y))?;
        if glyph.sub_boxes.len() <= 1 {
            return Some(glyph.constraint_ids.clone());
        }
        // Merged glyph: closest-box-wins.
        let mut best: Option<(f64, usize)> = None;
        for sub in &glyph.sub_boxes {
            let cx = (sub.bounds.min_x + sub.bounds.max_x) / 2.0;
            let cy = (sub.bounds.min_y + sub.bounds.max_y) / 2.0;
            let d = (cx - x) * (cx - x) + (cy - y) * (cy - y);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, sub.constraint_id));
            }
        }
        best.map(|(_, id)| vec![id])
    }
}

fn resolves(model: &GeometryModel, constraint: &Constraint) -> bool {
    // Stale operands are skipped during redraw, never crashed on.
    constraint
        .kind
        .refs()
        .iter()
        .all(|r| model.contains(r.geo_id))
}

/// The merge threshold is a real-world distance expressed in pixels via the
/// current zoom scale. Squared to skip the sqrt in the inner loop.
fn merge_distance_squared(viewport: &Viewport, config: &RenderConfig) -> f64 {
    let px = config.glyph_merge_distance * viewport.zoom() * config.view_scaling_factor;
    px * px
}

fn point_of(model: &GeometryModel, r: GeoPointRef) -> Option<Point2d> {
    if r.is_point() {
        model.point(r.geo_id, r.pos).ok()
    } else {
        edge_midpoint(model, r.geo_id)
    }
}

fn edge_midpoint(model: &GeometryModel, geo_id: GeoId) -> Option<Point2d> {
    let element = model.geometry(geo_id).ok()?;
    let (t0, t1) = element.param_range()?;
    Some(element.eval_param((t0 + t1) / 2.0))
}

fn collect_instances(
    model: &GeometryModel,
    viewport: &Viewport,
    id: usize,
    constraint: &Constraint,
    out: &mut Vec<IconInstance>,
) {
    use ConstraintKind::*;
    let kind_key = constraint.kind.name();
    let mut push = |world: Point2d, rotation: f64, clusterable: bool| {
        out.push(IconInstance {
            constraint_id: id,
            kind_key,
            screen: viewport.world_to_pixel(world),
            rotation,
            clusterable,
        });
    };

    match &constraint.kind {
        // Two-anchor kinds: one icon at each referenced edge.
        Parallel { a, b } | Perpendicular { a, b } | Tangent { a, b } | Equal { a, b } => {
            for geo_id in [*a, *b] {
                if let Some(p) = edge_midpoint(model, geo_id) {
                    push(offset_anchor(p, constraint), 0.0, true);
                }
            }
        }
        Symmetric { a, b, .. } => {
            let (pa, pb) = (point_of(model, *a), point_of(model, *b));
            if let (Some(pa), Some(pb)) = (pa, pb) {
                let anchor = pa.midpoint(&pb);
                let (ax, ay) = viewport.world_to_pixel(pa);
                let (bx, by) = viewport.world_to_pixel(pb);
                // Degenerate screen projection falls back to rotation 0.
                let (dx, dy) = (bx - ax, by - ay);
                let rotation = if dx.abs() < 1e-9 && dy.abs() < 1e-9 {
                    0.0
                } else {
                    dy.atan2(dx)
                };
                push(offset_anchor(anchor, constraint), rotation, false);
            }
        }
        _ => {
            // Single anchor at the first resolvable operand.
            let anchor = constraint
                .kind
                .refs()
                .iter()
                .find_map(|r| point_of(model, *r));
            if let Some(p) = anchor {
                push(offset_anchor(p, constraint), 0.0, true);
            }
        }
    }
}

/// Applies the constraint's label placement pair to its anchor.
fn offset_anchor(anchor: Point2d, constraint: &Constraint) -> Point2d {
    Point2d::new(
        anchor.x + constraint.label_position,
        anchor.y + constraint.label_distance,
    )
}

fn dimension_label(
    model: &GeometryModel,
    viewport: &Viewport,
    config: &RenderConfig,
    id: usize,
    constraint: &Constraint,
) -> Option<GlyphLabel> {
    let value = constraint.kind.value()?;
    let anchor = constraint
        .kind
        .refs()
        .iter()
        .find_map(|r| point_of(model, *r))?;
    let world = offset_anchor(anchor, constraint);
    Some(GlyphLabel {
        constraint_id: id,
        text: format_label(
            &config.dimension_label_template,
            &constraint.display_name(id),
            value,
        ),
        screen: viewport.world_to_pixel(world),
    })
}

/// Expands `%N`/`%V` tokens; a template with neither token falls back to
/// `"%N = %V"`.
fn format_label(template: &str, name: &str, value: f64) -> String {
    let template = if template.contains("%N") || template.contains("%V") {
        template
    } else {
        "%N = %V"
    };
    template
        .replace("%N", name)
        .replace("%V", &format!("{value:.2}"))
}

/// Greedy clustering: pop one icon, repeatedly pull any remaining icon of
/// the same type within the threshold, restarting the scan after every
/// successful pull so newly added members can pull in further icons.
fn cluster(mut pending: Vec<IconInstance>, max_dist_squared: f64) -> Vec<Vec<IconInstance>> {
    let mut clusters = Vec::new();
    while let Some(seed) = pending.pop() {
        let mut members = vec![seed];
        if members[0].clusterable {
            let mut pulled = true;
            while pulled {
                pulled = false;
                let mut i = 0;
                while i < pending.len() {
                    let candidate = &pending[i];
                    let close = candidate.clusterable
                        && candidate.kind_key == members[0].kind_key
                        && members.iter().any(|m| {
                            let dx = m.screen.0 - candidate.screen.0;
                            let dy = m.screen.1 - candidate.screen.1;
                            dx * dx + dy * dy <= max_dist_squared
                        });
                    if close {
                        members.push(pending.remove(i));
                        pulled = true;
                        break; // restart the scan
                    }
                    i += 1;
                }
            }
        }
        clusters.push(members);
    }
    clusters
}

/// Renders a cluster as one image: a single icon, or sub-icons stacked
/// vertically with cumulative-height bounding boxes.
fn compose(members: &[IconInstance], config: &RenderConfig) -> Glyph {
    let anchor = members[0].screen;
    let top_left = (
        anchor.0 - ICON_SIZE as f64 / 2.0,
        anchor.1 - ICON_SIZE as f64 / 2.0,
    );
    let height = ICON_SIZE * members.len() as u32;
    let mut image = RgbaImage::new(ICON_SIZE, height);
    let color = config.palette.constraint_glyph;

    let mut sub_boxes = Vec::with_capacity(members.len());
    for (i, member) in members.iter().enumerate() {
        let y_offset = i as u32 * ICON_SIZE;
        draw_icon(&mut image, y_offset, member.kind_key, color);
        sub_boxes.push(SubIconBox {
            constraint_id: member.constraint_id,
            bounds: Bounds::new(
                top_left.0,
                top_left.1 + y_offset as f64,
                top_left.0 + ICON_SIZE as f64,
                top_left.1 + (y_offset + ICON_SIZE) as f64,
            ),
        });
    }

    Glyph {
        constraint_ids: members.iter().map(|m| m.constraint_id).collect(),
        kind_key: members[0].kind_key,
        screen: top_left,
        rotation: members[0].rotation,
        image,
        bounds: Bounds::new(
            top_left.0,
            top_left.1,
            top_left.0 + ICON_SIZE as f64,
            top_left.1 + height as f64,
        ),
        sub_boxes,
    }
}

/// Programmatic 16x16 icon: a border plus a kind-specific mark. Stands in
/// for the host's icon theme; the pick index only needs the footprint.
fn draw_icon(image: &mut RgbaImage, y_offset: u32, kind_key: &str, color: Color) {
    let px = Rgba([color.r, color.g, color.b, color.a]);
    let last = ICON_SIZE - 1;
    for i in 0..ICON_SIZE {
        image.put_pixel(i, y_offset, px);
        image.put_pixel(i, y_offset + last, px);
        image.put_pixel(0, y_offset + i, px);
        image.put_pixel(last, y_offset + i, px);
    }
    for i in 2..ICON_SIZE - 2 {
        match kind_key {
            "Horizontal" | "Distance" | "DistanceX" => {
                image.put_pixel(i, y_offset + ICON_SIZE / 2, px)
            }
            "Vertical" | "DistanceY" => image.put_pixel(ICON_SIZE / 2, y_offset + i, px),
            "Parallel" | "Equal" => {
                image.put_pixel(ICON_SIZE / 3, y_offset + i, px);
                image.put_pixel(2 * ICON_SIZE / 3, y_offset + i, px);
            }
            "Perpendicular" => {
                image.put_pixel(ICON_SIZE / 2, y_offset + i, px);
                image.put_pixel(i, y_offset + last - 2, px);
            }
            _ => image.put_pixel(i, y_offset + i, px),
        }
    }
}
