//! Render cache and pick index round trips over a mixed sketch: every
//! tessellated element picks back to its own GeoId, the vertex tables stay
//! a bijection, and redraws are idempotent.

use proptest::prelude::*;

use sketchkit_core::config::{PreferenceStore, RenderConfig};
use sketchkit_core::constraint::{Constraint, ConstraintKind};
use sketchkit_core::geometry::{
    CircArc, Circle, GeometryElement, GeometryKind, LineSeg, Point2d,
};
use sketchkit_core::id::GeoPointRef;
use sketchkit_core::model::GeometryModel;
use sketchkit_editor::{
    GlyphLayout, PickIndex, RecordingSink, RenderCache, SketchEditSession, SketchHit, Viewport,
};
use sketchkit_solver::PlanarSolver;

fn mixed_model() -> GeometryModel {
    let mut model = GeometryModel::new();
    model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
        LineSeg::new(Point2d::new(10.0, 40.0), Point2d::new(50.0, 40.0)),
    )));
    model.add_geometry(GeometryElement::new(GeometryKind::Circle(Circle::new(
        Point2d::new(100.0, 100.0),
        20.0,
    ))));
    model.add_geometry(GeometryElement::new(GeometryKind::ArcOfCircle(CircArc {
        center: Point2d::new(200.0, 0.0),
        radius: 30.0,
        start_angle: 0.0,
        end_angle: std::f64::consts::FRAC_PI_2,
    })));
    model.add_external(GeometryElement::new(GeometryKind::LineSegment(
        LineSeg::new(Point2d::new(-50.0, -50.0), Point2d::new(-10.0, -50.0)),
    )));
    model
}

#[test]
fn every_curve_picks_back_to_its_geo_id() {
    let model = mixed_model();
    let config = RenderConfig::default();
    let viewport = Viewport::default();
    let cache = RenderCache::build(&model, &config, false);
    let pick = PickIndex::build(&cache, &viewport, &config);
    let glyphs = GlyphLayout::build(&model, &viewport, &config, false);

    for strip in &cache.curves {
        // Probe between two interior tessellation points, away from the
        // endpoint vertices.
        let mid = strip.points.len() / 2;
        let a = strip.points[mid - 1];
        let b = strip.points[mid];
        let probe = Point2d::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
        let (x, y) = viewport.world_to_pixel(probe);
        assert_eq!(
            pick.pick(&glyphs, x, y),
            Some(SketchHit::Edge(strip.geo_id)),
            "strip for GeoId {}",
            strip.geo_id
        );
    }
}

#[test]
fn every_vertex_picks_back_to_its_id() {
    let model = mixed_model();
    let config = RenderConfig::default();
    let viewport = Viewport::default();
    let cache = RenderCache::build(&model, &config, false);
    let pick = PickIndex::build(&cache, &viewport, &config);
    let glyphs = GlyphLayout::build(&model, &viewport, &config, false);

    // Slot 0 is the root point sentinel; every other slot is a pickable
    // logical vertex.
    for (slot, vs) in cache.vertex_slots.iter().enumerate().skip(1) {
        let (x, y) = viewport.world_to_pixel(vs.point);
        let expected = cache.vertex_at_slot(slot).expect("logical vertex id");
        assert_eq!(
            pick.pick(&glyphs, x, y),
            Some(SketchHit::Vertex(expected)),
            "slot {slot}"
        );
    }
}

#[test]
fn hits_name_their_sub_elements() {
    let model = mixed_model();
    let config = RenderConfig::default();

    let name = |hit: SketchHit| hit.sub_element(&model).expect("name").to_string();
    assert_eq!(name(SketchHit::Edge(0)), "Edge1");
    assert_eq!(name(SketchHit::Edge(-3)), "ExternalEdge1");
    assert_eq!(name(SketchHit::Vertex(0)), "Vertex1");
    assert_eq!(name(SketchHit::Origin), "RootPoint");

    // The external edge round-trips through the live pick path too.
    let viewport = Viewport::default();
    let cache = RenderCache::build(&model, &config, false);
    let pick = PickIndex::build(&cache, &viewport, &config);
    let glyphs = GlyphLayout::build(&model, &viewport, &config, false);
    let (x, y) = viewport.world_to_pixel(Point2d::new(-30.0, -50.0));
    let hit = pick.pick(&glyphs, x, y).expect("external edge hit");
    assert_eq!(name(hit), "ExternalEdge1");
}

#[test]
fn redraw_is_idempotent() {
    let mut model = mixed_model();
    model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
        first: GeoPointRef::edge(0),
        second: None,
    }));
    let mut session = SketchEditSession::new(
        model,
        Box::new(PlanarSolver::new()),
        Box::new(RecordingSink::new()),
        PreferenceStore::new(),
    );

    let cache = session.cache().clone();
    let glyph_count = session.glyphs().glyphs.len();
    let mut keys: Vec<String> = session
        .glyphs()
        .combined_constr_boxes
        .keys()
        .cloned()
        .collect();
    keys.sort();

    session.redraw();
    assert_eq!(*session.cache(), cache);
    assert_eq!(session.glyphs().glyphs.len(), glyph_count);
    let mut keys_after: Vec<String> = session
        .glyphs()
        .combined_constr_boxes
        .keys()
        .cloned()
        .collect();
    keys_after.sort();
    assert_eq!(keys_after, keys);
}

proptest! {
    /// `point_id_to_vertex_id` and `vertex_id_to_point_id` stay exact
    /// inverses over arbitrary sketches, with the root sentinel at slot 0.
    #[test]
    fn vertex_tables_are_a_bijection(
        segments in prop::collection::vec(
            (-500.0..500.0f64, -500.0..500.0f64, -500.0..500.0f64, -500.0..500.0f64),
            1..20,
        )
    ) {
        let mut model = GeometryModel::new();
        for (x0, y0, x1, y1) in segments {
            model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
                LineSeg::new(Point2d::new(x0, y0), Point2d::new(x1, y1)),
            )));
        }
        let cache = RenderCache::build(&model, &RenderConfig::default(), false);

        prop_assert_eq!(cache.point_id_to_vertex_id[0], -1);
        for (slot, &vertex_id) in cache.point_id_to_vertex_id.iter().enumerate().skip(1) {
            prop_assert!(vertex_id >= 0);
            prop_assert_eq!(cache.vertex_id_to_point_id[vertex_id as usize], slot);
        }
        for (vertex_id, &slot) in cache.vertex_id_to_point_id.iter().enumerate() {
            prop_assert_eq!(cache.point_id_to_vertex_id[slot], vertex_id as i64);
        }
    }
}
